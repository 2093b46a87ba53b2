//! The consumer side of the pipeline. Out of scope for this crate's own
//! logic, but its contract shapes every `fetch` signature.

use crate::aux::AuxData;

/// Opaque token carrying whatever a [`crate::server::buffered::BufferedServer`]
/// needs to advance its persisted position once a record is acknowledged.
///
/// Bookmarks have value semantics and are cheap to clone; a server produces
/// one per emitted record and the ack tracker feeds it back via `ack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bookmark {
    /// Sequence number of the `pending_*` snapshot this record was read
    /// from, monotonically increasing per server instance.
    pub generation: u64,
}

/// A factory for ack trackers, set on [`crate::server::ServerOptions`].
///
/// Concrete embeddings (not part of this crate) use this to wire up
/// at-least-once delivery; a server that has none treats every record as
/// immediately committed.
pub trait AckTrackerFactory: std::fmt::Debug + Send + Sync {
    fn track(&self, bookmark: Bookmark);
}

/// `sink(bytes, aux, bookmark) -> Result`. The sink must not retain `bytes`
/// past the call (it is a view into the server's internal buffer, valid
/// only until the next `fetch`); `aux` and `bookmark` have value semantics
/// and may be retained freely.
pub trait MessageSink {
    type Error;

    fn accept(&mut self, bytes: &[u8], aux: &AuxData, bookmark: Bookmark) -> Result<(), Self::Error>;
}

/// A sink that collects every record into an owned `Vec`, used by tests and
/// by any embedding that wants to buffer records before a real sink exists.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub records: Vec<(Vec<u8>, AuxData, Bookmark)>,
}

impl MessageSink for CollectingSink {
    type Error = std::convert::Infallible;

    fn accept(&mut self, bytes: &[u8], aux: &AuxData, bookmark: Bookmark) -> Result<(), Self::Error> {
        self.records.push((bytes.to_vec(), aux.clone(), bookmark));
        Ok(())
    }
}
