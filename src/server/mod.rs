//! Framing state machines over a [`crate::transport::Transport`].
//! [`BufferedServer`] is the shared engine; concrete record
//! boundaries are supplied by a small [`FrameExtractor`] strategy, the way
//! `tokio_util::codec::Decoder` implementations plug into a
//! shared `FramedRead`.

mod auto;
mod buffered;
mod dgram;
mod framed;
mod http_scrape;
mod multiline;
mod proxy;
mod record;
mod text;

pub use auto::AutoServer;
pub use buffered::{BufferedServer, Extracted, FrameExtractor};
pub use dgram::DgramFrameExtractor;
pub use framed::FramedExtractor;
pub use http_scrape::HttpScrapeServer;
pub use multiline::{MultiLineExtractor, MultiLineMode, RecordState, SegmentAction};
pub use proxy::{strip_proxy_preamble, ProxyProtocolVersion, ProxyServer};
pub use record::{RecordExtractor, RecordKind};
pub use text::TextExtractor;

use std::{sync::Arc, time::Duration};

use crate::{
    aux::AuxData,
    error::FrameResult,
    persist::PersistStore,
    sink::{AckTrackerFactory, Bookmark},
};

/// Immutable configuration shared by every concrete server.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub max_msg_size: usize,
    pub init_buffer_size: usize,
    pub max_buffer_size: usize,
    pub encoding: Option<String>,
    pub position_tracking_enabled: bool,
    pub trim_large_messages: bool,
    pub multi_line_mode: Option<MultiLineMode>,
    pub ack_tracker_factory: Option<Arc<dyn AckTrackerFactory>>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_msg_size: 8192,
            init_buffer_size: 4096,
            max_buffer_size: 8192,
            encoding: None,
            position_tracking_enabled: false,
            trim_large_messages: false,
            multi_line_mode: None,
            ack_tracker_factory: None,
        }
    }
}

impl ServerOptions {
    /// Validates the invariant `max_buffer_size >= max_msg_size`;
    /// every server's `new` calls this before accepting the options.
    pub fn validate(&self) -> FrameResult<()> {
        if self.max_buffer_size < self.max_msg_size {
            return Err(crate::error::FrameError::protocol(format!(
                "max_buffer_size ({}) must be >= max_msg_size ({})",
                self.max_buffer_size, self.max_msg_size
            )));
        }
        if self.init_buffer_size == 0 || self.init_buffer_size > self.max_buffer_size {
            return Err(crate::error::FrameError::protocol(
                "init_buffer_size must be > 0 and <= max_buffer_size",
            ));
        }
        Ok(())
    }
}

/// What a server's `prepare` asks the scheduler to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoCondition {
    Readable,
    Writable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareAction {
    PollIo(IoCondition),
    ScheduleFetch,
    Suspend,
}

/// A framing state machine over a transport. Object-safe so
/// [`AutoServer`]/[`ProxyServer`] can own a polymorphic delegate behind an
/// owning box with a discriminated kind field.
pub trait Server: std::fmt::Debug {
    /// Extract the next record, if one is ready.
    ///
    /// `may_read` is in/out: the caller sets it to `false` to force
    /// "drain the buffer only, no syscalls"; the callee may clear it when
    /// it decides no further read would help this tick.
    ///
    /// On success, the returned slice is a view into this server's internal
    /// buffer and is valid only until the next call to `fetch`.
    fn fetch(&mut self, may_read: &mut bool) -> FrameResult<(&[u8], AuxData, Bookmark)>;

    /// What the scheduler should wait for before calling `fetch` again.
    fn prepare(&self, timeout: Option<Duration>) -> PrepareAction;

    /// Release the underlying transport. Any record already returned by a
    /// prior `fetch` remains valid; the next `fetch` call returns `Eof`.
    fn close(&mut self);

    /// Clears a sticky [`crate::error::FrameError::Encoding`] or
    /// [`crate::error::FrameError::Protocol`] so `fetch` stops replaying it.
    fn reset_error(&mut self);
}

/// Re-exported for servers that support restart from persisted state;
/// kept as a free function rather than a `Server` trait method since only
/// file-backed, position-tracking servers implement it, and going through
/// a `dyn Server` to reach it is never required by any call site.
pub fn restore_into<F: FrameExtractor>(
    server: &mut BufferedServer<F>,
    store: &dyn PersistStore,
    key: &str,
) -> FrameResult<()> {
    server.restart_with_state(store, key)
}
