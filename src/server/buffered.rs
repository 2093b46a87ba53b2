//! The shared framing engine. Every concrete server in this module is
//! `BufferedServer<SomeExtractor>`: the buffer management, encoding
//! conversion, and commit/rollback bookkeeping live here once; each
//! extractor only answers "is there a complete record in this window".

use std::time::Duration;

use crate::{
    aux::AuxData,
    encoding::{self, CharSet},
    error::{FrameError, FrameResult},
    persist::{BufferedServerState, PersistStore},
    sink::Bookmark,
    transport::Transport,
};

use super::{IoCondition, PrepareAction, Server, ServerOptions};

const READ_CHUNK: usize = 4096;

/// What an extractor found when asked to scan the currently pending window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extracted {
    /// `window[frame_offset..frame_offset+frame_len]` is a complete record;
    /// advance the pending cursor by `total_consumed` bytes
    /// (`>= frame_offset + frame_len`, the extra covering a delimiter,
    /// length header, or other framing overhead that isn't part of the
    /// record itself).
    Frame {
        frame_offset: usize,
        frame_len: usize,
        total_consumed: usize,
    },
    /// No record yet, but `consumed` bytes of the window can be dropped
    /// (e.g. framing garbage) without becoming part of any record. The
    /// caller re-invokes `extract` immediately rather than waiting for more
    /// data.
    Advance { consumed: usize },
    /// Not enough bytes in the window to decide; read more if possible.
    NeedMoreData,
}

/// A pluggable record-boundary strategy, analogous to
/// `tokio_util::codec::Decoder`.
pub trait FrameExtractor: std::fmt::Debug {
    /// `flush` is set once the transport has reached EOF: the extractor
    /// must treat the window as final and emit a trailing partial record
    /// (if any) rather than waiting for more bytes that will never come.
    fn extract(&mut self, window: &[u8], flush: bool) -> FrameResult<Extracted>;

    /// Whether [`BufferedServer`]'s generic byte-oriented oversize policy
    /// (force a frame at `window[0..max_msg_size]`) is valid for this
    /// extractor's frames. True for every extractor whose frames start at
    /// `frame_offset` 0 of the raw window (text, multi-line). Framing
    /// schemes where a record's payload can start partway through the
    /// window (a length header, say) must apply `max_msg_size` themselves,
    /// against the payload, and return `false` here.
    fn applies_generic_oversize_limit(&self) -> bool {
        true
    }
}

/// A framing state machine that reads through a [`Transport`], decodes the
/// configured encoding, and hands windows of decoded text to a
/// [`FrameExtractor`].
#[derive(Debug)]
pub struct BufferedServer<F: FrameExtractor> {
    transport: Transport,
    options: ServerOptions,
    extractor: F,
    charset: Option<CharSet>,
    buffer: Vec<u8>,
    state: BufferedServerState,
    generation: u64,
    last_aux: AuxData,
    eof: bool,
    sticky: Option<FrameError>,
    file_identity: Option<(i64, i64)>,
}

impl<F: FrameExtractor> BufferedServer<F> {
    pub fn new(transport: Transport, options: ServerOptions, extractor: F) -> FrameResult<Self> {
        options.validate()?;
        let charset = match &options.encoding {
            Some(name) => Some(
                CharSet::lookup(name)
                    .ok_or_else(|| FrameError::protocol(format!("unknown encoding '{name}'")))?,
            ),
            None => None,
        };
        Ok(Self {
            transport,
            options,
            extractor,
            charset,
            buffer: Vec::new(),
            state: BufferedServerState::default(),
            generation: 0,
            last_aux: AuxData::new(),
            eof: false,
            sticky: None,
            file_identity: None,
        })
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    /// Advances the last-acknowledged position to match the most recent
    /// `fetch`; the sink calls this once a record has been durably handed
    /// off.
    pub fn commit(&mut self) {
        self.state.commit();
    }

    /// Rewinds the speculative cursor back to the last commit, so the next
    /// `fetch` re-reads the same record (a delivery failed and must be
    /// retried).
    pub fn rollback(&mut self) {
        self.state.rollback();
    }

    /// Restore position-tracking state from a persisted snapshot. Only
    /// meaningful for file-backed transports; `file_size`/`file_inode` are
    /// cross-checked against the live file to detect truncation or rotation
    /// before trusting the stored offsets.
    pub fn restart_with_state(&mut self, store: &dyn PersistStore, key: &str) -> FrameResult<()> {
        let Some(raw) = store.get(key) else {
            return Ok(());
        };
        let restored = BufferedServerState::from_bytes(&raw)?;
        if let Some((size, inode)) = self.file_identity {
            if restored.file_size > size || restored.file_inode != inode {
                return Err(FrameError::state(
                    "persisted state refers to a different or truncated file, ignoring",
                ));
            }
        }
        self.state = restored;
        self.buffer.clear();
        Ok(())
    }

    pub fn persist_state(&self, store: &dyn PersistStore, key: &str) {
        store.put(key, self.state.to_bytes().to_vec());
    }

    pub fn set_file_identity(&mut self, size: i64, inode: i64) {
        self.file_identity = Some((size, inode));
        self.state.file_size = size;
        self.state.file_inode = inode;
    }

    fn window(&self) -> &[u8] {
        let start = self.state.pending_buffer_pos as usize;
        let end = self.state.pending_buffer_end as usize;
        &self.buffer[start..end]
    }

    fn compact(&mut self) {
        let discard_to = self.state.buffer_pos.min(self.state.pending_buffer_pos) as usize;
        if discard_to == 0 {
            return;
        }
        self.buffer.drain(0..discard_to);
        self.state.buffer_pos -= discard_to as u32;
        self.state.pending_buffer_pos -= discard_to as u32;
        self.state.pending_buffer_end -= discard_to as u32;
    }

    fn ingest_raw(&mut self, raw: &[u8]) -> FrameResult<()> {
        match self.charset {
            None => {
                self.buffer.extend_from_slice(raw);
                self.state.pending_buffer_end += raw.len() as u32;
            }
            Some(charset) => {
                let converted =
                    encoding::convert(charset, raw, &mut self.state.raw_buffer_leftover)?;
                self.buffer.extend_from_slice(converted.text.as_bytes());
                self.state.pending_buffer_end += converted.text.len() as u32;
            }
        }
        self.state.buffer_size = self.state.pending_buffer_end.max(self.state.buffer_size);
        Ok(())
    }

    /// Reads one chunk from the transport into the buffer.
    /// Returns `Ok(true)` if bytes were added, `Ok(false)` at EOF.
    fn fill_buffer(&mut self) -> FrameResult<bool> {
        self.compact();

        if self.buffer.len() >= self.options.max_buffer_size {
            return Err(FrameError::protocol(
                "pending buffer reached max_buffer_size before a record boundary was found",
            ));
        }

        let cap = READ_CHUNK.min(self.options.max_buffer_size - self.buffer.len());
        let mut raw = vec![0u8; cap];
        match self.transport.read(&mut raw) {
            Ok((0, aux)) => {
                self.last_aux = aux;
                self.eof = true;
                tracing::debug!(message = "transport reached EOF");
                Ok(false)
            }
            Ok((n, aux)) => {
                self.last_aux = aux;
                self.state.raw_stream_pos += n as i64;
                self.ingest_raw(&raw[..n])?;
                Ok(true)
            }
            Err(FrameError::Eof) => {
                self.eof = true;
                Ok(false)
            }
            Err(e) => {
                if let Some(copy) = e.sticky_copy() {
                    self.sticky = Some(copy);
                }
                tracing::error!(
                    message = "error reading from transport",
                    error = %e,
                    internal_log_rate_limit = true,
                );
                Err(e)
            }
        }
    }

    /// Forces a record boundary at `options.max_msg_size` when the
    /// extractor hasn't found one and trimming is enabled, splitting an
    /// over-long record into fixed-size chunks instead of erroring. Only
    /// consulted after the extractor itself reports [`Extracted::NeedMoreData`]
    /// — a real boundary found inside a shorter prefix of the window always
    /// wins, and extractors that frame payloads at a non-zero offset opt out
    /// via [`FrameExtractor::applies_generic_oversize_limit`] and enforce the
    /// limit themselves.
    fn trim_oversized(&mut self) -> Option<Extracted> {
        if !self.extractor.applies_generic_oversize_limit() {
            return None;
        }
        if !self.options.trim_large_messages {
            return None;
        }
        let window_len = self.window().len();
        if window_len < self.options.max_msg_size {
            return None;
        }
        tracing::warn!(
            message = "message exceeded max_msg_size, emitting a truncated record",
            max_msg_size = self.options.max_msg_size,
            internal_log_rate_limit = true,
        );
        Some(Extracted::Frame {
            frame_offset: 0,
            frame_len: self.options.max_msg_size,
            total_consumed: self.options.max_msg_size,
        })
    }
}

impl<F: FrameExtractor> Server for BufferedServer<F> {
    fn fetch(&mut self, may_read: &mut bool) -> FrameResult<(&[u8], AuxData, Bookmark)> {
        if let Some(err) = self.sticky.as_ref().and_then(FrameError::sticky_copy) {
            return Err(err);
        }

        loop {
            let window_start = self.state.pending_buffer_pos as usize;
            let window_end = self.state.pending_buffer_end as usize;
            let extracted = match self
                .extractor
                .extract(&self.buffer[window_start..window_end], self.eof)?
            {
                Extracted::NeedMoreData => self
                    .trim_oversized()
                    .unwrap_or(Extracted::NeedMoreData),
                other => other,
            };

            match extracted {
                Extracted::Frame {
                    frame_offset,
                    frame_len,
                    total_consumed,
                } => {
                    let frame_start = self.state.pending_buffer_pos as usize + frame_offset;
                    self.state.pending_buffer_pos += total_consumed as u32;
                    let bookmark = Bookmark {
                        generation: self.generation,
                    };
                    self.generation += 1;
                    let aux = self.last_aux.clone();
                    return Ok((
                        &self.buffer[frame_start..frame_start + frame_len],
                        aux,
                        bookmark,
                    ));
                }
                Extracted::Advance { consumed } => {
                    self.state.pending_buffer_pos += consumed as u32;
                    continue;
                }
                Extracted::NeedMoreData => {
                    if self.eof {
                        return Err(FrameError::Eof);
                    }
                    if !*may_read {
                        return Err(FrameError::Again);
                    }
                    match self.fill_buffer() {
                        Ok(true) => continue,
                        Ok(false) => {
                            *may_read = false;
                            continue;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    fn prepare(&self, _timeout: Option<Duration>) -> PrepareAction {
        if self.sticky.is_some() {
            return PrepareAction::Suspend;
        }
        let pending = self.state.pending_buffer_end - self.state.pending_buffer_pos;
        if pending > 0 || self.eof {
            PrepareAction::ScheduleFetch
        } else {
            PrepareAction::PollIo(IoCondition::Readable)
        }
    }

    fn close(&mut self) {
        self.transport.close();
    }

    fn reset_error(&mut self) {
        self.sticky = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[derive(Debug, Default)]
    struct NewlineExtractor;

    impl FrameExtractor for NewlineExtractor {
        fn extract(&mut self, window: &[u8], flush: bool) -> FrameResult<Extracted> {
            match window.iter().position(|&b| b == b'\n') {
                Some(pos) => Ok(Extracted::Frame {
                    frame_offset: 0,
                    frame_len: pos,
                    total_consumed: pos + 1,
                }),
                None if flush && !window.is_empty() => Ok(Extracted::Frame {
                    frame_offset: 0,
                    frame_len: window.len(),
                    total_consumed: window.len(),
                }),
                None => Ok(Extracted::NeedMoreData),
            }
        }
    }

    fn make_server(data: &[u8]) -> BufferedServer<NewlineExtractor> {
        let mut mock = MockTransport::new();
        mock.push(data);
        mock.close_write_end();
        let transport = Transport::Mock(mock);
        BufferedServer::new(transport, ServerOptions::default(), NewlineExtractor).unwrap()
    }

    #[test]
    fn fetches_newline_delimited_records() {
        let mut server = make_server(b"one\ntwo\nthree");
        let mut may_read = true;
        let (rec, _, _) = server.fetch(&mut may_read).unwrap();
        assert_eq!(rec, b"one");
        let mut may_read = true;
        let (rec, _, _) = server.fetch(&mut may_read).unwrap();
        assert_eq!(rec, b"two");
        let mut may_read = true;
        let (rec, _, _) = server.fetch(&mut may_read).unwrap();
        assert_eq!(rec, b"three");
        let mut may_read = true;
        assert!(matches!(
            server.fetch(&mut may_read),
            Err(FrameError::Eof)
        ));
    }

    #[test]
    fn rollback_replays_last_record() {
        let mut server = make_server(b"one\ntwo\n");
        let mut may_read = true;
        let (rec, _, _) = server.fetch(&mut may_read).unwrap();
        assert_eq!(rec, b"one");
        server.rollback();
        let mut may_read = true;
        let (rec, _, _) = server.fetch(&mut may_read).unwrap();
        assert_eq!(rec, b"one");
        server.commit();
        let mut may_read = true;
        let (rec, _, _) = server.fetch(&mut may_read).unwrap();
        assert_eq!(rec, b"two");
    }
}
