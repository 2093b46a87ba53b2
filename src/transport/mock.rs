use std::{collections::VecDeque, io};

use crate::{aux::AuxData, error::FrameResult};

use super::{do_read, do_read_ahead, ReadAheadCache};

/// An in-memory transport for tests: feed it chunks with [`MockTransport::push`],
/// read them back through the same `read`/`read_ahead` contract real
/// transports implement.
#[derive(Debug, Default)]
pub struct MockTransport {
    chunks: VecDeque<u8>,
    cache: ReadAheadCache,
    eof: bool,
    closed: bool,
    written: Vec<u8>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes that will be returned by future `read` calls.
    pub fn push(&mut self, bytes: &[u8]) {
        self.chunks.extend(bytes.iter().copied());
    }

    /// Mark the stream as ended: once the buffered bytes are drained,
    /// `read` starts returning `Eof`.
    pub fn close_write_end(&mut self) {
        self.eof = true;
    }

    fn raw_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Ok(0);
        }
        let n = buf.len().min(self.chunks.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.chunks.pop_front().expect("checked length above");
        }
        if n == 0 && !self.eof {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "no data queued"));
        }
        Ok(n)
    }

    pub(super) fn read(&mut self, buf: &mut [u8]) -> FrameResult<(usize, AuxData)> {
        let mut cache = self.cache;
        let n = do_read(&mut cache, buf, |b| self.raw_read(b))?;
        self.cache = cache;
        Ok((n, AuxData::new()))
    }

    pub(super) fn write(&mut self, buf: &[u8]) -> FrameResult<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    /// Everything written to this transport so far, for test assertions.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub(super) fn read_ahead(&mut self, len: usize) -> FrameResult<bool> {
        let mut cache = self.cache;
        let moved = do_read_ahead(&mut cache, len, |b| self.raw_read(b))?;
        self.cache = cache;
        Ok(moved)
    }

    pub(super) fn close(&mut self) {
        self.closed = true;
    }

    pub(super) fn peeked(&self) -> &[u8] {
        self.cache.as_slice()
    }
}
