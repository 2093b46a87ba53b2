//! Byte-oriented transports. A `Transport` owns one underlying
//! channel and turns its raw, possibly-blocking-averse I/O into the
//! `{read ≥ 0 | again | eof | error}` result space every [`crate::server`]
//! state machine is built on.
//!
//! By design, the small, fixed set of concrete transports is
//! modeled as a closed enum rather than `dyn Transport` trait objects —
//! dispatch happens on every byte, so a tag match beats a vtable call here.

mod dgram;
mod file;
mod inherited;
mod mock;
mod stream;
mod tls;

use std::io;

pub use dgram::DgramTransport;
pub use file::FileTransport;
pub use inherited::InheritedFdTransport;
pub use mock::MockTransport;
pub use stream::StreamTransport;
pub use tls::TlsTransport;

use crate::{
    aux::AuxData,
    error::{FrameError, FrameResult, IoErrorKind},
};

/// Up to this many bytes may be peeked ahead of the next `read`.
pub const READ_AHEAD_CAP: usize = 16;

/// A small ring-free cache holding bytes obtained via `read_ahead` that have
/// not yet been returned through `read`.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ReadAheadCache {
    buf: [u8; READ_AHEAD_CAP],
    len: usize,
    pos: usize,
}

impl ReadAheadCache {
    pub const fn new() -> Self {
        Self {
            buf: [0; READ_AHEAD_CAP],
            len: 0,
            pos: 0,
        }
    }

    fn available_len(&self) -> usize {
        self.len - self.pos
    }

    fn as_slice(&self) -> &[u8] {
        &self.buf[self.pos..self.len]
    }

    fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.available_len());
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        if self.pos == self.len {
            self.pos = 0;
            self.len = 0;
        }
        n
    }

    fn push(&mut self, bytes: &[u8]) {
        assert!(
            self.len + bytes.len() <= READ_AHEAD_CAP,
            "read_ahead cache overflow: peeking more than {READ_AHEAD_CAP} bytes is a programming error"
        );
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
    }
}

/// Shared implementation of "drain the read-ahead cache, then issue at most
/// one syscall", used by every concrete transport's `read`.
pub(crate) fn do_read(
    cache: &mut ReadAheadCache,
    buf: &mut [u8],
    raw_read: impl FnOnce(&mut [u8]) -> io::Result<usize>,
) -> FrameResult<usize> {
    let mut total = cache.drain_into(buf);
    if total == buf.len() {
        return Ok(total);
    }
    match raw_read(&mut buf[total..]) {
        Ok(0) => {
            if total > 0 {
                Ok(total)
            } else {
                Err(FrameError::Eof)
            }
        }
        Ok(n) => {
            total += n;
            Ok(total)
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            if total > 0 {
                Ok(total)
            } else {
                Err(FrameError::Again)
            }
        }
        Err(e) => Err(FrameError::io(IoErrorKind::Io, e)),
    }
}

/// Shared implementation of `read_ahead`: top up the cache to at least
/// `len` bytes using at most one syscall's worth of progress per call,
/// reporting whether the cache actually grew.
pub(crate) fn do_read_ahead(
    cache: &mut ReadAheadCache,
    len: usize,
    raw_read: impl FnOnce(&mut [u8]) -> io::Result<usize>,
) -> FrameResult<bool> {
    assert!(
        len <= READ_AHEAD_CAP,
        "read_ahead of {len} bytes exceeds the {READ_AHEAD_CAP}-byte cache"
    );
    if cache.available_len() >= len {
        return Ok(false);
    }
    let want = len - cache.available_len();
    let mut tmp = [0u8; READ_AHEAD_CAP];
    match raw_read(&mut tmp[..want]) {
        Ok(0) => {
            if cache.available_len() > 0 {
                Ok(false)
            } else {
                Err(FrameError::Eof)
            }
        }
        Ok(n) => {
            cache.push(&tmp[..n]);
            Ok(n > 0)
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            if cache.available_len() > 0 {
                Ok(false)
            } else {
                Err(FrameError::Again)
            }
        }
        Err(e) => Err(FrameError::io(IoErrorKind::Io, e)),
    }
}

/// The closed set of concrete transports a server may run on.
#[derive(Debug)]
pub enum Transport {
    File(FileTransport),
    Stream(StreamTransport),
    Dgram(DgramTransport),
    Mock(MockTransport),
    Tls(TlsTransport),
    InheritedFd(InheritedFdTransport),
}

impl Transport {
    /// Read up to `buf.len()` bytes, draining any peeked bytes first.
    pub fn read(&mut self, buf: &mut [u8]) -> FrameResult<(usize, AuxData)> {
        match self {
            Self::File(t) => t.read(buf),
            Self::Stream(t) => t.read(buf),
            Self::Dgram(t) => t.read(buf),
            Self::Mock(t) => t.read(buf),
            Self::Tls(t) => t.read(buf),
            Self::InheritedFd(t) => t.read(buf),
        }
    }

    pub fn write(&mut self, buf: &[u8]) -> FrameResult<usize> {
        match self {
            Self::File(t) => t.write(buf),
            Self::Stream(t) => t.write(buf),
            Self::Dgram(t) => t.write(buf),
            Self::Mock(t) => t.write(buf),
            Self::Tls(t) => t.write(buf),
            Self::InheritedFd(t) => t.write(buf),
        }
    }

    /// Scatter-write; the default just writes each buffer in turn. Only
    /// the file and stream transports get a real `writev`.
    pub fn writev(&mut self, bufs: &[&[u8]]) -> FrameResult<usize> {
        match self {
            Self::File(t) => t.writev(bufs),
            Self::Stream(t) => t.writev(bufs),
            _ => {
                let mut total = 0;
                for buf in bufs {
                    total += self.write(buf)?;
                }
                Ok(total)
            }
        }
    }

    /// Peek up to `len` bytes (`len <= 16`) without consuming them.
    /// Returns whether the peek cache grew (`moved_forward`).
    pub fn read_ahead(&mut self, len: usize) -> FrameResult<bool> {
        match self {
            Self::File(t) => t.read_ahead(len),
            Self::Stream(t) => t.read_ahead(len),
            Self::Dgram(t) => t.read_ahead(len),
            Self::Mock(t) => t.read_ahead(len),
            Self::Tls(t) => t.read_ahead(len),
            Self::InheritedFd(t) => t.read_ahead(len),
        }
    }

    pub fn close(&mut self) {
        match self {
            Self::File(t) => t.close(),
            Self::Stream(t) => t.close(),
            Self::Dgram(t) => t.close(),
            Self::Mock(t) => t.close(),
            Self::Tls(t) => t.close(),
            Self::InheritedFd(t) => t.close(),
        }
    }

    /// Bytes already pulled into the read-ahead cache by a prior
    /// `read_ahead` call, without consuming them.
    pub fn peeked(&self) -> &[u8] {
        match self {
            Self::File(t) => t.peeked(),
            Self::Stream(t) => t.peeked(),
            Self::Dgram(t) => t.peeked(),
            Self::Mock(t) => t.peeked(),
            Self::Tls(t) => t.peeked(),
            Self::InheritedFd(t) => t.peeked(),
        }
    }
}
