use std::{
    fmt,
    io::{self, Read, Write},
};

use crate::{
    aux::AuxData,
    error::{FrameError, IoErrorKind},
    error::FrameResult,
};

use super::{do_read, do_read_ahead, ReadAheadCache};

/// Any already-established full-duplex byte stream. The framing core does
/// not perform TLS handshakes; whatever TLS stack the
/// embedding daemon chose (offering both `rustls` and
/// `native-tls` behind feature flags) hands this crate an already-wrapped
/// stream through this trait once the handshake has completed.
pub trait EstablishedChannel: Read + Write + Send {}
impl<T: Read + Write + Send> EstablishedChannel for T {}

/// Wraps an established TLS (or any other already-secured) channel as an
/// opaque byte transport.
pub struct TlsTransport {
    inner: Box<dyn EstablishedChannel>,
    cache: ReadAheadCache,
}

impl fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsTransport").finish_non_exhaustive()
    }
}

impl TlsTransport {
    pub fn new(inner: Box<dyn EstablishedChannel>) -> Self {
        Self {
            inner,
            cache: ReadAheadCache::new(),
        }
    }

    pub(super) fn read(&mut self, buf: &mut [u8]) -> FrameResult<(usize, AuxData)> {
        let mut cache = self.cache;
        let n = do_read(&mut cache, buf, |b| self.inner.read(b))?;
        self.cache = cache;
        Ok((n, AuxData::new()))
    }

    pub(super) fn write(&mut self, buf: &[u8]) -> FrameResult<usize> {
        self.inner
            .write(buf)
            .map_err(|e| FrameError::io(IoErrorKind::TlsError, e))
    }

    pub(super) fn read_ahead(&mut self, len: usize) -> FrameResult<bool> {
        let mut cache = self.cache;
        let moved = do_read_ahead(&mut cache, len, |b| self.inner.read(b))?;
        self.cache = cache;
        Ok(moved)
    }

    pub(super) fn close(&mut self) {
        let _ = self.inner.flush();
    }

    pub(super) fn peeked(&self) -> &[u8] {
        self.cache.as_slice()
    }
}

/// A `TlsError` surfaced by the underlying channel (record decryption
/// failure, unexpected close-notify, and so on) that is not a plain I/O
/// error.
pub fn tls_error(message: impl Into<String>) -> FrameError {
    FrameError::io(
        IoErrorKind::TlsError,
        io::Error::new(io::ErrorKind::Other, message.into()),
    )
}
