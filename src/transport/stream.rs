use std::{
    io::{self, Read as _, Write as _},
    net::{SocketAddr, TcpStream},
};

use crate::{
    aux::AuxData,
    error::{FrameError, IoErrorKind},
    error::FrameResult,
};

use super::{do_read, do_read_ahead, ReadAheadCache};

/// A non-seekable, connection-oriented byte transport: TCP sockets and
/// named pipes fall in here. EOF is sticky once observed.
#[derive(Debug)]
pub struct StreamTransport {
    inner: TcpStream,
    peer_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    cache: ReadAheadCache,
    eof_seen: bool,
}

impl StreamTransport {
    pub fn from_tcp_stream(inner: TcpStream) -> io::Result<Self> {
        inner.set_nonblocking(true)?;
        let peer_addr = inner.peer_addr().ok();
        let local_addr = inner.local_addr().ok();
        Ok(Self {
            inner,
            peer_addr,
            local_addr,
            cache: ReadAheadCache::new(),
            eof_seen: false,
        })
    }

    fn aux(&self) -> AuxData {
        AuxData {
            peer_addr: self.peer_addr,
            local_addr: self.local_addr,
            timestamp: None,
            proxied: None,
        }
    }

    pub(super) fn read(&mut self, buf: &mut [u8]) -> FrameResult<(usize, AuxData)> {
        if self.eof_seen {
            return Err(FrameError::Eof);
        }
        let mut cache = self.cache;
        let result = do_read(&mut cache, buf, |b| self.inner.read(b));
        self.cache = cache;
        match result {
            Err(FrameError::Eof) => {
                self.eof_seen = true;
                tracing::debug!(
                    message = "peer closed connection",
                    peer_addr = ?self.peer_addr,
                );
                Err(FrameError::Eof)
            }
            other => other.map(|n| (n, self.aux())),
        }
    }

    pub(super) fn write(&mut self, buf: &[u8]) -> FrameResult<usize> {
        self.inner
            .write(buf)
            .map_err(|e| FrameError::io(IoErrorKind::Io, e))
    }

    pub(super) fn writev(&mut self, bufs: &[&[u8]]) -> FrameResult<usize> {
        let mut total = 0;
        for buf in bufs {
            total += self.write(buf)?;
        }
        Ok(total)
    }

    pub(super) fn read_ahead(&mut self, len: usize) -> FrameResult<bool> {
        if self.eof_seen {
            return Err(FrameError::Eof);
        }
        let mut cache = self.cache;
        let result = do_read_ahead(&mut cache, len, |b| self.inner.read(b));
        self.cache = cache;
        if let Err(FrameError::Eof) = &result {
            self.eof_seen = true;
        }
        result
    }

    pub(super) fn close(&mut self) {
        let _ = self.inner.shutdown(std::net::Shutdown::Both);
    }

    pub(super) fn peeked(&self) -> &[u8] {
        self.cache.as_slice()
    }
}
