use std::{
    io::{self},
    net::{SocketAddr, UdpSocket},
};

use crate::{
    aux::AuxData,
    error::{FrameError, FrameResult, IoErrorKind},
};

use super::{do_read, do_read_ahead, ReadAheadCache};

/// A connectionless datagram transport (UDP). `eof` has no
/// real meaning for datagrams — once [`DgramTransport::close`] has been
/// called, reads return `Again` rather than a sticky `Eof`, so a scheduler
/// that wants to rebind the socket isn't permanently locked out.
#[derive(Debug)]
pub struct DgramTransport {
    socket: UdpSocket,
    local_addr: Option<SocketAddr>,
    cache: ReadAheadCache,
    closed: bool,
}

impl DgramTransport {
    pub fn bind(socket: UdpSocket) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr().ok();
        Ok(Self {
            socket,
            local_addr,
            cache: ReadAheadCache::new(),
            closed: false,
        })
    }

    fn raw_recv(&self, buf: &mut [u8]) -> io::Result<(usize, Option<SocketAddr>)> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "dgram transport closed"));
        }
        self.socket.recv_from(buf).map(|(n, addr)| (n, Some(addr)))
    }

    pub(super) fn read(&mut self, buf: &mut [u8]) -> FrameResult<(usize, AuxData)> {
        let mut peer = None;
        let mut cache = self.cache;
        let result = do_read(&mut cache, buf, |b| {
            let (n, addr) = self.raw_recv(b)?;
            peer = addr;
            Ok(n)
        });
        self.cache = cache;
        match result {
            Err(FrameError::Eof) => Err(FrameError::Again),
            other => other.map(|n| {
                (
                    n,
                    AuxData {
                        peer_addr: peer,
                        local_addr: self.local_addr,
                        timestamp: None,
                        proxied: None,
                    },
                )
            }),
        }
    }

    pub(super) fn write(&mut self, buf: &[u8]) -> FrameResult<usize> {
        self.socket
            .send(buf)
            .map_err(|e| FrameError::io(IoErrorKind::Io, e))
    }

    pub(super) fn read_ahead(&mut self, len: usize) -> FrameResult<bool> {
        let mut cache = self.cache;
        let result = do_read_ahead(&mut cache, len, |b| {
            if self.closed {
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "dgram transport closed"));
            }
            self.socket.peek(b)
        });
        self.cache = cache;
        match result {
            Err(FrameError::Eof) => Err(FrameError::Again),
            other => other,
        }
    }

    pub(super) fn close(&mut self) {
        self.closed = true;
    }

    pub(super) fn peeked(&self) -> &[u8] {
        self.cache.as_slice()
    }

    /// Install a fresh bound socket in place of the closed one, the
    /// "rebinding" the masked-EOF behavior exists to allow.
    pub fn rebind(&mut self, socket: UdpSocket) -> io::Result<()> {
        socket.set_nonblocking(true)?;
        self.local_addr = socket.local_addr().ok();
        self.socket = socket;
        self.closed = false;
        self.cache = ReadAheadCache::new();
        Ok(())
    }
}
