//! Wraps a file descriptor handed down by the service manager (systemd
//! socket activation: `LISTEN_FDS`/`sd_listen_fds`) as an opaque transport.
//! Resolving *which* fd to inherit and validating the activation protocol
//! is the embedding daemon's job and out of scope here — this type only
//! wraps an fd the caller has already accepted.

use std::io;

use crate::{aux::AuxData, error::FrameResult};

use super::{do_read, do_read_ahead, ReadAheadCache};

#[derive(Debug)]
pub struct InheritedFdTransport {
    #[cfg(unix)]
    file: std::fs::File,
    cache: ReadAheadCache,
}

impl InheritedFdTransport {
    /// # Safety
    /// `fd` must be a valid, open file descriptor not owned elsewhere; this
    /// takes ownership and will close it on drop.
    #[cfg(unix)]
    pub unsafe fn from_raw_fd(fd: std::os::unix::io::RawFd) -> io::Result<Self> {
        use std::os::unix::io::FromRawFd;
        let file = std::fs::File::from_raw_fd(fd);
        set_nonblocking(&file)?;
        Ok(Self {
            file,
            cache: ReadAheadCache::new(),
        })
    }

    #[cfg(not(unix))]
    pub fn unsupported() -> io::Result<Self> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "inherited-fd transport requires a unix target",
        ))
    }

    #[cfg(unix)]
    pub(super) fn read(&mut self, buf: &mut [u8]) -> FrameResult<(usize, AuxData)> {
        use std::io::Read;
        let mut cache = self.cache;
        let n = do_read(&mut cache, buf, |b| self.file.read(b))?;
        self.cache = cache;
        Ok((n, AuxData::new()))
    }

    #[cfg(unix)]
    pub(super) fn write(&mut self, buf: &[u8]) -> FrameResult<usize> {
        use std::io::Write;
        self.file
            .write(buf)
            .map_err(|e| crate::error::FrameError::io(crate::error::IoErrorKind::Io, e))
    }

    #[cfg(unix)]
    pub(super) fn read_ahead(&mut self, len: usize) -> FrameResult<bool> {
        use std::io::Read;
        let mut cache = self.cache;
        let moved = do_read_ahead(&mut cache, len, |b| self.file.read(b))?;
        self.cache = cache;
        Ok(moved)
    }

    #[cfg(unix)]
    pub(super) fn close(&mut self) {}

    pub(super) fn peeked(&self) -> &[u8] {
        self.cache.as_slice()
    }

    #[cfg(not(unix))]
    pub(super) fn read(&mut self, _buf: &mut [u8]) -> FrameResult<(usize, AuxData)> {
        unreachable!("InheritedFdTransport cannot be constructed on non-unix targets")
    }

    #[cfg(not(unix))]
    pub(super) fn write(&mut self, _buf: &[u8]) -> FrameResult<usize> {
        unreachable!("InheritedFdTransport cannot be constructed on non-unix targets")
    }

    #[cfg(not(unix))]
    pub(super) fn read_ahead(&mut self, _len: usize) -> FrameResult<bool> {
        unreachable!("InheritedFdTransport cannot be constructed on non-unix targets")
    }

    #[cfg(not(unix))]
    pub(super) fn close(&mut self) {}
}

#[cfg(unix)]
fn set_nonblocking(file: &std::fs::File) -> io::Result<()> {
    use nix::fcntl::{fcntl, FcntlArg, OFlag};
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    let current = fcntl(fd, FcntlArg::F_GETFL).map_err(io::Error::from)?;
    let flags = OFlag::from_bits_truncate(current) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(io::Error::from)?;
    Ok(())
}
