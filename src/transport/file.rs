use std::{
    fs::File,
    io::{self, Read as _, Seek, SeekFrom, Write as _},
    path::{Path, PathBuf},
};

use crate::{aux::AuxData, error::FrameResult};

use super::{do_read, do_read_ahead, ReadAheadCache};

#[cfg(unix)]
fn file_identity(file: &File) -> io::Result<(i64, i64)> {
    use std::os::unix::fs::MetadataExt;
    let meta = file.metadata()?;
    Ok((meta.len() as i64, meta.ino() as i64))
}

#[cfg(not(unix))]
fn file_identity(file: &File) -> io::Result<(i64, i64)> {
    let meta = file.metadata()?;
    Ok((meta.len() as i64, 0))
}

/// A seekable, position-tracking transport over a regular file — the
/// backing for a restartable file-based reader.
#[derive(Debug)]
pub struct FileTransport {
    file: File,
    path: PathBuf,
    cache: ReadAheadCache,
}

impl FileTransport {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            file,
            path,
            cache: ReadAheadCache::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `(file_size, file_inode)` as needed by [`crate::persist::BufferedServerState`].
    pub fn identity(&self) -> io::Result<(i64, i64)> {
        file_identity(&self.file)
    }

    pub fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn stream_position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    pub(super) fn read(&mut self, buf: &mut [u8]) -> FrameResult<(usize, AuxData)> {
        let mut cache = self.cache;
        let n = do_read(&mut cache, buf, |b| self.file.read(b))?;
        self.cache = cache;
        Ok((n, AuxData::new()))
    }

    pub(super) fn write(&mut self, buf: &[u8]) -> FrameResult<usize> {
        self.file
            .write(buf)
            .map_err(|e| crate::error::FrameError::io(crate::error::IoErrorKind::Io, e))
    }

    pub(super) fn writev(&mut self, bufs: &[&[u8]]) -> FrameResult<usize> {
        let mut total = 0;
        for buf in bufs {
            total += self.write(buf)?;
        }
        Ok(total)
    }

    pub(super) fn read_ahead(&mut self, len: usize) -> FrameResult<bool> {
        let mut cache = self.cache;
        let moved = do_read_ahead(&mut cache, len, |b| self.file.read(b))?;
        self.cache = cache;
        Ok(moved)
    }

    pub(super) fn close(&mut self) {
        // `File`'s `Drop` already closes the descriptor; nothing else to
        // release here.
    }

    pub(super) fn peeked(&self) -> &[u8] {
        self.cache.as_slice()
    }
}
