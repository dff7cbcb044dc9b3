//! Shared I/O helpers: counting reader, atomic temp-file-then-rename writes,
//! and exclusive lock files, used by the object store, ref store and index.

use std::{
    fs,
    io::{self, BufRead, Read, Write},
    path::Path,
};

use sha1::{Digest, Sha1};

use crate::errors::VcsError;

pub fn read_bytes(file: &mut impl Read, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0; len];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// A lightweight wrapper that counts bytes read from the underlying reader.
pub struct CountingReader<R> {
    pub inner: R,
    pub bytes_read: u64,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes_read: 0,
        }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read += n as u64;
        Ok(n)
    }
}

impl<R: BufRead> BufRead for CountingReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.bytes_read += amt as u64;
        self.inner.consume(amt);
    }
}

/// Running SHA-1 accumulator used while streaming object payloads.
#[derive(Clone, Default)]
pub struct RunningHash(Sha1);

impl RunningHash {
    pub fn new() -> Self {
        Self(Sha1::new())
    }

    pub fn finalize(self) -> [u8; 20] {
        let digest = self.0.finalize();
        let mut out = [0u8; 20];
        out.copy_from_slice(digest.as_ref());
        out
    }
}

impl Write for RunningHash {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Write `data` to `path` atomically: write to a sibling temp file in the
/// same directory, `sync_all`, then rename into place. A crash at any point
/// before the rename leaves `path` untouched.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path has no parent directory")
    })?;
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    if let Ok(dir) = fs::File::open(parent) {
        let _ = dir.sync_all();
    }
    Ok(())
}

/// An exclusive lock file at `<path>.lock`. Acquisition fails fast
/// (`InvalidArgument`/IO "already exists") rather than blocking — callers
/// decide whether to retry (§5).
pub struct LockFile {
    lock_path: std::path::PathBuf,
    released: bool,
}

impl LockFile {
    pub fn acquire(target: &Path) -> Result<LockFile, VcsError> {
        let lock_path = lock_path_for(target);
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(_) => Ok(LockFile {
                lock_path,
                released: false,
            }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(VcsError::OperationInProgress(
                format!("lock held: {}", lock_path.display()),
            )),
            Err(e) => Err(VcsError::IOError(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    pub fn release(mut self) -> io::Result<()> {
        self.released = true;
        fs::remove_file(&self.lock_path)
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

pub fn lock_path_for(target: &Path) -> std::path::PathBuf {
    let mut s = target.as_os_str().to_os_string();
    s.push(".lock");
    std::path::PathBuf::from(s)
}
