//! Exclusive advisory file locks via `flock(2)`.
//!
//! Guards the read-modify-write of the label store and of a day's ledger
//! against concurrent enrollment or attendance processes. The lock is
//! released when the guard is dropped, on every exit path.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// An open file holding an exclusive `flock`.
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Block until an exclusive lock on `file` is held.
    pub fn acquire(file: File) -> io::Result<Self> {
        flock(&file, libc::LOCK_EX)?;
        Ok(Self { file })
    }

    /// Open (creating if needed) a dedicated lock file and lock it.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Self::acquire(file)
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(err) = flock(&self.file, libc::LOCK_UN) {
            tracing::warn!(error = %err, "failed to release file lock");
        }
    }
}

fn flock(file: &File, operation: libc::c_int) -> io::Result<()> {
    loop {
        // SAFETY: the fd is valid for the lifetime of `file`; flock takes no pointers.
        let ret = unsafe { libc::flock(file.as_raw_fd(), operation) };
        if ret == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}
