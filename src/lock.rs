//! Per-corpus build lock.
//!
//! Uses flock() for advisory locking on `index/<corpus>.lock`, so at most
//! one process builds a given corpus at a time. Readers never lock: they only
//! see files that were published by rename.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// A held file lock that releases on drop
pub struct FileLock {
    #[allow(dead_code)]
    file: File,
    #[cfg_attr(not(unix), allow(dead_code))]
    path: PathBuf,
}

impl FileLock {
    /// Lock file for `corpus_id` inside `index_dir`.
    pub fn path_for(index_dir: &Path, corpus_id: &str) -> PathBuf {
        index_dir.join(format!("{corpus_id}.lock"))
    }

    /// Attempt to acquire an exclusive lock without waiting.
    /// Fails with `WouldBlock` if another build holds it.
    pub fn try_acquire(index_dir: &Path, corpus_id: &str) -> io::Result<Self> {
        let path = Self::path_for(index_dir, corpus_id);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        Self::try_lock_exclusive(&file, corpus_id)?;
        log::debug!("locked {}", path.display());

        Ok(FileLock { file, path })
    }

    #[cfg(unix)]
    fn try_lock_exclusive(file: &File, corpus_id: &str) -> io::Result<()> {
        let fd = file.as_raw_fd();
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result != 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock
                || err.raw_os_error() == Some(libc::EWOULDBLOCK)
                || err.raw_os_error() == Some(libc::EAGAIN)
            {
                return Err(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    format!("corpus '{corpus_id}' is being built by another process"),
                ));
            }
            return Err(err);
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn try_lock_exclusive(_file: &File, _corpus_id: &str) -> io::Result<()> {
        // no advisory locking outside unix
        Ok(())
    }
}

#[cfg(unix)]
impl Drop for FileLock {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        // Release the lock - ignore errors on drop
        unsafe { libc::flock(fd, libc::LOCK_UN) };
        log::debug!("released {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();

        let lock1 = FileLock::try_acquire(dir.path(), "bible");
        assert!(lock1.is_ok(), "First lock should succeed");
        assert!(dir.path().join("bible.lock").exists());

        let lock2 = FileLock::try_acquire(dir.path(), "bible");
        let err = lock2.err().expect("Second lock should fail");
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        drop(lock1);

        let lock3 = FileLock::try_acquire(dir.path(), "bible");
        assert!(lock3.is_ok(), "Third lock should succeed after release");
    }

    #[test]
    fn test_corpora_lock_independently() {
        let dir = tempfile::tempdir().unwrap();

        let _bible = FileLock::try_acquire(dir.path(), "bible").unwrap();
        let _quran = FileLock::try_acquire(dir.path(), "quran_english").unwrap();
        assert!(FileLock::path_for(dir.path(), "bible").exists());
        assert!(FileLock::path_for(dir.path(), "quran_english").exists());
    }
}
