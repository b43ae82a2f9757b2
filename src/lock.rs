use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

#[cfg(feature = "trace")]
use tracing::instrument;

use crate::config::Settings;
use crate::errors::{ExecError, Result};

/// Per-userland lock guard that removes the lock file on drop.
#[derive(Debug)]
pub struct UserlandLock {
    file: File,
    path: PathBuf,
}

impl UserlandLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UserlandLock {
    fn drop(&mut self) {
        // Best-effort unlock; ignore errors
        let _ = self.file.unlock();
        let _ = fs::remove_file(&self.path);
    }
}

/// Lock file guarding archive pipelines for one userland: `<files_dir>/.<dir_name>.lock`.
pub fn lock_path_for(settings: &Settings, dir_name: &str) -> PathBuf {
    settings.files_dir.join(format!(".{dir_name}.lock"))
}

#[cfg_attr(
    feature = "trace",
    instrument(level = "info", err, fields(path = %p.display()))
)]
/// Acquire a non-blocking exclusive lock at `p`.
pub fn acquire_lock_at(p: &Path) -> Result<UserlandLock> {
    if let Some(parent) = p.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let f = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(true)
        .open(p)?;
    match f.try_lock_exclusive() {
        Ok(()) => Ok(UserlandLock {
            file: f,
            path: p.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            #[cfg(feature = "trace")]
            tracing::error!("lock acquisition failed: lock held by another process");
            Err(ExecError::LockHeld {
                path: p.display().to_string(),
            })
        }
        Err(e) => Err(ExecError::Io(e)),
    }
}

/// Acquire the archive lock for `dir_name`.
pub fn acquire_userland_lock(settings: &Settings, dir_name: &str) -> Result<UserlandLock> {
    acquire_lock_at(&lock_path_for(settings, dir_name))
}
