//! Per-userland directory housekeeping: rootfs extraction, bundled asset checks, removal.

use std::fs;
use std::io;
use std::path::PathBuf;

use walkdir::WalkDir;

use crate::archive::job::validate_name;
use crate::errors::Result;
use crate::runner::{ExecutionResult, ProcessRunner};
use crate::sink::OutputSink;

/// Entry script that unpacks the downloaded rootfs inside the userland; runs under proot.
pub const EXTRACT_FILESYSTEM_COMMAND: &str =
    "../support/execInProot.sh /support/extractFilesystem.sh";

/// Leftover download archives are recognized by this fragment of their file name.
pub const ROOTFS_ARCHIVE_MARKER: &str = "rootfs.tar.gz";

#[derive(Debug, Clone, Copy)]
pub struct UserlandFs<'a> {
    runner: &'a ProcessRunner,
}

impl<'a> UserlandFs<'a> {
    pub fn new(runner: &'a ProcessRunner) -> Self {
        Self { runner }
    }

    /// `<files_dir>/<dir_name>`, created if missing.
    pub fn create_and_get_directory(&self, dir_name: &str) -> Result<PathBuf> {
        validate_name(dir_name, "userland directory")?;
        let dir = self.runner.settings().userland_dir(dir_name);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Bundled support directory of one userland.
    pub fn support_dir(&self, dir_name: &str) -> PathBuf {
        self.runner.settings().userland_dir(dir_name).join("support")
    }

    /// Unpack the rootfs for `dir_name`; blocks until the entry script exits.
    pub fn extract_filesystem(
        &self,
        dir_name: &str,
        listener: &mut dyn OutputSink,
    ) -> Result<ExecutionResult> {
        validate_name(dir_name, "userland directory")?;
        self.runner
            .run_in_userland(dir_name, EXTRACT_FILESYSTEM_COMMAND, listener, true)
    }

    /// True when the userland's support directory exists and is not empty.
    pub fn assets_present(&self, dir_name: &str) -> bool {
        let dir = self.support_dir(dir_name);
        dir.is_dir()
            && fs::read_dir(&dir)
                .map(|mut it| it.next().is_some())
                .unwrap_or(false)
    }

    /// Delete downloaded rootfs archives left in the support directory. Returns how many were removed.
    pub fn remove_rootfs_archives(&self, dir_name: &str) -> io::Result<usize> {
        let dir = self.support_dir(dir_name);
        if !dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in WalkDir::new(&dir) {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_string_lossy()
                    .contains(ROOTFS_ARCHIVE_MARKER)
            {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove the whole userland tree. Returns whether the directory is gone afterwards.
    pub fn delete_filesystem(&self, dir_name: &str) -> Result<bool> {
        validate_name(dir_name, "userland directory")?;
        let dir = self.runner.settings().userland_dir(dir_name);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(e) => {
                let use_err = crate::color::color_enabled_stderr();
                crate::color::log_warn_stderr(
                    use_err,
                    &format!("userland-exec: could not delete {}: {e}", dir.display()),
                );
                Ok(false)
            }
        }
    }
}
