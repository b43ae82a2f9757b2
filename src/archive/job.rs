//! Backup/restore job descriptions and the archive source abstraction.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::errors::{ExecError, Result};
use crate::util::reject_newlines;

/// Paths never archived: pseudo-filesystems, device nodes, data/cache partitions,
/// host bind-mount points and stale lock files. Kept verbatim for compatibility
/// with archives written by earlier releases.
pub const BACKUP_EXCLUSIONS: &[&str] = &[
    "sys",
    "dev",
    "proc",
    "data",
    "mnt",
    "host-rootfs",
    "sdcard",
    "etc/mtab",
    "etc/ld.so.preload",
];

pub const ARCHIVE_SUFFIX: &str = ".tar.gz";
pub const TEMP_SUFFIX: &str = ".tmp";
pub const RESTORE_TEMP_SUFFIX: &str = ".restore.tmp";

/// Directory (under the storage root) that restore steps run in.
pub const DEFAULT_RESTORE_EXEC_DIR: &str = "support";

/// Reject names that could escape the storage root or break a command line.
pub fn validate_name(name: &str, what: &str) -> Result<()> {
    reject_newlines(name, what).map_err(ExecError::Config)?;
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0')
    {
        return Err(ExecError::Config(format!(
            "{what} must be a plain file name, got {name:?}"
        )));
    }
    Ok(())
}

/// Archive `<files_dir>/<source_dir_name>` to `<files_dir>/<archive_name>`, then copy a
/// timestamped version into `destination_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupJob {
    pub source_dir_name: String,
    pub archive_name: String,
    pub destination_dir: PathBuf,
    pub exclusions: Vec<String>,
}

impl BackupJob {
    pub fn new(
        source_dir_name: impl Into<String>,
        archive_name: impl Into<String>,
        destination_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let job = Self {
            source_dir_name: source_dir_name.into(),
            archive_name: archive_name.into(),
            destination_dir: destination_dir.into(),
            exclusions: BACKUP_EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
        };
        validate_name(&job.source_dir_name, "source directory")?;
        validate_name(&job.archive_name, "archive name")?;
        // The archive lands next to the userlands; it must not take the place of one.
        if job.archive_name == job.source_dir_name || job.archive_name == DEFAULT_RESTORE_EXEC_DIR {
            return Err(ExecError::Config(format!(
                "archive name {:?} collides with a userland directory",
                job.archive_name
            )));
        }
        Ok(job)
    }

    pub fn temp_name(&self) -> String {
        format!("{}{TEMP_SUFFIX}", self.archive_name)
    }

    /// `<basename>.<stamp>.tar.gz`
    pub fn stamped_name(&self, stamp: &str) -> String {
        let base = self
            .archive_name
            .strip_suffix(ARCHIVE_SUFFIX)
            .unwrap_or(&self.archive_name);
        format!("{base}.{stamp}{ARCHIVE_SUFFIX}")
    }
}

/// Replace `<files_dir>/<target_dir_name>` with the contents of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreJob {
    pub target_dir_name: String,
    pub exec_dir_name: String,
}

impl RestoreJob {
    pub fn new(target_dir_name: impl Into<String>) -> Result<Self> {
        let job = Self {
            target_dir_name: target_dir_name.into(),
            exec_dir_name: DEFAULT_RESTORE_EXEC_DIR.to_string(),
        };
        validate_name(&job.target_dir_name, "restore directory")?;
        Ok(job)
    }

    pub fn with_exec_dir(mut self, exec_dir_name: impl Into<String>) -> Result<Self> {
        self.exec_dir_name = exec_dir_name.into();
        validate_name(&self.exec_dir_name, "execution directory")?;
        Ok(self)
    }

    pub fn temp_dir_name(&self) -> String {
        format!("{}{RESTORE_TEMP_SUFFIX}", self.target_dir_name)
    }

    /// Working copy name for an incoming archive: `<stem>.tar.gz.restore.tmp`.
    pub fn import_name(source_name: &str) -> String {
        let stem = source_name
            .strip_suffix(ARCHIVE_SUFFIX)
            .unwrap_or(source_name);
        format!("{stem}{ARCHIVE_SUFFIX}{RESTORE_TEMP_SUFFIX}")
    }
}

/// Opaque locator for an archive to restore from.
pub trait ArchiveSource {
    /// Display/file name of the archive, e.g. `debian.2024_01_02_03_04_05.tar.gz`.
    fn name(&self) -> String;
    fn open(&self) -> io::Result<Box<dyn Read + '_>>;
}

/// An archive on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArchive {
    path: PathBuf,
}

impl LocalArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArchiveSource for LocalArchive {
    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive.tar.gz".to_string())
    }

    fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(File::open(&self.path)?))
    }
}
