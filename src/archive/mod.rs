//! Backup and restore of a userland tree through the external tar tool.
//!
//! Each pipeline is a typed list of `ArchiveStep`s run strictly in order. Shell
//! steps go through `ProcessRunner` inside the userland context; a step that does
//! not succeed stops the pipeline, so the live tree or the previous archive is only
//! ever replaced by a completed result.

pub mod job;
pub mod plan;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[cfg(feature = "trace")]
use tracing::instrument;

use crate::errors::{ExecError, Result};
use crate::runner::ProcessRunner;
use crate::sink::OutputSink;
use crate::util::fs::{copy_from_reader, copy_overwrite, remove_path};

pub use job::{ArchiveSource, BackupJob, LocalArchive, RestoreJob, BACKUP_EXCLUSIONS};
pub use plan::ArchiveStep;

/// `yyyy_MM_dd_HH_mm_ss` in local time.
pub fn timestamp_now() -> String {
    chrono::Local::now().format("%Y_%m_%d_%H_%M_%S").to_string()
}

#[derive(Debug, Clone, Copy)]
pub struct ArchiveManager<'a> {
    runner: &'a ProcessRunner,
}

impl<'a> ArchiveManager<'a> {
    pub fn new(runner: &'a ProcessRunner) -> Self {
        Self { runner }
    }

    fn files_dir(&self) -> &Path {
        &self.runner.settings().files_dir
    }

    /// Steps for `job`, with `stamp` used in the destination file name.
    pub fn plan_backup(&self, job: &BackupJob, stamp: &str) -> Vec<ArchiveStep> {
        let root = self.files_dir();
        let temp = root.join(job.temp_name());
        let archive = root.join(&job.archive_name);
        vec![
            ArchiveStep::Compress {
                source: root.join(&job.source_dir_name),
                temp: temp.clone(),
                exclusions: job.exclusions.clone(),
            },
            ArchiveStep::Finalize {
                temp,
                target: archive.clone(),
                replace_tree: false,
            },
            ArchiveStep::CopyOut {
                from: archive,
                to: job.destination_dir.join(job.stamped_name(stamp)),
            },
        ]
    }

    /// Steps for restoring `source_name` into `job`'s target directory.
    pub fn plan_restore(&self, job: &RestoreJob, source_name: &str) -> Vec<ArchiveStep> {
        let root = self.files_dir();
        let imported = root.join(RestoreJob::import_name(source_name));
        let temp_dir = root.join(job.temp_dir_name());
        vec![
            ArchiveStep::Import {
                source_name: source_name.to_string(),
                to: imported.clone(),
            },
            ArchiveStep::Extract {
                archive: imported.clone(),
                into: temp_dir.clone(),
            },
            ArchiveStep::PromoteLegacyRoot {
                dir: temp_dir.clone(),
            },
            ArchiveStep::Finalize {
                temp: temp_dir,
                target: root.join(&job.target_dir_name),
                replace_tree: true,
            },
            ArchiveStep::Discard { path: imported },
        ]
    }

    /// Archive the userland and copy the result to the job's destination. Returns the copied file.
    #[cfg_attr(
        feature = "trace",
        instrument(level = "info", skip(self, job, listener), fields(source = %job.source_dir_name, archive = %job.archive_name))
    )]
    pub fn backup(&self, job: &BackupJob, listener: &mut dyn OutputSink) -> Result<PathBuf> {
        // Shell steps run inside the source directory and would create it; an absent source is an error.
        let source = self.files_dir().join(&job.source_dir_name);
        if !source.is_dir() {
            return Err(ExecError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("userland directory not found: {}", source.display()),
            )));
        }
        let steps = self.plan_backup(job, &timestamp_now());
        let dest = steps.iter().find_map(|s| match s {
            ArchiveStep::CopyOut { to, .. } => Some(to.clone()),
            _ => None,
        });
        self.execute(&job.source_dir_name, &steps, None, listener)?;
        dest.ok_or_else(|| ExecError::Config("backup plan has no copy step".to_string()))
    }

    /// Replace the job's target directory with the contents of `source`. Returns the live directory.
    #[cfg_attr(
        feature = "trace",
        instrument(level = "info", skip(self, job, source, listener), fields(target = %job.target_dir_name))
    )]
    pub fn restore(
        &self,
        job: &RestoreJob,
        source: &dyn ArchiveSource,
        listener: &mut dyn OutputSink,
    ) -> Result<PathBuf> {
        let steps = self.plan_restore(job, &source.name());
        self.execute(&job.exec_dir_name, &steps, Some(source), listener)?;
        Ok(self.files_dir().join(&job.target_dir_name))
    }

    /// Run `steps` in order; the first failing step ends the pipeline.
    pub fn execute(
        &self,
        exec_dir_name: &str,
        steps: &[ArchiveStep],
        source: Option<&dyn ArchiveSource>,
        listener: &mut dyn OutputSink,
    ) -> Result<()> {
        let total = steps.len();
        for (i, step) in steps.iter().enumerate() {
            listener.line(&format!("Archive step {}/{}: {}", i + 1, total, step.label()));
            let tar = &self.runner.settings().tar_program;
            if let Some(script) = step.script(tar) {
                let script = script?;
                let res = self
                    .runner
                    .run_in_userland(exec_dir_name, &script, listener, true)?;
                res.check()?;
                continue;
            }
            match step {
                ArchiveStep::CopyOut { from, to } => {
                    copy_overwrite(from, to)?;
                }
                ArchiveStep::Import { source_name, to } => {
                    let src = source.ok_or_else(|| {
                        ExecError::Config(format!("no archive source supplied for {source_name}"))
                    })?;
                    let mut reader = src.open()?;
                    copy_from_reader(&mut reader, to)?;
                }
                ArchiveStep::PromoteLegacyRoot { dir } => {
                    if promote_legacy_root(dir)? {
                        listener.line("Archive: lifted legacy top-level directory");
                    }
                }
                ArchiveStep::Discard { path } => {
                    if let Err(e) = remove_path(path) {
                        listener.line(&format!(
                            "Archive: could not remove {}: {e}",
                            path.display()
                        ));
                    }
                }
                ArchiveStep::Compress { .. }
                | ArchiveStep::Finalize { .. }
                | ArchiveStep::Extract { .. } => {}
            }
        }
        Ok(())
    }
}

/// Archives written by earlier releases carry the filesystem id (a number) as a leading
/// path component. When `dir` holds exactly one numeric directory and nothing else, move
/// that directory's contents up into `dir`. Returns whether anything moved.
pub fn promote_legacy_root(dir: &Path) -> io::Result<bool> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    if entries.len() != 1 {
        return Ok(false);
    }
    let Some(only) = entries.pop() else {
        return Ok(false);
    };
    let name = only.file_name();
    let numeric = name
        .to_str()
        .map(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false);
    if !numeric || !only.file_type()?.is_dir() {
        return Ok(false);
    }

    let mut staging = dir.as_os_str().to_owned();
    staging.push(".legacy");
    let staging = PathBuf::from(staging);
    remove_path(&staging)?;
    fs::rename(only.path(), &staging)?;
    fs::remove_dir(dir)?;
    fs::rename(&staging, dir)?;
    Ok(true)
}
