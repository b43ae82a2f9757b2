//! Typed archive pipeline steps.
//!
//! Shell steps render to one `sh -c` script whose words are all escaped; the other
//! steps are plain filesystem operations performed between process invocations.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::util::ShellScript;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ArchiveStep {
    /// tar+gzip `source` into `temp`, skipping `exclusions`.
    Compress {
        source: PathBuf,
        temp: PathBuf,
        exclusions: Vec<String>,
    },
    /// Remove `target`, then rename `temp` onto it. Only a restore may replace a
    /// directory; a backup refuses to overwrite anything but a file.
    Finalize {
        temp: PathBuf,
        target: PathBuf,
        replace_tree: bool,
    },
    /// Copy a finished archive out of the storage root (overwrites).
    CopyOut { from: PathBuf, to: PathBuf },
    /// Copy the caller's archive into the storage root.
    Import { source_name: String, to: PathBuf },
    /// Unpack `archive` into a fresh `into` directory.
    Extract { archive: PathBuf, into: PathBuf },
    /// Lift the single numeric top-level directory of a legacy archive.
    PromoteLegacyRoot { dir: PathBuf },
    /// Best-effort removal of a working file.
    Discard { path: PathBuf },
}

fn path_word(p: &Path) -> io::Result<&str> {
    p.to_str().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path is not valid UTF-8: {}", p.display()),
        )
    })
}

impl ArchiveStep {
    pub fn label(&self) -> &'static str {
        match self {
            ArchiveStep::Compress { .. } => "compress",
            ArchiveStep::Finalize { .. } => "finalize",
            ArchiveStep::CopyOut { .. } => "copy",
            ArchiveStep::Import { .. } => "import",
            ArchiveStep::Extract { .. } => "extract",
            ArchiveStep::PromoteLegacyRoot { .. } => "promote-legacy-root",
            ArchiveStep::Discard { .. } => "discard",
        }
    }

    pub fn runs_in_shell(&self) -> bool {
        matches!(
            self,
            ArchiveStep::Compress { .. } | ArchiveStep::Finalize { .. } | ArchiveStep::Extract { .. }
        )
    }

    /// Script for shell steps; `None` for steps performed directly on the filesystem.
    pub fn script(&self, tar: &str) -> Option<io::Result<String>> {
        if !self.runs_in_shell() {
            return None;
        }
        Some(self.render_script(tar))
    }

    fn render_script(&self, tar: &str) -> io::Result<String> {
        let mut s = ShellScript::new();
        match self {
            ArchiveStep::Compress {
                source,
                temp,
                exclusions,
            } => {
                let temp = path_word(temp)?;
                let source = path_word(source)?;
                let mut words = vec![tar.to_string()];
                words.extend(exclusions.iter().map(|e| format!("--exclude={e}")));
                words.extend(["-cvpzf", temp, "-C", source, "."].map(String::from));
                s.command(["rm", "-rf", temp]).command(words);
            }
            ArchiveStep::Finalize {
                temp,
                target,
                replace_tree,
            } => {
                let temp = path_word(temp)?;
                let target = path_word(target)?;
                let rm_flags = if *replace_tree { "-rf" } else { "-f" };
                s.command(["rm", rm_flags, target]).command(["mv", temp, target]);
            }
            ArchiveStep::Extract { archive, into } => {
                let archive = path_word(archive)?;
                let into = path_word(into)?;
                s.command(["rm", "-rf", into])
                    .command(["mkdir", "-p", into])
                    .command([tar, "-xvpzf", archive, "-C", into]);
            }
            _ => {}
        }
        s.build()
    }
}
