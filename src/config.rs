//! Runtime settings: storage paths, debug capture preferences and the userland shell launcher.
//!
//! Precedence (lowest to highest): defaults, YAML file, USERLAND_EXEC_* environment, CLI flags.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{ExecError, Result};

/// Debug verbosity handed to the userland tool when debug capture is off.
pub const DEBUG_LEVEL_DISABLED: &str = "-1";

/// Fixed in-userland mount point for the host's external storage.
pub const EXTERNAL_STORAGE_BIND_TARGET: &str = "/sdcard";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Userland storage root; every userland lives in `<files_dir>/<name>`.
    pub files_dir: PathBuf,
    /// Shared-library search path for bundled binaries. Defaults to `<files_dir>/support`.
    pub support_dir: Option<PathBuf>,
    /// Host path bound to `/sdcard` inside the userland.
    pub external_storage: PathBuf,
    pub debug_enabled: bool,
    pub debug_level: String,
    /// Debug log destination. Defaults to `<files_dir>/PRoot_Debug_Log`.
    pub debug_log_path: Option<PathBuf>,
    /// Program and leading arguments used to run a script inside the userland; the script is appended.
    pub shell_launcher: Vec<String>,
    pub tar_program: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            files_dir: default_files_dir(),
            support_dir: None,
            external_storage: PathBuf::from("/sdcard"),
            debug_enabled: false,
            debug_level: "1".to_string(),
            debug_log_path: None,
            shell_launcher: vec![
                "../support/busybox".to_string(),
                "sh".to_string(),
                "-c".to_string(),
            ],
            tar_program: "tar".to_string(),
        }
    }
}

fn default_files_dir() -> PathBuf {
    home::home_dir()
        .map(|h| h.join(".local").join("share").join("userland-exec"))
        .unwrap_or_else(|| env::temp_dir().join("userland-exec"))
}

fn env_flag(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_nonempty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl Settings {
    /// Settings rooted at `files_dir` with every other field defaulted.
    pub fn with_files_dir(files_dir: impl Into<PathBuf>) -> Self {
        Self {
            files_dir: files_dir.into(),
            ..Self::default()
        }
    }

    /// Parse a YAML settings file; absent keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_yaml::from_str(&text)
            .map_err(|e| ExecError::Config(format!("{}: {e}", path.display())))
    }

    /// Defaults, then the YAML file named by `explicit` or USERLAND_EXEC_CONFIG, then the environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let file = explicit
            .map(Path::to_path_buf)
            .or_else(|| env_nonempty("USERLAND_EXEC_CONFIG").map(PathBuf::from));
        let mut s = match file {
            Some(p) => Self::from_yaml_file(&p)?,
            None => Self::default(),
        };
        s.apply_env();
        s.validate()?;
        Ok(s)
    }

    /// Overlay USERLAND_EXEC_* environment variables.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_nonempty("USERLAND_EXEC_FILES_DIR") {
            self.files_dir = PathBuf::from(shell_tilde(&v));
        }
        if let Some(v) = env_nonempty("USERLAND_EXEC_SUPPORT_DIR") {
            self.support_dir = Some(PathBuf::from(shell_tilde(&v)));
        }
        if let Some(v) = env_nonempty("USERLAND_EXEC_EXTERNAL_STORAGE") {
            self.external_storage = PathBuf::from(v);
        }
        if let Some(v) = env_nonempty("USERLAND_EXEC_DEBUG") {
            self.debug_enabled = env_flag(&v);
        }
        if let Some(v) = env_nonempty("USERLAND_EXEC_DEBUG_LEVEL") {
            self.debug_level = v;
        }
        if let Some(v) = env_nonempty("USERLAND_EXEC_DEBUG_LOG") {
            self.debug_log_path = Some(PathBuf::from(shell_tilde(&v)));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.shell_launcher.is_empty() {
            return Err(ExecError::Config(
                "shell_launcher must name at least a program".to_string(),
            ));
        }
        if self.tar_program.trim().is_empty() {
            return Err(ExecError::Config("tar_program is empty".to_string()));
        }
        if self.files_dir.as_os_str().is_empty() {
            return Err(ExecError::Config("files_dir is empty".to_string()));
        }
        Ok(())
    }

    pub fn support_dir(&self) -> PathBuf {
        self.support_dir
            .clone()
            .unwrap_or_else(|| self.files_dir.join("support"))
    }

    pub fn debug_log_path(&self) -> PathBuf {
        self.debug_log_path
            .clone()
            .unwrap_or_else(|| self.files_dir.join("PRoot_Debug_Log"))
    }

    /// Level passed to the userland tool: the configured level, or the disabled sentinel.
    pub fn effective_debug_level(&self) -> &str {
        if self.debug_enabled {
            &self.debug_level
        } else {
            DEBUG_LEVEL_DISABLED
        }
    }

    /// Root directory of one userland.
    pub fn userland_dir(&self, name: &str) -> PathBuf {
        self.files_dir.join(name)
    }
}

fn shell_tilde(v: &str) -> String {
    match (v.strip_prefix("~/"), home::home_dir()) {
        (Some(rest), Some(h)) => h.join(rest).display().to_string(),
        _ => v.to_string(),
    }
}
