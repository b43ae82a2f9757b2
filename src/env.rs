//! Environment overlay applied to wrapped (in-userland) executions.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::{Settings, DEBUG_LEVEL_DISABLED, EXTERNAL_STORAGE_BIND_TARGET};

pub const ENV_LD_LIBRARY_PATH: &str = "LD_LIBRARY_PATH";
pub const ENV_ROOT_PATH: &str = "ROOT_PATH";
pub const ENV_ROOTFS_PATH: &str = "ROOTFS_PATH";
pub const ENV_PROOT_DEBUG_LEVEL: &str = "PROOT_DEBUG_LEVEL";
pub const ENV_EXTRA_BINDINGS: &str = "EXTRA_BINDINGS";

/// The five variables recognized by the userland entry scripts.
pub const OVERLAY_KEYS: &[&str] = &[
    ENV_LD_LIBRARY_PATH,
    ENV_ROOT_PATH,
    ENV_ROOTFS_PATH,
    ENV_PROOT_DEBUG_LEVEL,
    ENV_EXTRA_BINDINGS,
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentOverlay {
    vars: BTreeMap<String, String>,
}

impl EnvironmentOverlay {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compute the overlay for running inside `<files_dir>/<execution_dir_name>`.
    pub fn build(settings: &Settings, execution_dir_name: &str, debug_enabled: bool) -> Self {
        let root = settings.files_dir.display().to_string();
        let level = if debug_enabled {
            settings.debug_level.clone()
        } else {
            DEBUG_LEVEL_DISABLED.to_string()
        };
        let mut vars = BTreeMap::new();
        vars.insert(
            ENV_LD_LIBRARY_PATH.to_string(),
            settings.support_dir().display().to_string(),
        );
        vars.insert(
            ENV_ROOTFS_PATH.to_string(),
            format!("{root}/{execution_dir_name}"),
        );
        vars.insert(ENV_ROOT_PATH.to_string(), root);
        vars.insert(ENV_PROOT_DEBUG_LEVEL.to_string(), level);
        vars.insert(
            ENV_EXTRA_BINDINGS.to_string(),
            format!(
                "-b {}:{EXTERNAL_STORAGE_BIND_TARGET}",
                settings.external_storage.display()
            ),
        );
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for EnvironmentOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs = self
            .vars
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{{{pairs}}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn settings() -> Settings {
        let mut s = Settings::with_files_dir("/data/files");
        s.external_storage = PathBuf::from("/storage/emulated/0");
        s.debug_level = "4".to_string();
        s
    }

    #[test]
    fn test_overlay_has_exactly_five_keys() {
        let env = EnvironmentOverlay::build(&settings(), "1", false);
        assert_eq!(env.len(), 5);
        for k in OVERLAY_KEYS {
            assert!(env.get(k).is_some(), "missing {k}");
        }
    }

    #[test]
    fn test_overlay_values() {
        let env = EnvironmentOverlay::build(&settings(), "1", false);
        assert_eq!(env.get(ENV_LD_LIBRARY_PATH), Some("/data/files/support"));
        assert_eq!(env.get(ENV_ROOT_PATH), Some("/data/files"));
        assert_eq!(env.get(ENV_ROOTFS_PATH), Some("/data/files/1"));
        assert_eq!(env.get(ENV_PROOT_DEBUG_LEVEL), Some("-1"));
        assert_eq!(
            env.get(ENV_EXTRA_BINDINGS),
            Some("-b /storage/emulated/0:/sdcard")
        );
    }

    #[test]
    fn test_debug_level_only_when_enabled() {
        let env = EnvironmentOverlay::build(&settings(), "2", true);
        assert_eq!(env.get(ENV_PROOT_DEBUG_LEVEL), Some("4"));
    }

    #[test]
    fn test_display_lists_pairs() {
        let env = EnvironmentOverlay::build(&settings(), "1", false);
        let shown = env.to_string();
        assert!(shown.starts_with('{') && shown.ends_with('}'));
        assert!(shown.contains("ROOTFS_PATH=/data/files/1"));
        assert_eq!(EnvironmentOverlay::empty().to_string(), "{}");
    }
}
