//! Host ABI to bundled-binary architecture resolution.

use std::fmt;

use serde::Serialize;

use crate::errors::{ExecError, Result};

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    Arm64,
    Arm,
    X86_64,
    X86,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::Arm64 => "arm64",
            Architecture::Arm => "arm",
            Architecture::X86_64 => "x86_64",
            Architecture::X86 => "x86",
        }
    }

    /// Translate one host-reported ABI; unknown ABIs are unsupported.
    pub fn from_abi(abi: &str) -> Option<Self> {
        match abi {
            "arm64-v8a" => Some(Architecture::Arm64),
            "armeabi-v7a" => Some(Architecture::Arm),
            "x86_64" => Some(Architecture::X86_64),
            "x86" => Some(Architecture::X86),
            _ => None,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the first supported architecture in the host's priority order.
pub fn resolve<S: AsRef<str>>(reported_abis: &[S]) -> Result<Architecture> {
    reported_abis
        .iter()
        .find_map(|abi| Architecture::from_abi(abi.as_ref()))
        .ok_or_else(|| ExecError::UnsupportedArchitecture {
            reported: reported_abis
                .iter()
                .map(|s| s.as_ref().to_string())
                .collect(),
        })
}

/// ABI list reported for the running host, most preferred first.
pub fn host_abis() -> Vec<String> {
    let abis: &[&str] = match std::env::consts::ARCH {
        "aarch64" => &["arm64-v8a", "armeabi-v7a"],
        "arm" => &["armeabi-v7a"],
        "x86_64" => &["x86_64", "x86"],
        "x86" => &["x86"],
        other => return vec![other.to_string()],
    };
    abis.iter().map(|s| s.to_string()).collect()
}
