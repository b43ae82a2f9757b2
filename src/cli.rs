use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Validate a userland directory or archive name given on the command line.
fn validate_plain_name(s: &str) -> Result<String, String> {
    if s.is_empty() || s == "." || s == ".." || s.contains('/') {
        Err("must be a plain name without '/'".to_string())
    } else {
        Ok(s.to_string())
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "userland-exec",
    version,
    about = "Run commands inside a proot userland and back up or restore its filesystem."
)]
pub(crate) struct Cli {
    /// YAML settings file (overrides USERLAND_EXEC_CONFIG)
    #[arg(long, global = true)]
    pub(crate) config: Option<PathBuf>,

    /// Userland storage root (overrides settings and USERLAND_EXEC_FILES_DIR)
    #[arg(long = "files-dir", global = true)]
    pub(crate) files_dir: Option<PathBuf>,

    /// Capture output of proot entry commands into the debug log
    #[arg(long, global = true)]
    pub(crate) debug: bool,

    /// Colorize stderr: auto|always|never
    #[arg(long = "color", value_enum, global = true)]
    pub(crate) color: Option<userland_exec::ColorMode>,

    /// Print resolved settings and per-step details
    #[arg(long, global = true)]
    pub(crate) verbose: bool,

    #[command(subcommand)]
    pub(crate) command: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Cmd {
    /// Run a command in a userland directory
    Exec {
        /// Userland directory used as working directory
        #[arg(long, default_value = "1", value_parser = validate_plain_name)]
        dir: String,
        /// Apply the userland environment overlay
        #[arg(long)]
        wrap: bool,
        /// Start the command, print its pid and return; its output is discarded
        #[arg(long = "no-wait")]
        no_wait: bool,
        /// Command and arguments
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// Run a script through the userland shell
    Shell {
        #[arg(value_parser = validate_plain_name)]
        dir: String,
        script: String,
    },
    /// Archive a userland and copy the archive to a destination directory
    Backup {
        #[arg(value_parser = validate_plain_name)]
        dir: String,
        /// Archive file name, e.g. rootfs.tar.gz
        #[arg(value_parser = validate_plain_name)]
        name: String,
        destination: PathBuf,
        /// Print the plan without executing
        #[arg(long = "dry-run")]
        dry_run: bool,
        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace a userland with the contents of an archive
    Restore {
        archive: PathBuf,
        #[arg(value_parser = validate_plain_name)]
        dir: String,
        #[arg(long = "dry-run")]
        dry_run: bool,
        #[arg(long)]
        json: bool,
    },
    /// Resolve the bundled-binary architecture
    Arch {
        /// Reported ABI, in priority order (defaults to the running host)
        #[arg(long = "abi")]
        abis: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Unpack the downloaded rootfs inside a userland
    Extract {
        #[arg(value_parser = validate_plain_name)]
        dir: String,
    },
    /// Report whether a userland's support assets are present
    Assets {
        #[arg(value_parser = validate_plain_name)]
        dir: String,
        /// Also delete leftover rootfs archives
        #[arg(long = "prune")]
        prune: bool,
    },
    /// Delete a userland directory
    Delete {
        #[arg(value_parser = validate_plain_name)]
        dir: String,
    },
}
