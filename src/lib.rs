//! userland-exec: run processes inside a proot-style Linux userland, capture their
//! output, and back up or restore the userland tree with the external tar tool.
//!
//! Modules, leaves first:
//! - `arch`: host ABI to bundled-binary architecture
//! - `env`: environment overlay for wrapped executions
//! - `runner`: process launch and output routing
//! - `recorder`: background debug log capture
//! - `archive`: backup/restore pipelines
//! - `userland`: per-userland directory housekeeping

pub mod arch;
pub mod archive;
pub mod color;
pub mod config;
pub mod env;
pub mod errors;
pub mod lock;
pub mod recorder;
pub mod runner;
pub mod sink;
pub mod stream;
pub mod telemetry;
pub mod userland;
pub mod util;

pub use arch::{host_abis, resolve as resolve_architecture, Architecture};
pub use archive::{
    timestamp_now, ArchiveManager, ArchiveSource, ArchiveStep, BackupJob, LocalArchive,
    RestoreJob, BACKUP_EXCLUSIONS,
};
pub use color::{
    color_enabled_stderr, log_error_stderr, log_info_stderr, log_warn_stderr, paint,
    set_color_mode, ColorMode,
};
pub use config::Settings;
pub use env::EnvironmentOverlay;
pub use errors::{exit_code_for_exec_error, exit_code_for_io_error, ExecError, Result};
pub use lock::{acquire_lock_at, acquire_userland_lock, UserlandLock};
pub use recorder::{RecordingHandle, RecordingOutcome};
pub use runner::{ExecutionResult, ProcessRunner, ProcessSpec, PROOT_ENTRY_MARKER};
pub use sink::{ErrorSink, NullSink, OutputSink, StderrErrorSink, StderrSink, Transcript};
pub use stream::OutputStream;
pub use telemetry::telemetry_init;
pub use userland::UserlandFs;
pub use util::{shell_escape, shell_join, ShellScript};
