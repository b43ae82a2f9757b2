//! Error mapping guide:
//! - Launch failures are the only fatal outcome of running a process; map io::ErrorKind::NotFound to 127.
//!   Other I/O failures (a missing archive, a failed copy) are plain failures and map to 1.
//! - Non-zero exits are typed as CommandFailed so pipelines can stop at the failing step.
//! - Keep Display strings stable; the CLI and the listener transcript both show them.
use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, ExecError>;

#[derive(Debug)]
pub enum ExecError {
    /// The OS could not start the process (missing binary, permission denied).
    Launch { command: String, source: io::Error },
    /// The process started but exited unsuccessfully.
    CommandFailed { command: String, code: Option<i32> },
    /// The outcome was asked for before the process was waited on.
    NotWaited { command: String },
    /// None of the host-reported ABIs maps to a bundled architecture.
    UnsupportedArchitecture { reported: Vec<String> },
    /// Another pipeline holds the lock for this userland.
    LockHeld { path: String },
    Config(String),
    Io(io::Error),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Launch { command, source } => {
                write!(f, "Exec: failed to start {command}: {source}")
            }
            ExecError::CommandFailed { command, code } => match code {
                Some(c) => write!(f, "Exec: Failed to execute command {command} (exit code {c})"),
                None => write!(f, "Exec: Failed to execute command {command} (killed by signal)"),
            },
            ExecError::NotWaited { command } => {
                write!(f, "Exec: command {command} has not been waited on")
            }
            ExecError::UnsupportedArchitecture { reported } => {
                write!(f, "No supported ABI! (reported: {})", reported.join(", "))
            }
            ExecError::LockHeld { path } => write!(
                f,
                "Another archive operation is already running for this userland (lock held at {path})"
            ),
            ExecError::Config(msg) => write!(f, "invalid configuration: {msg}"),
            ExecError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ExecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecError::Launch { source, .. } => Some(source),
            ExecError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ExecError {
    fn from(e: io::Error) -> Self {
        ExecError::Io(e)
    }
}

/// Map an io::Error to a process exit code:
/// - 127 for NotFound (command not found)
/// - 1 for all other errors
pub fn exit_code_for_io_error(e: &io::Error) -> u8 {
    if e.kind() == io::ErrorKind::NotFound {
        127
    } else {
        1
    }
}

/// Convert ExecError to an exit code. Command failures pass the child's code through.
pub fn exit_code_for_exec_error(e: &ExecError) -> u8 {
    match e {
        ExecError::Launch { source, .. } => exit_code_for_io_error(source),
        ExecError::CommandFailed { code, .. } => match code {
            Some(c) if (1..=255).contains(c) => *c as u8,
            _ => 1,
        },
        ExecError::Io(_)
        | ExecError::NotWaited { .. }
        | ExecError::UnsupportedArchitecture { .. }
        | ExecError::LockHeld { .. } => 1,
        ExecError::Config(_) => 2,
    }
}
