#![allow(clippy::module_name_repetitions)]
//! Process launch with a working directory, the userland environment overlay and
//! one combined output stream routed to a listener or to the debug recorder.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;

#[cfg(feature = "trace")]
use tracing::instrument;

use crate::config::Settings;
use crate::env::EnvironmentOverlay;
use crate::errors::{ExecError, Result};
use crate::recorder::{self, RecordingHandle};
use crate::sink::{ErrorSink, OutputSink, StderrErrorSink};
use crate::stream::{output_pipe, OutputStream};
use crate::util::bracket_list;
use crate::util::fs::ensure_dir;

/// Commands carrying this marker enter the userland through the proot entry script;
/// only those are eligible for debug log capture.
pub const PROOT_ENTRY_MARKER: &str = "execInProot";

/// One process invocation. Built once, consumed by `ProcessRunner::run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    cwd: PathBuf,
    command: Vec<String>,
    env: Vec<(String, String)>,
    wait: bool,
    wrap: bool,
    discard_output: bool,
}

impl ProcessSpec {
    /// Blocking, unwrapped invocation of `command` (program first) in `cwd`.
    pub fn new<I, S>(cwd: impl Into<PathBuf>, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cwd: cwd.into(),
            command: command.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            wait: true,
            wrap: false,
            discard_output: false,
        }
    }

    pub fn wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    /// Apply the userland environment overlay.
    pub fn wrap(mut self, wrap: bool) -> Self {
        self.wrap = wrap;
        self
    }

    /// Send the child's output to the null device instead of a pipe. For detached
    /// children that must keep running after this process exits.
    pub fn discard_output(mut self, discard: bool) -> Self {
        self.discard_output = discard;
        self
    }

    /// Extra variable, applied after the overlay.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn is_wait(&self) -> bool {
        self.wait
    }

    pub fn is_wrapped(&self) -> bool {
        self.wrap
    }

    pub fn discards_output(&self) -> bool {
        self.discard_output
    }

    /// Name of the execution directory, used to derive ROOTFS_PATH.
    pub fn execution_dir_name(&self) -> String {
        self.cwd
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A launched process. The output stream, when nobody else claimed it, is left here for the caller.
#[derive(Debug)]
pub struct ExecutionResult {
    command: Vec<String>,
    child: Child,
    status: Option<ExitStatus>,
    output: Option<OutputStream>,
    recording: Option<RecordingHandle>,
}

impl ExecutionResult {
    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    /// Exit status, once known.
    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    pub fn code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }

    /// True only for a process that was waited on and exited with 0.
    pub fn success(&self) -> bool {
        self.status.map(|s| s.success()).unwrap_or(false)
    }

    /// Claim the output stream of a non-blocking run.
    pub fn take_output(&mut self) -> Option<OutputStream> {
        self.output.take()
    }

    /// Claim the debug recorder of a redirected run.
    pub fn take_recording(&mut self) -> Option<RecordingHandle> {
        self.recording.take()
    }

    /// Wait for exit. Drain or take the output first if the process may write more than a pipe buffer.
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        if let Some(s) = self.status {
            return Ok(s);
        }
        let s = self.child.wait()?;
        self.status = Some(s);
        Ok(s)
    }

    /// Deliver any unclaimed output to `listener`, then wait for exit.
    pub fn finish(&mut self, listener: &mut dyn OutputSink) -> io::Result<ExitStatus> {
        if let Some(mut out) = self.output.take() {
            out.drain_to(listener)?;
        }
        self.wait()
    }

    /// Non-blocking exit check.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        if self.status.is_some() {
            return Ok(self.status);
        }
        let s = self.child.try_wait()?;
        if s.is_some() {
            self.status = s;
        }
        Ok(s)
    }

    /// Ask the process to stop (SIGTERM).
    pub fn terminate(&self) -> io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        let pid = i32::try_from(self.child.id())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from)
    }

    /// Force the process to stop (SIGKILL).
    pub fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    /// Typed outcome: `NotWaited` before the process was waited on, `CommandFailed` unless it exited 0.
    pub fn check(&self) -> Result<()> {
        match self.status {
            Some(s) if s.success() => Ok(()),
            Some(s) => Err(ExecError::CommandFailed {
                command: bracket_list(&self.command),
                code: s.code(),
            }),
            None => Err(ExecError::NotWaited {
                command: bracket_list(&self.command),
            }),
        }
    }
}

/// Launches processes for one userland storage root.
#[derive(Clone)]
pub struct ProcessRunner {
    settings: Settings,
    errors: Arc<dyn ErrorSink>,
}

impl std::fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRunner")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ProcessRunner {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            errors: Arc::new(StderrErrorSink),
        }
    }

    /// Route background recorder failures somewhere other than stderr.
    pub fn with_error_sink(mut self, errors: Arc<dyn ErrorSink>) -> Self {
        self.errors = errors;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Whether output of `command` goes to the debug log instead of the listener.
    pub fn redirects_to_debug_log(&self, command: &[String]) -> bool {
        self.settings.debug_enabled && command.iter().any(|a| a.contains(PROOT_ENTRY_MARKER))
    }

    /// Overlay for `spec`: the userland variables when wrapped, otherwise nothing.
    pub fn overlay_for(&self, spec: &ProcessSpec) -> EnvironmentOverlay {
        if spec.wrap {
            EnvironmentOverlay::build(
                &self.settings,
                &spec.execution_dir_name(),
                self.settings.debug_enabled,
            )
        } else {
            EnvironmentOverlay::empty()
        }
    }

    /// Launch `spec`.
    ///
    /// Only a failure to start the process is returned as an error (`ExecError::Launch`,
    /// also reported to `listener`). A non-zero exit is reported to `listener`; use
    /// `ExecutionResult::check` for a typed outcome.
    #[cfg_attr(
        feature = "trace",
        instrument(
            level = "info",
            skip(self, spec, listener),
            fields(command = %bracket_list(&spec.command), wrap = spec.wrap, wait = spec.wait)
        )
    )]
    pub fn run(&self, spec: ProcessSpec, listener: &mut dyn OutputSink) -> Result<ExecutionResult> {
        let overlay = self.overlay_for(&spec);
        let shown = bracket_list(&spec.command);

        let launch_err = |listener: &mut dyn OutputSink, e: io::Error| {
            listener.line(&format!("Exec: {e}"));
            #[cfg(feature = "trace")]
            tracing::error!(error = %e, "launch failed");
            ExecError::Launch {
                command: shown.clone(),
                source: e,
            }
        };

        let Some((program, args)) = spec.command.split_first() else {
            return Err(launch_err(
                listener,
                io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
            ));
        };

        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&spec.cwd).stdin(Stdio::null());
        let read_end = if spec.discard_output {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
            None
        } else {
            let (read_end, write_end) = output_pipe().map_err(|e| launch_err(listener, e))?;
            let err_end = write_end.try_clone().map_err(|e| launch_err(listener, e))?;
            cmd.stdout(Stdio::from(write_end))
                .stderr(Stdio::from(err_end));
            Some(read_end)
        };
        for (k, v) in overlay.iter() {
            cmd.env(k, v);
        }
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }

        listener.line(&format!("Running: {shown} with env {overlay}"));

        let spawned = cmd.spawn();
        // The command still owns our copies of the write end; the reader sees EOF only once they are closed.
        drop(cmd);
        let mut child = spawned.map_err(|e| launch_err(listener, e))?;
        let (output, recording) = match read_end {
            Some(read_end) => self.route_output(&spec, OutputStream::new(read_end), listener),
            None => (None, None),
        };

        let mut status = None;
        if spec.wait {
            let s = child.wait()?;
            if !s.success() {
                listener.line(&format!("Exec: Failed to execute command {shown}"));
                #[cfg(feature = "trace")]
                tracing::warn!(code = ?s.code(), "command failed");
            }
            status = Some(s);
        }

        Ok(ExecutionResult {
            command: spec.command,
            child,
            status,
            output,
            recording,
        })
    }

    /// Hand `stream` to its single consumer: the debug recorder, the listener, or the caller.
    fn route_output(
        &self,
        spec: &ProcessSpec,
        mut stream: OutputStream,
        listener: &mut dyn OutputSink,
    ) -> (Option<OutputStream>, Option<RecordingHandle>) {
        if self.redirects_to_debug_log(&spec.command) {
            let log = self.settings.debug_log_path();
            return match recorder::record_with(stream, &log, Arc::clone(&self.errors)) {
                Ok(h) => {
                    listener.line("Output being redirected to PRoot debug log.");
                    (None, Some(h))
                }
                Err(e) => {
                    // The stream went down with the failed thread; the child sees a closed pipe, not a full one.
                    listener.line(&format!("Exec: could not start debug recorder: {e}"));
                    self.errors.report("cannot start debug recorder", &e);
                    (None, None)
                }
            };
        }
        if spec.wait {
            if let Err(e) = stream.drain_to(listener) {
                listener.line(&format!("Exec: output stream failed: {e}"));
            }
            return (None, None);
        }
        (Some(stream), None)
    }

    /// Run `script` through the userland shell launcher inside `<files_dir>/<dir_name>`
    /// (created if missing), with the overlay applied.
    pub fn run_in_userland(
        &self,
        dir_name: &str,
        script: &str,
        listener: &mut dyn OutputSink,
        wait: bool,
    ) -> Result<ExecutionResult> {
        let dir = self.settings.userland_dir(dir_name);
        ensure_dir(&dir)?;
        let mut command = self.settings.shell_launcher.clone();
        command.push(script.to_string());
        let spec = ProcessSpec::new(dir, command).wrap(true).wait(wait);
        self.run(spec, listener)
    }
}
