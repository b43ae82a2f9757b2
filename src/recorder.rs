//! Background capture of a process's output into the debug log file.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::sink::{ErrorSink, StderrErrorSink};
use crate::stream::OutputStream;

/// What a finished recording produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingOutcome {
    pub lines_written: usize,
    /// First failure, if any. Lines after a write failure are drained and discarded.
    pub error: Option<String>,
}

/// Handle to a running recorder. Dropping it detaches the recorder.
#[derive(Debug)]
pub struct RecordingHandle {
    path: PathBuf,
    handle: JoinHandle<RecordingOutcome>,
}

impl RecordingHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the stream closes and the log is flushed.
    pub fn join(self) -> RecordingOutcome {
        self.handle.join().unwrap_or_else(|_| RecordingOutcome {
            lines_written: 0,
            error: Some("debug recorder thread panicked".to_string()),
        })
    }
}

/// Start recording `stream` into `destination` with the default stderr error sink.
pub fn record(stream: OutputStream, destination: &Path) -> io::Result<RecordingHandle> {
    record_with(stream, destination, Arc::new(StderrErrorSink))
}

/// Start recording on a dedicated thread. The file is truncated; every line is written newline-terminated.
///
/// The recorder always reads the stream to its end, even after the log becomes unwritable,
/// so the child never stalls on a full pipe.
pub fn record_with(
    stream: OutputStream,
    destination: &Path,
    errors: Arc<dyn ErrorSink>,
) -> io::Result<RecordingHandle> {
    let path = destination.to_path_buf();
    let thread_path = path.clone();
    let handle = thread::Builder::new()
        .name("debug-recorder".to_string())
        .spawn(move || drain_into_file(stream, &thread_path, errors.as_ref()))?;
    Ok(RecordingHandle { path, handle })
}

fn open_log(path: &Path) -> io::Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(BufWriter::new(File::create(path)?))
}

fn drain_into_file(
    mut stream: OutputStream,
    path: &Path,
    errors: &dyn ErrorSink,
) -> RecordingOutcome {
    let mut outcome = RecordingOutcome::default();
    let fail = |outcome: &mut RecordingOutcome, what: &str, e: &io::Error| {
        let context = format!("{what} {}", path.display());
        errors.report(&context, e);
        if outcome.error.is_none() {
            outcome.error = Some(format!("{context}: {e}"));
        }
    };

    let mut writer = match open_log(path) {
        Ok(w) => Some(w),
        Err(e) => {
            fail(&mut outcome, "cannot open debug log", &e);
            None
        }
    };

    loop {
        match stream.next_line() {
            Ok(Some(line)) => {
                if let Some(w) = writer.as_mut() {
                    match writeln!(w, "{line}") {
                        Ok(()) => outcome.lines_written += 1,
                        Err(e) => {
                            fail(&mut outcome, "cannot write debug log", &e);
                            writer = None;
                        }
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                fail(&mut outcome, "cannot read process output for", &e);
                break;
            }
        }
    }

    if let Some(mut w) = writer {
        if let Err(e) = w.flush() {
            fail(&mut outcome, "cannot flush debug log", &e);
        }
    }
    outcome
}
