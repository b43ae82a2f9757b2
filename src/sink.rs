//! Output sinks: where listener lines and background recorder errors go.

/// Receives one line of diagnostics or process output at a time, in emission order.
pub trait OutputSink {
    fn line(&mut self, line: &str);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn line(&mut self, _line: &str) {}
}

/// Collects lines in memory.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }
}

impl OutputSink for Transcript {
    fn line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}

/// Prints each line to stderr behind a fixed prefix.
#[derive(Debug, Clone)]
pub struct StderrSink {
    prefix: String,
}

impl StderrSink {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for StderrSink {
    fn default() -> Self {
        Self::new("userland-exec: ")
    }
}

impl OutputSink for StderrSink {
    fn line(&mut self, line: &str) {
        eprintln!("{}{}", self.prefix, line);
    }
}

impl<F> OutputSink for F
where
    F: FnMut(&str),
{
    fn line(&mut self, line: &str) {
        self(line)
    }
}

/// Destination for failures inside background tasks that have no caller left to return to.
pub trait ErrorSink: Send + Sync {
    fn report(&self, context: &str, error: &std::io::Error);
}

/// Logs background failures to stderr (and to tracing when enabled).
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrErrorSink;

impl ErrorSink for StderrErrorSink {
    fn report(&self, context: &str, error: &std::io::Error) {
        #[cfg(feature = "trace")]
        tracing::warn!(context, %error, "background task failed");
        let use_err = crate::color::color_enabled_stderr();
        crate::color::log_warn_stderr(use_err, &format!("userland-exec: {context}: {error}"));
    }
}
