//! The combined stdout/stderr pipe of one child process.
//!
//! An `OutputStream` has exactly one owner: the inline listener drain, the debug
//! recorder, or the caller of a non-blocking run. Handing it over moves it.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::os::fd::OwnedFd;

use crate::sink::OutputSink;

#[derive(Debug)]
pub struct OutputStream {
    reader: BufReader<File>,
}

impl OutputStream {
    pub(crate) fn new(read_end: File) -> Self {
        Self {
            reader: BufReader::new(read_end),
        }
    }

    /// Next line without its terminator; `Ok(None)` at end of input.
    /// Invalid UTF-8 is replaced rather than treated as an error.
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Deliver every remaining line to `sink`; returns the number of lines delivered.
    pub fn drain_to(&mut self, sink: &mut dyn OutputSink) -> io::Result<usize> {
        let mut count = 0;
        while let Some(line) = self.next_line()? {
            sink.line(&line);
            count += 1;
        }
        Ok(count)
    }

    pub fn into_inner(self) -> BufReader<File> {
        self.reader
    }
}

/// Create the pipe shared by the child's stdout and stderr.
/// Returns the parent's read end and the write end destined for the child.
pub(crate) fn output_pipe() -> io::Result<(File, OwnedFd)> {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    let (r, w) = nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC).map_err(io::Error::from)?;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    let (r, w) = nix::unistd::pipe().map_err(io::Error::from)?;
    Ok((File::from(r), w))
}
