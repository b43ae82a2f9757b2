use std::io;

use super::shell_escape;

/// Builder for the single-line scripts handed to the userland shell (`sh -c`).
///
/// Invariants:
/// - Each command is assembled from discrete words; every word is shell-escaped.
/// - Commands must not contain `\n`, `\r` or `\0`.
/// - Commands are joined with ` && ` so the script stops at the first failing command.
#[derive(Debug, Default, Clone)]
pub struct ShellScript {
    parts: Vec<String>,
}

impl ShellScript {
    pub fn new() -> Self {
        Self { parts: Vec::new() }
    }

    /// Append one command built from its argument words.
    pub fn command<I, S>(&mut self, words: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cmd = words
            .into_iter()
            .map(|w| shell_escape(w.as_ref()))
            .collect::<Vec<_>>()
            .join(" ");
        self.parts.push(cmd);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn build(&self) -> io::Result<String> {
        for (i, p) in self.parts.iter().enumerate() {
            if p.contains('\n') || p.contains('\r') || p.contains('\0') {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("shell script fragment {i} contains a newline; use atomic fragments"),
                ));
            }
        }
        Ok(self.parts.join(" && "))
    }
}
