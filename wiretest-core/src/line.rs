//! A single script line plus its origin, for error reporting (spec §3 "Line").

use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    pub file: Arc<str>,
    pub line: usize,
}

impl Origin {
    pub fn new(file: impl Into<Arc<str>>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A script line, stored verbatim (whitespace-significant after the first
/// token) with the origin it was read from. Comment and blank lines never
/// make it into a `Line` — they're dropped at assembly time.
#[derive(Debug, Clone)]
pub struct Line {
    pub origin: Origin,
    pub text: String,
}

impl Line {
    pub fn new(origin: Origin, text: impl Into<String>) -> Self {
        Self {
            origin,
            text: text.into(),
        }
    }

    /// The first whitespace-delimited token, i.e. the command name.
    pub fn command(&self) -> &str {
        self.text.split_whitespace().next().unwrap_or("")
    }

    /// Everything after the first token, with leading whitespace trimmed.
    pub fn rest(&self) -> &str {
        let cmd = self.command();
        self.text[cmd.len()..].trim_start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_and_rest_split_on_first_token() {
        let line = Line::new(Origin::new("a.htt", 3), "_REQ host $PORT");
        assert_eq!(line.command(), "_REQ");
        assert_eq!(line.rest(), "host $PORT");
    }

    #[test]
    fn origin_display() {
        let origin = Origin::new("a.htt", 42);
        assert_eq!(origin.to_string(), "a.htt:42");
    }
}
