use crate::parser::LogParseError;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

static COLON_LINE_COL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+):(\d+):(\d+)$").expect("valid regex"));
static COLON_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+):(\d+)$").expect("valid regex"));
static PAREN_LINE_COL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)\((\d+),(\d+)\)$").expect("valid regex"));
static PAREN_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)\((\d+)\)$").expect("valid regex"));
static MODULE_OFFSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\((.+)\+0x([0-9a-fA-F]+)\)$").expect("valid regex"));

/// A position in a source file, or in a module when no debug info exists.
///
/// `line` is 0 when only a module offset is known; `col` then holds the offset.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: String,
    pub line: u64,
    pub col: u64,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u64, col: u64) -> Self {
        Self {
            file: file.into(),
            line,
            col,
        }
    }

    /// True for the placeholder used when a report carries no stack trace.
    pub fn is_empty(&self) -> bool {
        self.file.is_empty()
    }

    /// Parses a location token as printed at the end of a stack frame.
    ///
    /// Accepted forms, tried in order:
    /// `path:line:col`, `path:line`, `path(line,col)`, `path(line)` and
    /// `(module+0xOFFSET)`. A missing column defaults to 0.
    pub fn parse(token: &str) -> Result<Self, LogParseError> {
        for (grammar, has_col) in [
            (&*COLON_LINE_COL, true),
            (&*COLON_LINE, false),
            (&*PAREN_LINE_COL, true),
            (&*PAREN_LINE, false),
        ] {
            if let Some(caps) = grammar.captures(token) {
                let line = parse_decimal(&caps[2], token)?;
                let col = if has_col {
                    parse_decimal(&caps[3], token)?
                } else {
                    0
                };
                return Ok(Location::new(&caps[1], line, col));
            }
        }

        if let Some(caps) = MODULE_OFFSET.captures(token) {
            let offset = u64::from_str_radix(&caps[2], 16)
                .map_err(|_| LogParseError::UnparsableLocation(token.to_string()))?;
            return Ok(Location::new(&caps[1], 0, offset));
        }

        Err(LogParseError::UnparsableLocation(token.to_string()))
    }
}

fn parse_decimal(digits: &str, token: &str) -> Result<u64, LogParseError> {
    digits
        .parse()
        .map_err(|_| LogParseError::UnparsableLocation(token.to_string()))
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    #[default]
    Event,
    Control,
}

/// One step on the way to a crash, typically a stack frame.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PathEvent {
    pub kind: EventKind,
    pub message: String,
    pub location: Location,
}

impl PathEvent {
    pub fn event(message: impl Into<String>, location: Location) -> Self {
        Self {
            kind: EventKind::Event,
            message: message.into(),
            location,
        }
    }
}
