//! Per-tool strategies that turn one report instance into vulnerabilities.
//!
//! A report instance starts with a header such as
//! `==21045==ERROR: AddressSanitizer: heap-buffer-overflow on address ...`.
//! The second `:`-separated field names the tool, which selects the strategy.

pub mod asan;
pub mod lsan;
pub mod timeout;

use crate::linestream::{LineStream, StreamError};
use crate::vulnerability::Vulnerability;
use thiserror::Error;

/// Errors that abort the interpretation of a single report instance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogParseError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("invalid source location: {0}")]
    UnparsableLocation(String),

    #[error("unknown AddressSanitizer error header: {0}")]
    UnknownAsanHeader(String),

    #[error("unsupported tool '{0}'")]
    UnsupportedTool(String),

    /// libFuzzer reports without a sanitizer or timeout wrapper (e.g. a
    /// deadly signal). These are not interpreted yet.
    #[error("libFuzzer report not supported yet: {0}")]
    UnimplementedToolCase(String),

    #[error("malformed error header: {0}")]
    MalformedHeader(String),

    #[error("malformed leak header: {0}")]
    MalformedLeakHeader(String),

    #[error("{bug_type} header lacks {expected}: {header}")]
    MissingHeaderDetail {
        bug_type: String,
        expected: String,
        header: String,
    },

    /// The instance has no frame outside the sanitizer runtime, so its record
    /// would carry no source location.
    #[error("{0} report has no stack trace with a source location")]
    MissingStackTrace(String),
}

impl LogParseError {
    /// Whether the error must stop the whole log rather than one instance.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LogParseError::UnimplementedToolCase(_))
    }
}

/// Splits a header into the tool name and the text after it.
pub fn tool_name(header: &str) -> Result<(&str, &str), LogParseError> {
    let mut fields = header.splitn(3, ':');
    fields.next();
    let tool = fields
        .next()
        .map(str::trim)
        .filter(|tool| !tool.is_empty())
        .ok_or_else(|| LogParseError::MalformedHeader(header.to_string()))?;
    Ok((tool, fields.next().unwrap_or_default()))
}

/// One strategy per family of tools whose reports we understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserStrategy {
    AddressSanitizer,
    LeakSanitizer,
    Timeout,
}

const STRATEGY_TABLE: &[(&str, ParserStrategy)] = &[
    ("AddressSanitizer", ParserStrategy::AddressSanitizer),
    ("LeakSanitizer", ParserStrategy::LeakSanitizer),
];

impl ParserStrategy {
    /// Selects the strategy for a report instance from its header line.
    pub fn for_header(header: &str) -> Result<Self, LogParseError> {
        let (tool, info) = tool_name(header)?;
        if tool == "libFuzzer" {
            return if info.contains("timeout") {
                Ok(ParserStrategy::Timeout)
            } else {
                Err(LogParseError::UnimplementedToolCase(header.trim().to_string()))
            };
        }

        STRATEGY_TABLE
            .iter()
            .find(|(name, _)| *name == tool)
            .map(|(_, strategy)| *strategy)
            .ok_or_else(|| LogParseError::UnsupportedTool(tool.to_string()))
    }

    /// Interprets the instance whose `header` was just read from `stream`.
    pub fn vulnerabilities(
        &self,
        header: &str,
        stream: &mut LineStream<'_>,
    ) -> Result<Vec<Vulnerability>, LogParseError> {
        match self {
            ParserStrategy::AddressSanitizer => asan::vulnerabilities(header, stream),
            ParserStrategy::LeakSanitizer => lsan::vulnerabilities(stream),
            ParserStrategy::Timeout => timeout::vulnerabilities(stream),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_tool_name_from_header() {
        let (tool, info) =
            tool_name("==21045==ERROR: AddressSanitizer: heap-buffer-overflow on address 0x1")
                .unwrap();
        assert_eq!(tool, "AddressSanitizer");
        assert_eq!(info, " heap-buffer-overflow on address 0x1");
    }

    #[test]
    fn header_without_tool_is_malformed() {
        assert!(matches!(
            tool_name("==1==ERROR"),
            Err(LogParseError::MalformedHeader(_))
        ));
    }

    #[test]
    fn dispatches_by_tool_name() {
        assert_eq!(
            ParserStrategy::for_header("==1==ERROR: AddressSanitizer: heap-use-after-free")
                .unwrap(),
            ParserStrategy::AddressSanitizer
        );
        assert_eq!(
            ParserStrategy::for_header("==1==ERROR: LeakSanitizer: detected memory leaks").unwrap(),
            ParserStrategy::LeakSanitizer
        );
        assert_eq!(
            ParserStrategy::for_header("==1== ERROR: libFuzzer: timeout after 1 seconds").unwrap(),
            ParserStrategy::Timeout
        );
    }

    #[test]
    fn libfuzzer_deadly_signal_is_fatal() {
        let err = ParserStrategy::for_header("==1== ERROR: libFuzzer: deadly signal").unwrap_err();
        assert!(matches!(err, LogParseError::UnimplementedToolCase(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn unknown_tool_is_not_fatal() {
        let err =
            ParserStrategy::for_header("==1==ERROR: MemorySanitizer: use-of-uninitialized-value")
                .unwrap_err();
        assert_eq!(err, LogParseError::UnsupportedTool("MemorySanitizer".to_string()));
        assert!(!err.is_fatal());
    }
}
