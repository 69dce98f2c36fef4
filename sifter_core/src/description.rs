//! Human-readable descriptions for sanitizer findings.
//!
//! Most bug types share one layout; a few carry extra detail in the header
//! or in a second stack trace and get a dedicated builder. Every description
//! ends with the input that reproduces the crash.

use crate::boundary::is_error_start;
use crate::linestream::LineStream;
use crate::parser::LogParseError;
use crate::stacktrace::{StackTrace, next_stack_trace};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// libFuzzer prints the reproducer right after the line containing this.
pub const BASE_UNIT_MARKER: &str = "base unit:";
/// libFuzzer names the saved reproducer on this line; its last `-` separated
/// segment is the issue hash.
pub const TEST_UNIT_MARKER: &str = "Test unit written to";

/// Extracts the issue hash from a `Test unit written to` line.
pub fn issue_hash_in(line: &str) -> Option<String> {
    if !line.contains(TEST_UNIT_MARKER) {
        return None;
    }
    line.rsplit('-').next().map(|hash| hash.trim().to_string())
}

static ALLOC_DEALLOC_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((.+) vs (.+)\)").expect("valid regex"));
static NEGATIVE_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(size=([-0-9]+)\)").expect("valid regex"));

/// What a strategy knows about a finding once its header and main trace are read.
#[derive(Debug, Clone)]
pub(crate) struct BugInfo {
    pub bug_type: String,
    /// Header text following the tool name.
    pub header_info: String,
    pub trace: StackTrace,
}

/// Input that triggered the crash, as printed by libFuzzer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrashInput {
    pub hex: String,
    pub ascii: String,
}

impl fmt::Display for CrashInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "on input:\nHex: {}\nASCII: {}\n", self.hex, self.ascii)
    }
}

/// Reads the reproducer following the next `base unit:` line.
///
/// If the report instance ends (or the stream does) before the marker, the
/// result is empty and `stream` is left where it was.
pub fn read_crash_input(stream: &mut LineStream<'_>) -> CrashInput {
    let start = stream.tell();
    loop {
        match stream.read_line() {
            Some(line) if is_error_start(&line) => break,
            Some(line) if line.contains(BASE_UNIT_MARKER) => {
                let hex = stream.read_line().unwrap_or_default();
                let ascii = stream.read_line().unwrap_or_default();
                return CrashInput {
                    hex: hex.trim().to_string(),
                    ascii: ascii.trim().to_string(),
                };
            }
            Some(_) => {}
            None => break,
        }
    }
    stream.seek(&start);
    CrashInput::default()
}

/// Joins a summary and the reproducer into the final description.
pub(crate) fn with_crash_input(mut summary: String, input: &CrashInput) -> String {
    if !summary.ends_with('\n') {
        summary.push('\n');
    }
    summary.push_str(&input.to_string());
    summary
}

type DescriptionBuilder = fn(&BugInfo, &mut LineStream<'_>) -> Result<String, LogParseError>;

const DESCRIPTIONS: &[(&str, DescriptionBuilder)] = &[
    ("double-free", double_free),
    ("alloc-dealloc-mismatch", alloc_dealloc_mismatch),
    ("negative-size-param", negative_size_param),
];

fn builder_for(bug_type: &str) -> DescriptionBuilder {
    DESCRIPTIONS
        .iter()
        .find(|(name, _)| *name == bug_type)
        .map(|(_, builder)| *builder)
        .unwrap_or(default_description)
}

/// Builds the full description for `info`, reading any further detail and
/// the crash input from `stream`.
pub(crate) fn describe(
    info: &BugInfo,
    stream: &mut LineStream<'_>,
) -> Result<String, LogParseError> {
    let summary = builder_for(&info.bug_type)(info, stream)?;
    let input = read_crash_input(stream);
    Ok(with_crash_input(summary, &input))
}

/// `<type>: <file> in <function>` for the crash site, or just `<type>`.
pub(crate) fn summary_line(info: &BugInfo) -> String {
    match info.trace.crash_site() {
        Some(site) => format!("{}: {} in {}", info.bug_type, site.location.file, site.message),
        None => info.bug_type.clone(),
    }
}

fn default_description(
    info: &BugInfo,
    _stream: &mut LineStream<'_>,
) -> Result<String, LogParseError> {
    Ok(summary_line(info))
}

fn double_free(info: &BugInfo, stream: &mut LineStream<'_>) -> Result<String, LogParseError> {
    let first_free = next_stack_trace(stream)?.location;
    Ok(format!(
        "Freed allocated memory twice:\nHere: {}\nand here: {}\n",
        first_free, info.trace.location
    ))
}

fn alloc_dealloc_mismatch(
    info: &BugInfo,
    stream: &mut LineStream<'_>,
) -> Result<String, LogParseError> {
    let caps = ALLOC_DEALLOC_PAIR
        .captures(&info.header_info)
        .ok_or_else(|| missing_detail(info, "(<allocator> vs <deallocator>)"))?;
    let alloc_location = next_stack_trace(stream)?.location;
    Ok(format!(
        "{}: Used {} to allocate memory here:\n{}\nbut used {} to deallocate it here:\n{}\n",
        info.bug_type, &caps[1], alloc_location, &caps[2], info.trace.location
    ))
}

fn negative_size_param(
    info: &BugInfo,
    _stream: &mut LineStream<'_>,
) -> Result<String, LogParseError> {
    let caps = NEGATIVE_SIZE
        .captures(&info.header_info)
        .ok_or_else(|| missing_detail(info, "(size=<n>)"))?;
    Ok(format!(
        "Passed negative size parameter ({}) to function here:\n{}\n",
        &caps[1], info.trace.location
    ))
}

fn missing_detail(info: &BugInfo, expected: &str) -> LogParseError {
    LogParseError::MissingHeaderDetail {
        bug_type: info.bug_type.clone(),
        expected: expected.to_string(),
        header: info.header_info.clone(),
    }
}
