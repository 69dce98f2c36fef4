//! Reading sanitizer stack traces into a crash location and a path.
//!
//! Frames look like
//! `#1 0x51b1a4 in LLVMFuzzerTestOneInput /src/fuzz_target.cc:10:3`.
//! Frames from the sanitizer runtime are skipped, the first remaining frame is
//! the crash site, and the frames below it (up to the fuzzer's entry point)
//! become the path in call order.

use crate::boundary::is_error_start;
use crate::linestream::LineStream;
use crate::location::{Location, PathEvent};
use crate::parser::LogParseError;

/// Path fragment identifying frames inside the sanitizer runtime.
pub const INSTRUMENTATION_PATH: &str = "compiler-rt/lib/";
/// Frame that marks the fuzzer calling into the harness; ends a path.
pub const HARNESS_ENTRY: &str = "Fuzzer::ExecuteCallback";
/// Frame of the watchdog signal handler in timeout reports.
pub const ALARM_CALLBACK: &str = "Fuzzer::StaticAlarmCallback";

const BUILD_ID_PREFIX: &str = "(BuildId:";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackTrace {
    pub location: Location,
    pub path: Vec<PathEvent>,
}

impl StackTrace {
    /// The frame the crash happened in; the last event of the path.
    pub fn crash_site(&self) -> Option<&PathEvent> {
        self.path.last()
    }
}

/// Splits a frame into its function name and location token.
fn split_frame(line: &str) -> (&str, &str) {
    let line = match line.find(BUILD_ID_PREFIX) {
        Some(idx) if line.trim_end().ends_with(')') => &line[..idx],
        _ => line,
    };
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let function = tokens
        .get(3)
        .map(|token| token.split('(').next().unwrap_or_default())
        .unwrap_or_default();
    let location = tokens.last().copied().unwrap_or_default();
    (function, location)
}

fn is_instrumentation(line: &str) -> bool {
    let (_, location) = split_frame(line);
    location.contains(INSTRUMENTATION_PATH)
}

fn path_event(line: &str) -> Result<PathEvent, LogParseError> {
    let (function, location) = split_frame(line);
    Ok(PathEvent::event(function, Location::parse(location)?))
}

/// Moves `stream` to the first frame (`#0`) of the next stack trace.
///
/// Returns `Ok(false)` if the stream ends or the next report instance begins
/// before a trace is found; in the latter case the marker is put back.
pub fn find_stack_trace(stream: &mut LineStream<'_>) -> Result<bool, LogParseError> {
    while let Some(line) = stream.read_line() {
        if is_error_start(&line) {
            stream.putback_line(1)?;
            return Ok(false);
        }
        if line.trim_start().starts_with("#0") {
            stream.putback_line(1)?;
            return Ok(true);
        }
    }
    Ok(false)
}

/// Parses the trace starting at the current line of `stream`.
pub fn parse_stack_trace(stream: &mut LineStream<'_>) -> Result<StackTrace, LogParseError> {
    let mut stack_top = stream.read_line();
    while stack_top.as_deref().is_some_and(is_instrumentation) {
        stack_top = stream.read_line();
    }

    let stack_top = match stack_top {
        Some(line) if !line.trim().is_empty() => line,
        _ => return Ok(StackTrace::default()),
    };

    let (_, token) = split_frame(&stack_top);
    let location = Location::parse(token)?;

    let mut path = Vec::new();
    while let Some(line) = stream.read_line() {
        if is_error_start(&line) {
            stream.putback_line(1)?;
            break;
        }
        if line.contains(HARNESS_ENTRY) || line.trim().is_empty() {
            break;
        }
        path.push(path_event(&line)?);
    }
    path.reverse();
    path.push(path_event(&stack_top)?);

    Ok(StackTrace { location, path })
}

/// Parses a timeout trace, skipping the watchdog handler frames.
///
/// Everything up to the alarm callback frame, and the signal trampoline frame
/// right after it, belongs to the fuzzer runtime. Without an alarm callback
/// frame this behaves like [`parse_stack_trace`].
pub fn parse_alarm_stack_trace(stream: &mut LineStream<'_>) -> Result<StackTrace, LogParseError> {
    let start = stream.tell();
    while let Some(line) = stream.read_line() {
        if line.contains(ALARM_CALLBACK) {
            stream.read_line();
            return parse_stack_trace(stream);
        }
        if line.trim().is_empty() || is_error_start(&line) {
            break;
        }
    }
    stream.seek(&start);
    parse_stack_trace(stream)
}

/// Finds and parses the next stack trace, or returns an empty trace.
pub fn next_stack_trace(stream: &mut LineStream<'_>) -> Result<StackTrace, LogParseError> {
    if find_stack_trace(stream)? {
        parse_stack_trace(stream)
    } else {
        Ok(StackTrace::default())
    }
}
