use super::LogParseError;
use crate::description::{CrashInput, issue_hash_in, read_crash_input};
use crate::linestream::LineStream;
use crate::stacktrace::{StackTrace, find_stack_trace, parse_alarm_stack_trace};
use crate::vulnerability::{Category, Vulnerability};

pub const TIMEOUT_TYPE: &str = "timeout";

/// Lines to rewind from just after the header to reach the reproducer.
///
/// libFuzzer prints the `base unit:` block and the artifact path before the
/// `ERROR: libFuzzer: timeout` line.
pub const CRASH_INPUT_OFFSET: usize = 6;

/// What libFuzzer printed between the reproducer and the timeout header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preamble {
    pub input: CrashInput,
    /// Hash of the saved `timeout-<hash>` test unit, empty if not printed.
    pub issue_hash: String,
}

/// Reads the reproducer and test unit printed before the header, then returns
/// to the line after the header.
pub fn read_preamble(stream: &mut LineStream<'_>) -> Result<Preamble, LogParseError> {
    let after_header = stream.tell();
    stream.putback_line(CRASH_INPUT_OFFSET)?;
    let input = read_crash_input(stream);

    let mut issue_hash = String::new();
    while stream.tell().offset() < after_header.offset() {
        let Some(line) = stream.read_line() else {
            break;
        };
        if let Some(hash) = issue_hash_in(&line) {
            issue_hash = hash;
            break;
        }
    }

    stream.seek(&after_header);
    Ok(Preamble { input, issue_hash })
}

/// Produces the single vulnerability of a libFuzzer timeout report.
///
/// The description reads `timeout <file> in <fn> on input:` followed by the
/// reproducer, or just `timeout` when the trace has no user frame.
pub fn vulnerabilities(stream: &mut LineStream<'_>) -> Result<Vec<Vulnerability>, LogParseError> {
    let preamble = read_preamble(stream)?;
    let trace = if find_stack_trace(stream)? {
        parse_alarm_stack_trace(stream)?
    } else {
        StackTrace::default()
    };

    let description = match trace.crash_site() {
        Some(site) => format!(
            "{TIMEOUT_TYPE} {} in {} {}",
            site.location.file, site.message, preamble.input
        ),
        None => TIMEOUT_TYPE.to_string(),
    };

    let vulnerability = Vulnerability::new(
        Category::LogicError,
        TIMEOUT_TYPE,
        description,
        trace.location,
        trace.path,
    );
    Ok(vec![vulnerability.with_issue_hash(preamble.issue_hash)])
}
