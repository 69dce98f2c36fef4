use super::LogParseError;
use crate::boundary::is_error_start;
use crate::linestream::LineStream;
use crate::location::{Location, PathEvent};
use crate::stacktrace::parse_stack_trace;
use crate::vulnerability::{Category, Vulnerability};
use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

pub const LEAK_TYPE: &str = "memory-leak";

static LEAK_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"of ([0-9]+) byte\(s\) in ([0-9]+) ").expect("valid regex"));

/// Leaks reported at the same file, merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakSite {
    pub bytes: u64,
    pub objects: u64,
    pub location: Location,
    pub path: Vec<PathEvent>,
}

impl LeakSite {
    pub fn description(&self) -> String {
        format!("{} byte(s) leaked in {} object(s)", self.bytes, self.objects)
    }
}

fn leak_counts(line: &str) -> Result<(u64, u64), LogParseError> {
    let malformed = || LogParseError::MalformedLeakHeader(line.to_string());
    let caps = LEAK_HEADER.captures(line).ok_or_else(malformed)?;
    let bytes = caps[1].parse().map_err(|_| malformed())?;
    let objects = caps[2].parse().map_err(|_| malformed())?;
    Ok((bytes, objects))
}

/// Collects leaks up to the `SUMMARY` line, keyed by the file they were
/// allocated in. Insertion order is preserved.
pub fn gather_leaks(
    stream: &mut LineStream<'_>,
) -> Result<IndexMap<String, LeakSite>, LogParseError> {
    let mut leaks: IndexMap<String, LeakSite> = IndexMap::new();
    while let Some(line) = stream.read_line() {
        if line.contains("SUMMARY") || is_error_start(&line) {
            stream.putback_line(1)?;
            break;
        }
        if !(line.starts_with("Direct") || line.starts_with("Indirect")) {
            continue;
        }

        let (bytes, objects) = leak_counts(&line)?;
        let trace = parse_stack_trace(stream)?;
        match leaks.get_mut(&trace.location.file) {
            Some(site) => {
                site.bytes += bytes;
                site.objects += objects;
            }
            None => {
                leaks.insert(
                    trace.location.file.clone(),
                    LeakSite {
                        bytes,
                        objects,
                        location: trace.location,
                        path: trace.path,
                    },
                );
            }
        }
    }
    Ok(leaks)
}

/// Produces one vulnerability per leaking file of a LeakSanitizer report.
pub fn vulnerabilities(stream: &mut LineStream<'_>) -> Result<Vec<Vulnerability>, LogParseError> {
    let leaks = gather_leaks(stream)?;
    debug!(sites = leaks.len(), "parsed LeakSanitizer report");

    Ok(leaks
        .into_values()
        .map(|site| {
            let description = site.description();
            Vulnerability::new(
                Category::MemoryError,
                LEAK_TYPE,
                description,
                site.location,
                site.path,
            )
        })
        .collect())
}
