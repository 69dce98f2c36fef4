use crate::boundary::{find_next_boundary, is_error_start};
use crate::config::ParserSettings;
use crate::description::issue_hash_in;
use crate::linestream::{LineStream, StreamError};
use crate::parser::{LogParseError, ParserStrategy};
use crate::schema::{SchemaError, SchemaValidator};
use crate::vulnerability::Vulnerability;
use thiserror::Error;
use tracing::{debug, error};

/// Errors that stop the interpretation of a whole log.
#[derive(Error, Debug)]
pub enum InterpretError {
    #[error("unsupported report, stopping: {0}")]
    Unimplemented(LogParseError),
    #[error("vulnerability batch violates the schema: {0}")]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// A report instance that could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub header: String,
    pub error: LogParseError,
}

/// Result of interpreting one log.
#[derive(Debug, Clone, Default)]
pub struct InterpretedLog {
    /// Validated records, in log order.
    pub vulnerabilities: Vec<Vulnerability>,
    /// Instances that were skipped, in log order.
    pub diagnostics: Vec<Diagnostic>,
}

/// Reads the issue hash of the current report instance.
///
/// Stops at the next instance (putting its marker back) and returns an empty
/// string if the instance names no test unit.
pub fn read_issue_hash(stream: &mut LineStream<'_>) -> Result<String, StreamError> {
    while let Some(line) = stream.read_line() {
        if is_error_start(&line) {
            stream.putback_line(1)?;
            break;
        }
        if let Some(issue_hash) = issue_hash_in(&line) {
            return Ok(issue_hash);
        }
    }
    Ok(String::new())
}

/// Interprets the report instance whose header was just read.
///
/// Every record must point at a source location; an instance whose trace has
/// only sanitizer runtime frames (or none) fails with
/// [`LogParseError::MissingStackTrace`]. Records that already carry an issue
/// hash keep it.
pub fn parse_instance(
    header: &str,
    stream: &mut LineStream<'_>,
) -> Result<Vec<Vulnerability>, LogParseError> {
    let strategy = ParserStrategy::for_header(header)?;
    let vulnerabilities = strategy.vulnerabilities(header, stream)?;
    if let Some(unlocated) = vulnerabilities.iter().find(|v| v.location.is_empty()) {
        return Err(LogParseError::MissingStackTrace(unlocated.bug_type.clone()));
    }

    let issue_hash = read_issue_hash(stream)?;
    Ok(vulnerabilities
        .into_iter()
        .map(|v| {
            if v.issue_hash.is_empty() {
                v.with_issue_hash(issue_hash.clone())
            } else {
                v
            }
        })
        .collect())
}

/// Turns raw sanitizer logs into validated vulnerability batches.
///
/// Each call to [`LogInterpreter::interpret`] owns its own stream, so one
/// interpreter can serve any number of logs.
pub struct LogInterpreter<'s, V: SchemaValidator + ?Sized> {
    settings: ParserSettings,
    validator: &'s V,
}

impl<'s, V: SchemaValidator + ?Sized> LogInterpreter<'s, V> {
    pub fn new(settings: ParserSettings, validator: &'s V) -> Self {
        Self {
            settings,
            validator,
        }
    }

    /// Interprets every report instance in `raw`.
    ///
    /// Instances that fail to parse are recorded as diagnostics and skipped.
    /// Unsupported libFuzzer reports and schema violations fail the whole log.
    pub fn interpret(&self, raw: &[u8]) -> Result<InterpretedLog, InterpretError> {
        let mut stream =
            LineStream::with_options(raw, self.settings.putback_capacity, self.settings.encoding);
        let mut log = InterpretedLog::default();

        while find_next_boundary(&mut stream)? {
            let start = stream.tell();
            let Some(header) = stream.read_line() else {
                break;
            };
            debug!(%header, "found report instance");

            match parse_instance(&header, &mut stream) {
                Ok(vulnerabilities) => log.vulnerabilities.extend(vulnerabilities),
                Err(e) if e.is_fatal() => return Err(InterpretError::Unimplemented(e)),
                Err(e) => {
                    error!(
                        %header,
                        error = %e,
                        "Apparently the log file could not be parsed appropriately"
                    );
                    log.diagnostics.push(Diagnostic {
                        header: header.clone(),
                        error: e,
                    });
                    // Resume right after the failed header.
                    stream.seek(&start);
                    stream.read_line();
                }
            }
        }

        self.validator.validate(&log.vulnerabilities)?;
        Ok(log)
    }
}
