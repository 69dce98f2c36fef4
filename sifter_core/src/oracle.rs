use crate::config::ParserSettings;
use crate::interpreter::{InterpretError, LogInterpreter};
use crate::runner::{RunOutput, RunStatus};
use crate::schema::VulnerabilitySchema;
use crate::vulnerability::Vulnerability;
use tracing::{info, warn};

/// An `Oracle` examines the outcome of a fuzz target run and decides which
/// vulnerabilities it reveals.
///
/// Oracles sit between the runner, which only knows how a process ended, and
/// the report, which only holds schema-conformant records.
pub trait Oracle: Send + Sync {
    /// Examines a finished run.
    ///
    /// # Arguments
    /// * `run`: The status and captured output of one fuzz target run.
    ///
    /// # Returns
    /// The vulnerabilities found in the run, possibly none. An `Err` means the
    /// run's output could not be turned into a valid batch at all.
    fn examine(&self, run: &RunOutput) -> Result<Vec<Vulnerability>, InterpretError>;
}

/// Interprets the sanitizer report on stderr of every failed run.
#[derive(Debug, Clone, Default)]
pub struct SanitizerOracle {
    settings: ParserSettings,
    schema: VulnerabilitySchema,
}

impl SanitizerOracle {
    pub fn new(settings: ParserSettings, schema: VulnerabilitySchema) -> Self {
        Self { settings, schema }
    }
}

impl Oracle for SanitizerOracle {
    /// Successful runs yield nothing. Timeouts enforced by the runner are
    /// interpreted too, since libFuzzer may already have printed its report.
    fn examine(&self, run: &RunOutput) -> Result<Vec<Vulnerability>, InterpretError> {
        match &run.status {
            RunStatus::Ok => Ok(Vec::new()),
            RunStatus::Other(reason) => {
                warn!("Fuzz target did not run: {reason}");
                Ok(Vec::new())
            }
            RunStatus::Crash(_) | RunStatus::Timeout => {
                let interpreter = LogInterpreter::new(self.settings.clone(), &self.schema);
                let log = interpreter.interpret(&run.stderr)?;
                if !log.diagnostics.is_empty() {
                    info!(
                        skipped = log.diagnostics.len(),
                        "some report instances were not interpreted"
                    );
                }
                Ok(log.vulnerabilities)
            }
        }
    }
}
