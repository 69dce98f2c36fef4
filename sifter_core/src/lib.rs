pub mod boundary;
pub mod config;
pub mod description;
pub mod interpreter;
pub mod linestream;
pub mod location;
pub mod oracle;
pub mod parser;
pub mod runner;
pub mod schema;
pub mod stacktrace;
pub mod vulnerability;

pub use config::SifterConfig;
pub use description::CrashInput;
pub use interpreter::{Diagnostic, InterpretError, InterpretedLog, LogInterpreter};
pub use linestream::{LineEncoding, LineStream, StreamError, StreamPosition};
pub use location::{EventKind, Location, PathEvent};
pub use oracle::{Oracle, SanitizerOracle};
pub use parser::{LogParseError, ParserStrategy};
pub use runner::{FuzzRunConfig, FuzzTargetRunner, RunOutput, RunStatus};
pub use schema::{SchemaError, SchemaValidator, VulnerabilitySchema};
pub use stacktrace::StackTrace;
pub use vulnerability::{Category, Vulnerability};
