use crate::linestream::{LineEncoding, MIN_PUTBACK_CAPACITY};
use crate::schema::VulnerabilitySchema;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ParserSettings {
    #[serde(default = "default_putback_capacity")]
    pub putback_capacity: usize,
    #[serde(default)]
    pub encoding: LineEncoding,
}

fn default_putback_capacity() -> usize {
    MIN_PUTBACK_CAPACITY
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            putback_capacity: default_putback_capacity(),
            encoding: LineEncoding::default(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FuzzerSettings {
    #[serde(default = "default_fuzzing_dir")]
    pub fuzzing_dir: PathBuf,
    #[serde(default = "default_corpus_dir")]
    pub corpus_dir: PathBuf,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// libFuzzer flags, passed as `-<key>=<value>`.
    #[serde(default = "default_fuzzer_options")]
    pub options: BTreeMap<String, i64>,
}

pub fn default_fuzzing_dir() -> PathBuf {
    PathBuf::from("ci-fuzzing-targets")
}

fn default_corpus_dir() -> PathBuf {
    PathBuf::from("CORPUS")
}

fn default_timeout_ms() -> u64 {
    600_000
}

pub fn default_fuzzer_options() -> BTreeMap<String, i64> {
    BTreeMap::from([
        ("verbosity".to_string(), 1),
        ("error_exitcode".to_string(), 77),
        ("timeout_exitcode".to_string(), 78),
    ])
}

impl Default for FuzzerSettings {
    fn default() -> Self {
        Self {
            fuzzing_dir: default_fuzzing_dir(),
            corpus_dir: default_corpus_dir(),
            timeout_ms: default_timeout_ms(),
            options: default_fuzzer_options(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ReportSettings {
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,
}

pub fn default_output_file() -> PathBuf {
    PathBuf::from("ci-report.json")
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            output_file: default_output_file(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct SifterConfig {
    #[serde(default)]
    pub parser: ParserSettings,
    #[serde(default)]
    pub schema: VulnerabilitySchema,
    #[serde(default)]
    pub fuzzer: FuzzerSettings,
    #[serde(default)]
    pub report: ReportSettings,
}

impl SifterConfig {
    pub fn load_from_file(path: &PathBuf) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: SifterConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }
}
