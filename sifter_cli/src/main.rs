use sifter_core::config::{ParserSettings, SifterConfig};
use sifter_core::interpreter::LogInterpreter;
use sifter_core::oracle::{Oracle, SanitizerOracle};
use sifter_core::runner::{FuzzRunConfig, FuzzTargetRunner, discover_targets, fuzzer_options};
use sifter_core::schema::VulnerabilitySchema;
use sifter_core::vulnerability::Vulnerability;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// Report file; overrides `report.output-file`.
    #[clap(short, long)]
    output: Option<PathBuf>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every fuzz target in the fuzzing directory and report what they find.
    Run {
        /// Project root containing the fuzzing directory.
        #[clap(short, long, default_value = ".")]
        project_path: PathBuf,
        /// Run only these targets instead of discovering them.
        targets: Vec<PathBuf>,
    },
    /// Interpret captured sanitizer logs.
    Parse {
        #[clap(required = true)]
        logs: Vec<PathBuf>,
    },
}

fn load_config(config_file: Option<PathBuf>) -> Result<SifterConfig, anyhow::Error> {
    match config_file {
        Some(config_path) => {
            info!("Loading configuration from specified path: {config_path:?}");
            SifterConfig::load_from_file(&config_path)
        }
        None => {
            let default_config_path = PathBuf::from("sifter.toml");
            if default_config_path.exists() {
                info!("No config file specified via CLI, loading default: {default_config_path:?}");
                SifterConfig::load_from_file(&default_config_path)
            } else {
                info!(
                    "No config file specified and default 'sifter.toml' not found, using built-in defaults."
                );
                Ok(SifterConfig::default())
            }
        }
    }
}

fn parse_logs(
    logs: &[PathBuf],
    settings: &ParserSettings,
    schema: &VulnerabilitySchema,
) -> Result<Vec<Vulnerability>, anyhow::Error> {
    let interpreter = LogInterpreter::new(settings.clone(), schema);
    let mut vulnerabilities = Vec::new();

    for path in logs {
        let raw = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read log file {:?}: {}", path, e))?;
        let log = interpreter
            .interpret(&raw)
            .map_err(|e| anyhow::anyhow!("Failed to interpret log file {:?}: {}", path, e))?;
        for diagnostic in &log.diagnostics {
            warn!(log = ?path, header = %diagnostic.header, "skipped report instance: {}", diagnostic.error);
        }
        vulnerabilities.extend(log.vulnerabilities);
    }
    Ok(vulnerabilities)
}

fn run_targets(
    project_path: &Path,
    targets: Vec<PathBuf>,
    config: &SifterConfig,
) -> Result<Vec<Vulnerability>, anyhow::Error> {
    let fuzzing_dir = project_path.join(&config.fuzzer.fuzzing_dir);
    let targets = if targets.is_empty() {
        discover_targets(&fuzzing_dir).map_err(|e| {
            anyhow::anyhow!("Failed to list fuzz targets in {:?}: {}", fuzzing_dir, e)
        })?
    } else {
        targets
    };
    if targets.is_empty() {
        warn!("No fuzz targets found in {fuzzing_dir:?}");
    }

    let runner = FuzzTargetRunner::new(FuzzRunConfig {
        options: fuzzer_options(&config.fuzzer.options),
        corpus_dir: config.fuzzer.corpus_dir.clone(),
        timeout: Duration::from_millis(config.fuzzer.timeout_ms),
        working_dir: Some(fuzzing_dir),
    });
    let oracle = SanitizerOracle::new(config.parser.clone(), config.schema.clone());

    let mut vulnerabilities = Vec::new();
    for target in &targets {
        let start_time = Instant::now();
        let output = runner.run(target);
        info!(
            fuzz_target = %target.display(),
            status = ?output.status,
            "fuzz target finished in {:.2?}",
            start_time.elapsed()
        );

        match oracle.examine(&output) {
            Ok(found) => {
                info!(fuzz_target = %target.display(), found = found.len(), "examined run");
                vulnerabilities.extend(found);
            }
            Err(e) => error!(fuzz_target = %target.display(), "Failed to interpret run: {e}"),
        }
    }
    Ok(vulnerabilities)
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config_file)?;

    let vulnerabilities = match cli.command {
        Commands::Run {
            project_path,
            targets,
        } => run_targets(&project_path, targets, &config)?,
        Commands::Parse { logs } => parse_logs(&logs, &config.parser, &config.schema)?,
    };

    let report = serde_json::to_string_pretty(&vulnerabilities)?;
    println!("{report}");

    let output_file = cli.output.unwrap_or(config.report.output_file);
    std::fs::write(&output_file, &report)
        .map_err(|e| anyhow::anyhow!("Failed to write report to {:?}: {}", output_file, e))?;
    info!(
        "Wrote {} vulnerabilities to {:?}",
        vulnerabilities.len(),
        output_file
    );

    Ok(())
}
