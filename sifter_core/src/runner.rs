use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How a fuzz target run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Ok,
    Timeout,
    /// The target exited unsuccessfully; it found something.
    Crash(String),
    /// The target could not be run or waited on.
    Other(String),
}

pub struct FuzzRunConfig {
    /// Arguments placed before the corpus directory, e.g. `-verbosity=1`.
    pub options: Vec<String>,
    pub corpus_dir: PathBuf,
    pub timeout: Duration,
    /// Directory the target is started in; the target's own directory if unset.
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug)]
pub struct RunOutput {
    pub status: RunStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

impl RunOutput {
    fn empty(status: RunStatus) -> Self {
        Self {
            status,
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: None,
            signal: None,
        }
    }
}

/// Renders libFuzzer flags as `-<key>=<value>`, in key order.
pub fn fuzzer_options(options: &BTreeMap<String, i64>) -> Vec<String> {
    options
        .iter()
        .map(|(key, value)| format!("-{key}={value}"))
        .collect()
}

/// Lists the executable regular files in `dir`, sorted by path.
pub fn discover_targets(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut targets = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let metadata = std::fs::metadata(&path)?;
        if metadata.is_file() && is_executable(&metadata) {
            targets.push(path);
        }
    }
    targets.sort();
    Ok(targets)
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buffer) {
                warn!("Failed to read target output: {e}");
            }
        }
        buffer
    })
}

fn collect(handle: JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.join().unwrap_or_default()
}

pub struct FuzzTargetRunner {
    config: FuzzRunConfig,
}

impl FuzzTargetRunner {
    pub fn new(config: FuzzRunConfig) -> Self {
        Self { config }
    }

    fn wait_with_timeout(&self, child: &mut Child) -> Result<ExitStatus, RunStatus> {
        let start_time = Instant::now();

        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    if start_time.elapsed() > self.config.timeout {
                        warn!("Target timed out, killing...");
                        if let Err(e) = child.kill() {
                            return Err(RunStatus::Other(format!(
                                "Failed to kill timed-out process: {e}",
                            )));
                        }
                        let _ = child.wait();
                        return Err(RunStatus::Timeout);
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    return Err(RunStatus::Other(format!("Error waiting for child: {e}")));
                }
            }
        }
    }

    /// Runs `target` once over the corpus directory and captures its output.
    pub fn run(&self, target: &Path) -> RunOutput {
        let working_dir = self
            .config
            .working_dir
            .clone()
            .or_else(|| target.parent().map(Path::to_path_buf))
            .unwrap_or_default();

        let program = std::fs::canonicalize(target).unwrap_or_else(|_| target.to_path_buf());
        let mut cmd = Command::new(&program);
        cmd.args(&self.config.options)
            .arg(&self.config.corpus_dir)
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!(fuzz_target = %target.display(), "starting fuzz target");

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return RunOutput::empty(RunStatus::Other(format!(
                    "Failed to spawn command '{}': {}",
                    target.display(),
                    e
                )));
            }
        };

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let waited = self.wait_with_timeout(&mut child);

        let mut output = RunOutput::empty(RunStatus::Ok);
        output.stdout = collect(stdout);
        output.stderr = collect(stderr);

        output.status = match waited {
            Ok(status) => {
                output.exit_code = status.code();
                #[cfg(unix)]
                {
                    use std::os::unix::process::ExitStatusExt;
                    output.signal = status.signal();
                }

                if status.success() {
                    RunStatus::Ok
                } else if let Some(code) = output.exit_code {
                    RunStatus::Crash(format!("Exited with code {code}"))
                } else if let Some(signal) = output.signal {
                    RunStatus::Crash(format!("Terminated by signal {signal}"))
                } else {
                    RunStatus::Crash("Exited abnormally".to_string())
                }
            }
            Err(status) => status,
        };
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_fuzzer_options;

    fn get_test_target_path(name: &str) -> PathBuf {
        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        manifest_dir.join("../test_targets").join(name)
    }

    fn runner(timeout: Duration) -> FuzzTargetRunner {
        FuzzTargetRunner::new(FuzzRunConfig {
            options: fuzzer_options(&default_fuzzer_options()),
            corpus_dir: PathBuf::from("CORPUS"),
            timeout,
            working_dir: None,
        })
    }

    #[test]
    fn renders_options_in_key_order() {
        assert_eq!(
            fuzzer_options(&default_fuzzer_options()),
            vec!["-error_exitcode=77", "-timeout_exitcode=78", "-verbosity=1"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn discovers_only_executable_files() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        for name in ["b_target", "a_target", "notes.txt"] {
            std::fs::write(dir.path().join(name), "#!/bin/sh\n").unwrap();
        }
        for name in ["b_target", "a_target"] {
            let path = dir.path().join(name);
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        std::fs::create_dir(dir.path().join("CORPUS")).unwrap();

        let targets = discover_targets(dir.path()).unwrap();
        assert_eq!(
            targets,
            vec![dir.path().join("a_target"), dir.path().join("b_target")]
        );
    }

    #[cfg(unix)]
    #[test]
    fn successful_run_is_ok() {
        let target = get_test_target_path("test_target_ok.sh");
        assert!(target.exists(), "Test target missing: {target:?}");

        let output = runner(Duration::from_secs(5)).run(&target);
        assert_eq!(output.status, RunStatus::Ok);
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(
            String::from_utf8_lossy(&output.stdout).trim(),
            "-error_exitcode=77 -timeout_exitcode=78 -verbosity=1 CORPUS"
        );
    }

    #[cfg(unix)]
    #[test]
    fn sanitizer_exit_code_is_a_crash_with_captured_stderr() {
        let target = get_test_target_path("test_target_asan.sh");
        assert!(target.exists(), "Test target missing: {target:?}");

        let output = runner(Duration::from_secs(5)).run(&target);
        assert_eq!(output.status, RunStatus::Crash("Exited with code 77".to_string()));
        assert!(
            String::from_utf8_lossy(&output.stderr).contains("ERROR: AddressSanitizer"),
            "stderr should carry the sanitizer report"
        );
    }

    #[cfg(unix)]
    #[test]
    fn hanging_target_times_out() {
        let target = get_test_target_path("test_target_timeout.sh");
        assert!(target.exists(), "Test target missing: {target:?}");

        let output = runner(Duration::from_millis(100)).run(&target);
        assert_eq!(output.status, RunStatus::Timeout);
    }

    #[test]
    fn missing_target_cannot_be_spawned() {
        let output = runner(Duration::from_secs(1))
            .run(Path::new("./this_target_does_not_exist_ever_12345"));
        match output.status {
            RunStatus::Other(msg) => assert!(msg.contains("Failed to spawn command")),
            other => panic!("Expected Other status for missing target, got {other:?}"),
        }
    }
}
