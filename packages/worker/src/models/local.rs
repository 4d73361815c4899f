//! Process-spawning execution engine for development deployments.
//!
//! Runs submissions with the host toolchains and no isolation beyond a
//! wall-clock watchdog. Memory is reported as 0 and
//! MEMORY_LIMIT_EXCEEDED is never produced here; a sandboxed engine
//! owns resource accounting.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::Language;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use super::executor::{
    CompileOutcome, EngineError, ExecutionEngine, Program, ResourceLimits, RunOutcome, RunStatus,
};

/// Grace added to the time limit before the watchdog kills the process,
/// covering interpreter startup.
const WALL_CLOCK_GRACE: Duration = Duration::from_secs(1);

pub struct LocalEngine;

impl LocalEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Source filename expected by each toolchain.
fn source_file_name(language: Language) -> &'static str {
    match language {
        Language::Cpp => "main.cpp",
        Language::Java => "Main.java",
        Language::Python => "main.py",
        Language::Javascript => "main.js",
    }
}

fn toolchain_missing(language: Language, e: std::io::Error) -> EngineError {
    if e.kind() == std::io::ErrorKind::NotFound {
        EngineError::ToolchainMissing(language, e.to_string())
    } else {
        EngineError::Io(e)
    }
}

#[async_trait]
impl ExecutionEngine for LocalEngine {
    async fn compile(
        &self,
        language: Language,
        source: &str,
    ) -> Result<CompileOutcome, EngineError> {
        let workdir = std::env::temp_dir().join(format!("gavel-judge-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&workdir).await?;

        let source_path = workdir.join(source_file_name(language));
        tokio::fs::write(&source_path, source).await?;

        let (mut cmd, entrypoint) = match language {
            Language::Cpp => {
                let exe = workdir.join("solution");
                let mut cmd = Command::new("g++");
                cmd.args(["-O2", "-std=c++17", "-o"])
                    .arg(&exe)
                    .arg(&source_path);
                (cmd, exe.to_string_lossy().into_owned())
            }
            Language::Java => {
                let mut cmd = Command::new("javac");
                cmd.arg(&source_path).current_dir(&workdir);
                (cmd, "Main".to_string())
            }
            Language::Python => {
                let mut cmd = Command::new("python3");
                cmd.args(["-m", "py_compile"]).arg(&source_path);
                (cmd, source_path.to_string_lossy().into_owned())
            }
            Language::Javascript => {
                let mut cmd = Command::new("node");
                cmd.arg("--check").arg(&source_path);
                (cmd, source_path.to_string_lossy().into_owned())
            }
        };

        let output = cmd
            .output()
            .await
            .map_err(|e| toolchain_missing(language, e))?;

        if !output.status.success() {
            let mut diagnostic = String::from_utf8_lossy(&output.stderr).into_owned();
            diagnostic.push_str(&String::from_utf8_lossy(&output.stdout));
            return Ok(CompileOutcome::Rejected { output: diagnostic });
        }

        debug!(%language, workdir = %workdir.display(), "Compiled submission");

        Ok(CompileOutcome::Ready(Program {
            language,
            workdir,
            entrypoint,
        }))
    }

    async fn run(
        &self,
        program: &Program,
        input: &str,
        limits: ResourceLimits,
    ) -> Result<RunOutcome, EngineError> {
        let mut cmd = run_command(program, limits);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| toolchain_missing(program.language, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A dead child closes the pipe early; that surfaces as the
            // run outcome, not as an engine error.
            let _ = stdin.write_all(input.as_bytes()).await;
        }

        let wall_timeout = limits.time_limit + WALL_CLOCK_GRACE;
        let started = Instant::now();

        let output = match tokio::time::timeout(wall_timeout, child.wait_with_output()).await {
            Ok(done) => done?,
            Err(_) => {
                // Watchdog fired; kill_on_drop reaps the process.
                return Ok(RunOutcome {
                    status: RunStatus::TimeLimitExceeded,
                    output: String::new(),
                    time_taken: limits.time_limit.as_secs_f64(),
                    memory_used: 0,
                });
            }
        };

        let elapsed = started.elapsed();
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        let status = if elapsed > limits.time_limit {
            RunStatus::TimeLimitExceeded
        } else if !output.status.success() {
            RunStatus::RuntimeError
        } else {
            RunStatus::Completed
        };

        Ok(RunOutcome {
            status,
            output: stdout,
            time_taken: elapsed.as_secs_f64(),
            memory_used: 0,
        })
    }

    async fn cleanup(&self, program: Program) -> Result<(), EngineError> {
        if let Err(e) = tokio::fs::remove_dir_all(&program.workdir).await {
            warn!(workdir = %program.workdir.display(), error = %e, "Failed to remove scratch dir");
        }
        Ok(())
    }
}

fn run_command(program: &Program, limits: ResourceLimits) -> Command {
    match program.language {
        Language::Cpp => Command::new(&program.entrypoint),
        Language::Java => {
            let mut cmd = Command::new("java");
            cmd.arg(format!("-Xmx{}m", limits.memory_limit))
                .arg("-cp")
                .arg(&program.workdir)
                .arg(&program.entrypoint);
            cmd
        }
        Language::Python => {
            let mut cmd = Command::new("python3");
            cmd.arg(&program.entrypoint);
            cmd
        }
        Language::Javascript => {
            let mut cmd = Command::new("node");
            cmd.arg(&program.entrypoint);
            cmd
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_file_names() {
        assert_eq!(source_file_name(Language::Cpp), "main.cpp");
        assert_eq!(source_file_name(Language::Java), "Main.java");
        assert_eq!(source_file_name(Language::Python), "main.py");
        assert_eq!(source_file_name(Language::Javascript), "main.js");
    }

    #[test]
    fn test_java_run_command_applies_memory_limit() {
        let program = Program {
            language: Language::Java,
            workdir: std::env::temp_dir(),
            entrypoint: "Main".into(),
        };
        let cmd = run_command(
            &program,
            ResourceLimits {
                time_limit: Duration::from_secs(1),
                memory_limit: 512,
            },
        );
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"-Xmx512m".to_string()));
    }
}
