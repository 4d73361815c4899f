use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use common::Language;

/// Per-run resource limits, taken from the judge job. Never defaulted by
/// the engine: every job carries its own limits.
#[derive(Debug, Clone, Copy)]
pub struct ResourceLimits {
    pub time_limit: Duration,
    /// Megabytes.
    pub memory_limit: i64,
}

/// A prepared program ready to run against test case inputs.
#[derive(Debug, Clone)]
pub struct Program {
    pub language: Language,
    /// Scratch directory holding the source and build artifacts.
    pub workdir: PathBuf,
    /// Language-specific handle: binary path, main class, or script name.
    pub entrypoint: String,
}

/// Outcome of preparing a submission for execution.
pub enum CompileOutcome {
    Ready(Program),
    /// The compiler rejected the source. A verdict, not an engine error.
    Rejected { output: String },
}

/// How a single run terminated, before any output comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Exited normally; the pipeline compares output to decide the verdict.
    Completed,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
}

/// Observation of a single run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Program stdout.
    pub output: String,
    /// Wall-clock seconds.
    pub time_taken: f64,
    /// Kilobytes.
    pub memory_used: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Toolchain for {0} unavailable: {1}")]
    ToolchainMissing(Language, String),

    #[error("{0}")]
    Internal(String),
}

/// The execution seam of the judge pipeline.
///
/// The pipeline compiles once per job and runs once per test case;
/// everything inside a run (process isolation, resource accounting) is
/// the engine's concern. Implementations must enforce the time limit
/// with a hard wall-clock watchdog so a runaway submission can never
/// stall a worker slot indefinitely.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn compile(&self, language: Language, source: &str)
    -> Result<CompileOutcome, EngineError>;

    async fn run(
        &self,
        program: &Program,
        input: &str,
        limits: ResourceLimits,
    ) -> Result<RunOutcome, EngineError>;

    /// Release the program's scratch space. Best effort.
    async fn cleanup(&self, program: Program) -> Result<(), EngineError> {
        drop(program);
        Ok(())
    }
}
