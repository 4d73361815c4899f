use std::time::Duration;

use common::judge_job::JudgeJob;
use common::judge_result::{JudgeResult, TestCaseJudgeResult};
use common::submission_status::SubmissionStatus;
use tracing::{error, info, instrument, warn};

use crate::models::executor::{
    CompileOutcome, ExecutionEngine, Program, ResourceLimits, RunStatus,
};

/// Judge one job end to end: compile once, run every test case in input
/// order, aggregate a verdict.
///
/// Always returns a terminal result. Judging failures (compile rejection,
/// crashes, limits) are verdicts; engine failures degrade to SYSTEM_ERROR
/// rather than dropping the job.
#[instrument(skip(engine, job), fields(submission_id = job.submission_id))]
pub async fn handle_judge_job(engine: &dyn ExecutionEngine, job: &JudgeJob) -> JudgeResult {
    let source = match job.decode_source() {
        Ok(source) => source,
        Err(e) => {
            error!(error = %e, "Undecodable source in job payload");
            return JudgeResult::system_error(job.submission_id);
        }
    };

    // A corrupt limit must not panic the worker slot.
    let Ok(time_limit) = Duration::try_from_secs_f64(job.time_limit) else {
        error!(time_limit = job.time_limit, "Invalid time limit in job");
        return JudgeResult::system_error(job.submission_id);
    };

    let program = match engine.compile(job.language, &source).await {
        Ok(CompileOutcome::Ready(program)) => program,
        Ok(CompileOutcome::Rejected { output }) => {
            info!(diagnostic = %output, "Compilation rejected");
            return JudgeResult::compilation_error(job.submission_id);
        }
        Err(e) => {
            error!(error = %e, "Engine failed to prepare submission");
            return JudgeResult::system_error(job.submission_id);
        }
    };

    let limits = ResourceLimits {
        time_limit,
        memory_limit: job.memory_limit,
    };

    let result = run_test_cases(engine, job, &program, limits).await;

    if let Err(e) = engine.cleanup(program).await {
        warn!(error = %e, "Engine cleanup failed");
    }

    result
}

async fn run_test_cases(
    engine: &dyn ExecutionEngine,
    job: &JudgeJob,
    program: &Program,
    limits: ResourceLimits,
) -> JudgeResult {
    let mut rows = Vec::with_capacity(job.test_cases.len());
    let mut max_time: f64 = 0.0;
    let mut max_memory: i64 = 0;

    for tc in &job.test_cases {
        let row = match engine.run(program, &tc.input, limits).await {
            Ok(outcome) => {
                let status = match outcome.status {
                    RunStatus::Completed => {
                        if outputs_match(&outcome.output, &tc.expected_output) {
                            SubmissionStatus::Passed
                        } else {
                            SubmissionStatus::WrongAnswer
                        }
                    }
                    RunStatus::TimeLimitExceeded => SubmissionStatus::TimeLimitExceeded,
                    RunStatus::MemoryLimitExceeded => SubmissionStatus::MemoryLimitExceeded,
                    RunStatus::RuntimeError => SubmissionStatus::RuntimeError,
                };
                TestCaseJudgeResult {
                    test_case_id: tc.test_case_id,
                    output: outcome.output,
                    status,
                    time_taken: outcome.time_taken,
                    memory_used: outcome.memory_used,
                    checker_log: None,
                }
            }
            Err(e) => {
                error!(test_case_id = %tc.test_case_id, error = %e, "Engine run failed");
                TestCaseJudgeResult {
                    test_case_id: tc.test_case_id,
                    output: String::new(),
                    status: SubmissionStatus::SystemError,
                    time_taken: 0.0,
                    memory_used: 0,
                    checker_log: None,
                }
            }
        };

        max_time = max_time.max(row.time_taken);
        max_memory = max_memory.max(row.memory_used);
        rows.push(row);
    }

    // First failing test case in input order decides the verdict.
    // Aggregate time/memory are the maxima across test cases.
    let status = rows
        .iter()
        .map(|row| row.status)
        .find(|status| *status != SubmissionStatus::Passed)
        .unwrap_or(SubmissionStatus::Passed);

    info!(
        status = %status,
        test_cases = rows.len(),
        time_taken = max_time,
        "Judging completed"
    );

    JudgeResult {
        submission_id: job.submission_id,
        status,
        time_taken: max_time,
        memory_used: max_memory,
        test_case_results: rows,
    }
}

/// Compare output ignoring trailing whitespace per line and trailing
/// blank lines.
fn outputs_match(actual: &str, expected: &str) -> bool {
    fn normalize(s: &str) -> Vec<&str> {
        let mut lines: Vec<&str> = s.lines().map(|l| l.trim_end()).collect();
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        lines
    }
    normalize(actual) == normalize(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::judge_job::TestCaseData;
    use common::language::Language;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use uuid::Uuid;

    use crate::models::executor::{EngineError, RunOutcome};

    /// Scripted engine: pops one outcome per run, in test case order.
    struct MockEngine {
        compile: Option<CompileOutcome>,
        runs: Mutex<VecDeque<Result<RunOutcome, EngineError>>>,
    }

    impl MockEngine {
        fn ready(runs: Vec<Result<RunOutcome, EngineError>>) -> Self {
            Self {
                compile: Some(CompileOutcome::Ready(Program {
                    language: Language::Cpp,
                    workdir: std::env::temp_dir(),
                    entrypoint: "solution".into(),
                })),
                runs: Mutex::new(runs.into()),
            }
        }

        fn rejecting(diagnostic: &str) -> Self {
            Self {
                compile: Some(CompileOutcome::Rejected {
                    output: diagnostic.into(),
                }),
                runs: Mutex::new(VecDeque::new()),
            }
        }
    }

    #[async_trait]
    impl ExecutionEngine for MockEngine {
        async fn compile(
            &self,
            _language: Language,
            _source: &str,
        ) -> Result<CompileOutcome, EngineError> {
            match &self.compile {
                Some(CompileOutcome::Ready(p)) => Ok(CompileOutcome::Ready(p.clone())),
                Some(CompileOutcome::Rejected { output }) => Ok(CompileOutcome::Rejected {
                    output: output.clone(),
                }),
                None => Err(EngineError::Internal("compiler exploded".into())),
            }
        }

        async fn run(
            &self,
            _program: &Program,
            _input: &str,
            _limits: ResourceLimits,
        ) -> Result<RunOutcome, EngineError> {
            self.runs
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(EngineError::Internal("unexpected run".into())))
        }
    }

    fn completed(output: &str, time_taken: f64, memory_used: i64) -> Result<RunOutcome, EngineError> {
        Ok(RunOutcome {
            status: RunStatus::Completed,
            output: output.into(),
            time_taken,
            memory_used,
        })
    }

    fn terminated(status: RunStatus) -> Result<RunOutcome, EngineError> {
        Ok(RunOutcome {
            status,
            output: String::new(),
            time_taken: 1.0,
            memory_used: 0,
        })
    }

    fn job(test_cases: Vec<(&str, &str)>) -> JudgeJob {
        JudgeJob::new(
            42,
            Language::Cpp,
            "int main() {}",
            2.0,
            256,
            test_cases
                .into_iter()
                .map(|(input, expected)| TestCaseData {
                    test_case_id: Uuid::new_v4(),
                    input: input.into(),
                    expected_output: expected.into(),
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_all_passed() {
        let engine = MockEngine::ready(vec![
            completed("3\n", 0.1, 1024),
            completed("7\n", 0.3, 4096),
        ]);
        let job = job(vec![("1 2", "3"), ("3 4", "7")]);

        let result = handle_judge_job(&engine, &job).await;

        assert_eq!(result.status, SubmissionStatus::Passed);
        assert_eq!(result.test_case_results.len(), 2);
        assert_eq!(result.time_taken, 0.3);
        assert_eq!(result.memory_used, 4096);
    }

    #[tokio::test]
    async fn test_single_passed_test_case() {
        let engine = MockEngine::ready(vec![completed("3\n", 0.05, 512)]);
        let job = job(vec![("1 2", "3")]);

        let result = handle_judge_job(&engine, &job).await;

        assert_eq!(result.status, SubmissionStatus::Passed);
        assert_eq!(result.test_case_results.len(), 1);
        assert_eq!(
            result.test_case_results[0].status,
            SubmissionStatus::Passed
        );
    }

    #[tokio::test]
    async fn test_first_failure_decides_verdict() {
        let engine = MockEngine::ready(vec![
            completed("3\n", 0.1, 1024),
            terminated(RunStatus::TimeLimitExceeded),
        ]);
        let job = job(vec![("1 2", "3"), ("3 4", "7")]);

        let result = handle_judge_job(&engine, &job).await;

        assert_eq!(result.status, SubmissionStatus::TimeLimitExceeded);
        assert_eq!(result.test_case_results.len(), 2);
        assert_eq!(result.test_case_results[0].status, SubmissionStatus::Passed);
    }

    #[tokio::test]
    async fn test_earlier_failure_wins_over_later_one() {
        let engine = MockEngine::ready(vec![
            completed("wrong\n", 0.1, 0),
            terminated(RunStatus::TimeLimitExceeded),
        ]);
        let job = job(vec![("1 2", "3"), ("3 4", "7")]);

        let result = handle_judge_job(&engine, &job).await;

        assert_eq!(result.status, SubmissionStatus::WrongAnswer);
    }

    #[tokio::test]
    async fn test_runtime_error_verdict() {
        let engine = MockEngine::ready(vec![terminated(RunStatus::RuntimeError)]);
        let job = job(vec![("1 2", "3")]);

        let result = handle_judge_job(&engine, &job).await;

        assert_eq!(result.status, SubmissionStatus::RuntimeError);
    }

    #[tokio::test]
    async fn test_compile_rejection_is_a_verdict() {
        let engine = MockEngine::rejecting("main.cpp:1: expected ';'");
        let job = job(vec![("1 2", "3")]);

        let result = handle_judge_job(&engine, &job).await;

        assert_eq!(result.status, SubmissionStatus::CompilationError);
        assert!(result.test_case_results.is_empty());
    }

    #[tokio::test]
    async fn test_engine_run_failure_degrades_to_system_error() {
        let engine = MockEngine::ready(vec![Err(EngineError::Internal("scratch dir gone".into()))]);
        let job = job(vec![("1 2", "3")]);

        let result = handle_judge_job(&engine, &job).await;

        assert_eq!(result.status, SubmissionStatus::SystemError);
        assert_eq!(result.test_case_results.len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_source_is_terminal() {
        let engine = MockEngine::ready(vec![]);
        let mut bad_job = job(vec![("1 2", "3")]);
        bad_job.code = "!!not base64!!".into();

        let result = handle_judge_job(&engine, &bad_job).await;

        assert_eq!(result.status, SubmissionStatus::SystemError);
    }

    #[test]
    fn test_outputs_match_normalization() {
        assert!(outputs_match("3\n", "3"));
        assert!(outputs_match("3  \n\n", "3\n"));
        assert!(outputs_match("a\nb", "a\nb\n"));
        assert!(!outputs_match("4", "3"));
        assert!(!outputs_match("a\n\nb", "a\nb"));
    }
}
