use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::submission_status::SubmissionStatus;

/// Result notification from a worker after judging a submission.
///
/// The only channel by which a worker reports a verdict; field names are
/// part of the wire protocol.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeResult {
    /// Submission that was judged.
    pub submission_id: i64,
    /// Aggregate verdict: the verdict of the first failing test case in
    /// input order, or PASSED if all passed.
    pub status: SubmissionStatus,
    /// Maximum time used across test cases, in seconds.
    pub time_taken: f64,
    /// Maximum memory used across test cases, in kilobytes.
    pub memory_used: i64,
    /// Individual test case results, in judging order.
    pub test_case_results: Vec<TestCaseJudgeResult>,
}

impl JudgeResult {
    /// A terminal result for a submission the pipeline failed on.
    pub fn system_error(submission_id: i64) -> Self {
        Self {
            submission_id,
            status: SubmissionStatus::SystemError,
            time_taken: 0.0,
            memory_used: 0,
            test_case_results: vec![],
        }
    }

    /// A result for a submission that never ran: compilation failed.
    pub fn compilation_error(submission_id: i64) -> Self {
        Self {
            submission_id,
            status: SubmissionStatus::CompilationError,
            time_taken: 0.0,
            memory_used: 0,
            test_case_results: vec![],
        }
    }
}

/// Outcome of running a submission against a single test case.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseJudgeResult {
    /// Test case that was executed.
    pub test_case_id: Uuid,
    /// Program output (stdout).
    pub output: String,
    /// Verdict for this test case.
    pub status: SubmissionStatus,
    /// Time used in seconds.
    pub time_taken: f64,
    /// Memory used in kilobytes.
    pub memory_used: i64,
    /// Custom checker feedback, if a checker ran.
    pub checker_log: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let result = JudgeResult {
            submission_id: 42,
            status: SubmissionStatus::TimeLimitExceeded,
            time_taken: 2.5,
            memory_used: 10240,
            test_case_results: vec![TestCaseJudgeResult {
                test_case_id: Uuid::parse_str("9e0f2f2e-72ab-4bfe-a3ac-44f38bb0ef7a").unwrap(),
                output: "3\n".into(),
                status: SubmissionStatus::Passed,
                time_taken: 0.02,
                memory_used: 2048,
                checker_log: None,
            }],
        };

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["submissionId"], 42);
        assert_eq!(value["status"], "TIME_LIMIT_EXCEEDED");
        assert_eq!(value["timeTaken"], 2.5);
        assert_eq!(value["memoryUsed"], 10240);

        let tc = &value["testCaseResults"][0];
        assert_eq!(tc["testCaseId"], "9e0f2f2e-72ab-4bfe-a3ac-44f38bb0ef7a");
        assert_eq!(tc["output"], "3\n");
        assert_eq!(tc["status"], "PASSED");
        assert_eq!(tc["timeTaken"], 0.02);
        assert_eq!(tc["memoryUsed"], 2048);
        assert_eq!(tc["checkerLog"], serde_json::Value::Null);
    }

    #[test]
    fn test_wire_roundtrip() {
        let result = JudgeResult::system_error(9);
        let json = serde_json::to_string(&result).unwrap();
        let parsed: JudgeResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.submission_id, 9);
        assert_eq!(parsed.status, SubmissionStatus::SystemError);
        assert!(parsed.test_case_results.is_empty());
    }
}
