use chrono::{DateTime, Utc};
use common::{Language, SubmissionStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{submission, test_case_result};

#[derive(Debug, Deserialize)]
pub struct CreateSubmissionRequest {
    pub problem_id: i64,
    pub user_id: i64,
    pub language: Language,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub id: i64,
    pub problem_id: i64,
    pub user_id: i64,
    pub language: Language,
    pub status: SubmissionStatus,
    pub time_taken: Option<f64>,
    pub memory_used: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub judged_at: Option<DateTime<Utc>>,
}

impl From<submission::Model> for SubmissionResponse {
    fn from(model: submission::Model) -> Self {
        Self {
            id: model.id,
            problem_id: model.problem_id,
            user_id: model.user_id,
            language: model.language,
            status: model.status,
            time_taken: model.time_taken,
            memory_used: model.memory_used,
            created_at: model.created_at,
            judged_at: model.judged_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TestCaseResultItem {
    pub test_case_id: Uuid,
    pub status: SubmissionStatus,
    pub output: String,
    pub checker_log: Option<String>,
    pub time_taken: f64,
    pub memory_used: i64,
}

impl From<test_case_result::Model> for TestCaseResultItem {
    fn from(model: test_case_result::Model) -> Self {
        Self {
            test_case_id: model.test_case_id,
            status: model.status,
            output: model.output,
            checker_log: model.checker_log,
            time_taken: model.time_taken,
            memory_used: model.memory_used,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmissionDetail {
    #[serde(flatten)]
    pub submission: SubmissionResponse,
    pub test_case_results: Vec<TestCaseResultItem>,
}
