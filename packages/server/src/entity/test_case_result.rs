use common::SubmissionStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-test-case outcome of a judged submission.
///
/// Exactly one row per (submission, test case) pair: the unique key makes
/// result application an insert-or-replace, so redelivered result
/// messages are idempotent.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "test_case_result")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(unique_key = "submission_test_case")]
    pub submission_id: i64,
    #[sea_orm(unique_key = "submission_test_case")]
    pub test_case_id: Uuid,

    pub status: SubmissionStatus,

    /// Program stdout.
    #[sea_orm(column_type = "Text")]
    pub output: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub checker_log: Option<String>,

    pub time_taken: f64,  // in seconds
    pub memory_used: i64, // in kilobytes

    #[sea_orm(belongs_to, from = "submission_id", to = "id")]
    pub submission: HasOne<super::submission::Entity>,
    #[sea_orm(belongs_to, from = "test_case_id", to = "id")]
    pub test_case: HasOne<super::test_case::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
