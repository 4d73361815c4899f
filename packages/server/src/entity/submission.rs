use common::{Language, SubmissionStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A user's submission against a problem.
///
/// Created synchronously with status WAITING_FOR_EXECUTION before its
/// judge job is ever published; mutated only by the pipeline listeners
/// and the reconciler; never deleted by the pipeline.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "submission")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "Text")]
    pub code: String,
    pub language: Language,
    pub status: SubmissionStatus,

    /// Maximum time used across test cases, in seconds.
    pub time_taken: Option<f64>,
    /// Maximum memory used across test cases, in kilobytes.
    pub memory_used: Option<i64>,

    /// Diagnostics set when the pipeline dead-letters this submission.
    pub error_code: Option<String>,
    pub error_message: Option<String>,

    /// Publish attempts for the judge job (initial publish included).
    pub dispatch_attempts: i32,
    /// When the job was last handed to the broker. Basis for the
    /// reconciler's stuck-submission scans.
    pub last_dispatched_at: DateTimeUtc,

    pub user_id: i64,
    #[sea_orm(belongs_to, from = "user_id", to = "id")]
    pub user: HasOne<super::user::Entity>,

    pub problem_id: i64,
    #[sea_orm(belongs_to, from = "problem_id", to = "id")]
    pub problem: HasOne<super::problem::Entity>,

    #[sea_orm(has_many)]
    pub test_case_results: HasMany<super::test_case_result::Entity>,

    pub created_at: DateTimeUtc,
    pub judged_at: Option<DateTimeUtc>,
}

impl ActiveModelBehavior for ActiveModel {}
