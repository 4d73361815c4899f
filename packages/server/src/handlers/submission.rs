use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use common::SubmissionStatus;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, NotSet, QueryFilter, Set};

use crate::entity::{problem, submission, test_case_result, user};
use crate::error::AppError;
use crate::models::submission::{
    CreateSubmissionRequest, SubmissionDetail, SubmissionResponse, TestCaseResultItem,
};
use crate::publisher::enqueue_judge_job;
use crate::state::AppState;

const MAX_CODE_BYTES: usize = 256 * 1024;

/// Accept a submission.
///
/// The row is committed with WAITING_FOR_EXECUTION strictly before the
/// job is published, and the response does not wait for the pipeline:
/// the caller polls the submission for the verdict.
pub async fn create_submission(
    State(state): State<AppState>,
    Json(req): Json<CreateSubmissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.code.trim().is_empty() {
        return Err(AppError::Validation("Code must not be empty".into()));
    }
    if req.code.len() > MAX_CODE_BYTES {
        return Err(AppError::Validation(format!(
            "Code exceeds {} bytes",
            MAX_CODE_BYTES
        )));
    }

    user::Entity::find_by_id(req.user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    problem::Entity::find_by_id(req.problem_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Problem not found".into()))?;

    let now = Utc::now();
    let model = submission::ActiveModel {
        id: NotSet,
        code: Set(req.code),
        language: Set(req.language),
        status: Set(SubmissionStatus::WaitingForExecution),
        time_taken: Set(None),
        memory_used: Set(None),
        error_code: Set(None),
        error_message: Set(None),
        dispatch_attempts: Set(1),
        last_dispatched_at: Set(now),
        user_id: Set(req.user_id),
        problem_id: Set(req.problem_id),
        created_at: Set(now),
        judged_at: Set(None),
    };

    // Insert commits here; only then may the job exist on the broker.
    let created = model.insert(&state.db).await?;

    enqueue_judge_job(&state, &created).await;

    Ok((
        StatusCode::CREATED,
        Json(SubmissionResponse::from(created)),
    ))
}

/// Read a submission with its per-test-case results. This is the read
/// path that eventually reflects the final verdict.
pub async fn get_submission(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SubmissionDetail>, AppError> {
    let submission = submission::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Submission not found".into()))?;

    let results = test_case_result::Entity::find()
        .filter(test_case_result::Column::SubmissionId.eq(id))
        .all(&state.db)
        .await?
        .into_iter()
        .map(TestCaseResultItem::from)
        .collect();

    Ok(Json(SubmissionDetail {
        submission: SubmissionResponse::from(submission),
        test_case_results: results,
    }))
}
