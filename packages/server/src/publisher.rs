use common::judge_job::{JudgeJob, TestCaseData};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use tracing::{debug, error, info, instrument, warn};

use crate::entity::{problem, submission, test_case};
use crate::error::AppError;
use crate::state::AppState;

/// Build a self-sufficient judge job for a committed submission: the
/// problem's limits plus every test case in judging order, so the worker
/// never queries the datastore.
pub async fn build_judge_job<C: ConnectionTrait>(
    db: &C,
    submission: &submission::Model,
) -> Result<JudgeJob, AppError> {
    let problem = problem::Entity::find_by_id(submission.problem_id)
        .one(db)
        .await?
        .ok_or_else(|| {
            AppError::Internal(format!(
                "Problem {} not found for submission {}",
                submission.problem_id, submission.id
            ))
        })?;

    let test_cases: Vec<TestCaseData> = test_case::Entity::find()
        .filter(test_case::Column::ProblemId.eq(submission.problem_id))
        .order_by_asc(test_case::Column::Position)
        .all(db)
        .await?
        .into_iter()
        .map(|tc| TestCaseData {
            test_case_id: tc.id,
            input: tc.input,
            expected_output: tc.expected_output,
        })
        .collect();

    Ok(JudgeJob::new(
        submission.id,
        submission.language,
        &submission.code,
        problem.time_limit,
        problem.memory_limit,
        test_cases,
    ))
}

/// Publish a judge job and wait for the broker to accept it.
///
/// The publish is confirmed per call; there is no shared confirm state
/// between concurrent publishes.
pub async fn publish_job(mq: &mq::Mq, queue_name: &str, job: &JudgeJob) -> Result<(), String> {
    mq.publish(queue_name, None, job, None)
        .await
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Enqueue the judge job for a submission.
///
/// Precondition: the submission row is already durably committed with
/// status WAITING_FOR_EXECUTION, so a worker can never reply about a row
/// the listeners cannot see. Failures are logged, never propagated into
/// the caller's request cycle; the reconciler re-publishes anything that
/// stays unconfirmed.
#[instrument(skip(state, submission), fields(submission_id = submission.id))]
pub async fn enqueue_judge_job(state: &AppState, submission: &submission::Model) {
    let Some(ref mq) = state.mq else {
        debug!("MQ unavailable, skipping enqueue");
        return;
    };

    let job = match build_judge_job(&state.db, submission).await {
        Ok(job) => job,
        Err(e) => {
            error!(error = ?e, "Failed to build judge job");
            return;
        }
    };

    let test_case_count = job.test_cases.len();

    match publish_job(mq, &state.config.mq.queue_name, &job).await {
        Ok(()) => {
            info!(test_cases = test_case_count, "Judge job enqueued");
        }
        Err(e) => {
            warn!(error = %e, "Failed to enqueue judge job");
        }
    }
}
