pub mod judge_result;
pub mod status_update;
pub mod worker_dlq;

pub use judge_result::consume_judge_results;
pub use status_update::consume_status_updates;
pub use worker_dlq::consume_worker_dlq;

use std::future::Future;
use std::sync::Arc;

use common::retry::{RetryDecision, RetryTracker, calculate_backoff};
use common::{DlqConfig, DlqEnvelope, DlqErrorCode, DlqMessageType, SubmissionStatus};
use mq::BroccoliError;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::entity::submission;

/// Shared wiring for the API-side listeners.
pub(crate) struct ListenerContext {
    pub db: DatabaseConnection,
    pub mq: Arc<mq::Mq>,
    pub dlq_queue: String,
    pub dlq_config: DlqConfig,
    pub retry_tracker: Arc<Mutex<RetryTracker>>,
}

impl ListenerContext {
    pub fn new(
        db: DatabaseConnection,
        mq: Arc<mq::Mq>,
        dlq_queue: String,
        dlq_config: DlqConfig,
    ) -> Self {
        let retry_tracker = Arc::new(Mutex::new(RetryTracker::new(dlq_config.max_retries)));
        Self {
            db,
            mq,
            dlq_queue,
            dlq_config,
            retry_tracker,
        }
    }
}

/// Failure classification for message application.
///
/// Permanent failures (missing submission, malformed payload) are
/// dead-lettered and dropped: redelivering them can never succeed.
/// Transient failures (datastore unavailable) are retried with bounded
/// backoff before dead-lettering, so a flapping datastore never turns
/// into an infinite redelivery loop.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("{reason}")]
    Permanent { code: DlqErrorCode, reason: String },
    #[error(transparent)]
    Transient(#[from] anyhow::Error),
}

impl ApplyError {
    pub fn submission_not_found(submission_id: i64) -> Self {
        Self::Permanent {
            code: DlqErrorCode::SubmissionNotFound,
            reason: format!("Submission {} not found", submission_id),
        }
    }
}

impl From<DbErr> for ApplyError {
    fn from(e: DbErr) -> Self {
        Self::Transient(e.into())
    }
}

/// Drive one listener message through parse, apply, retry and DLQ.
///
/// Returning `Ok` acknowledges the delivery; it is only returned once the
/// message has either been durably applied or durably dead-lettered.
pub(crate) async fn handle_with_retry<M, F, Fut>(
    ctx: &ListenerContext,
    message_type: DlqMessageType,
    payload: serde_json::Value,
    apply: F,
) -> Result<(), BroccoliError>
where
    M: DeserializeOwned + Clone,
    F: Fn(M) -> Fut,
    Fut: Future<Output = Result<(), ApplyError>>,
{
    let message: M = match serde_json::from_value(payload.clone()) {
        Ok(message) => message,
        Err(e) => {
            error!(%message_type, error = %e, "Failed to parse listener message");
            let envelope = DlqEnvelope::deserialization_failure(message_type, payload, e);
            return publish_to_dlq(ctx, envelope).await;
        }
    };

    let submission_id = payload.get("submissionId").and_then(|v| v.as_i64());
    let correlation = submission_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| format!("unknown-{}", message_type));

    loop {
        match apply(message.clone()).await {
            Ok(()) => {
                ctx.retry_tracker.lock().await.clear(&correlation);
                return Ok(());
            }
            Err(ApplyError::Permanent { code, reason }) => {
                error!(
                    %message_type,
                    submission_id,
                    error_code = %code,
                    reason = %reason,
                    "Dropping message permanently"
                );

                ctx.retry_tracker.lock().await.clear(&correlation);

                let envelope = DlqEnvelope {
                    message_id: correlation,
                    message_type,
                    submission_id,
                    payload,
                    error_code: code,
                    error_message: reason,
                    retry_history: vec![],
                };
                return publish_to_dlq(ctx, envelope).await;
            }
            Err(ApplyError::Transient(e)) => {
                let error_str = e.to_string();
                let decision = ctx
                    .retry_tracker
                    .lock()
                    .await
                    .record_failure(&correlation, &error_str);

                match decision {
                    RetryDecision::Retry { attempt } => {
                        let delay = calculate_backoff(
                            attempt,
                            ctx.dlq_config.base_delay_ms,
                            ctx.dlq_config.max_delay_ms,
                        );
                        warn!(
                            %message_type,
                            submission_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Retrying message application"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::Exhausted { history } => {
                        error!(
                            %message_type,
                            submission_id,
                            retry_count = history.len(),
                            error = %e,
                            "Application retries exhausted, dead-lettering"
                        );

                        let envelope = DlqEnvelope {
                            message_id: correlation,
                            message_type,
                            submission_id,
                            payload,
                            error_code: DlqErrorCode::MaxRetriesExceeded,
                            error_message: error_str,
                            retry_history: history,
                        };
                        return publish_to_dlq(ctx, envelope).await;
                    }
                }
            }
        }
    }
}

/// Dead-letter a message and ack the original delivery. If even the DLQ
/// publish fails, reject so the broker redelivers.
pub(crate) async fn publish_to_dlq(
    ctx: &ListenerContext,
    envelope: DlqEnvelope,
) -> Result<(), BroccoliError> {
    if let Err(e) = ctx
        .mq
        .publish(&ctx.dlq_queue, None, &envelope, None)
        .await
    {
        error!(error = %e, "Failed to publish to DLQ");
        return Err(BroccoliError::Publish(format!(
            "Failed to publish to DLQ: {e}"
        )));
    }
    Ok(())
}

/// Mark a submission as SYSTEM_ERROR with diagnostics.
///
/// Guarded by the state machine: a submission that already carries a
/// final verdict is left untouched.
pub async fn mark_submission_system_error<C: ConnectionTrait>(
    conn: &C,
    submission_id: i64,
    error_code: &str,
    error_message: &str,
) -> Result<u64, DbErr> {
    let result = submission::Entity::update_many()
        .col_expr(
            submission::Column::Status,
            Expr::value(SubmissionStatus::SystemError),
        )
        .col_expr(
            submission::Column::ErrorCode,
            Expr::value(Some(error_code.to_string())),
        )
        .col_expr(
            submission::Column::ErrorMessage,
            Expr::value(Some(error_message.to_string())),
        )
        .filter(submission::Column::Id.eq(submission_id))
        .filter(submission::Column::Status.is_in([
            SubmissionStatus::WaitingForExecution,
            SubmissionStatus::Running,
        ]))
        .exec(conn)
        .await?;

    Ok(result.rows_affected)
}
