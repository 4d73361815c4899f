use std::sync::Arc;

use common::config::MqAppConfig;
use common::status_update::StatusUpdate;
use common::DlqMessageType;
use mq::{BrokerMessage, Mq};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, TransactionTrait,
};
use tracing::{error, info};

use super::{ApplyError, ListenerContext, handle_with_retry};
use crate::entity::submission;

/// Consume interim status updates from the status queue.
pub async fn consume_status_updates(db: DatabaseConnection, mq: Arc<Mq>, mq_config: MqAppConfig) {
    let queue_name = mq_config.status_queue_name.clone();
    info!(queue = %queue_name, "Starting status update consumer");

    let ctx = Arc::new(ListenerContext::new(
        db,
        Arc::clone(&mq),
        mq_config.dlq_queue_name.clone(),
        mq_config.dlq.clone(),
    ));

    let result = mq
        .process_messages(
            &queue_name,
            None, // single-threaded for sequential DB writes
            None,
            move |message: BrokerMessage<serde_json::Value>| {
                let ctx = Arc::clone(&ctx);
                async move {
                    let db = ctx.db.clone();
                    handle_with_retry::<StatusUpdate, _, _>(
                        &ctx,
                        DlqMessageType::StatusUpdate,
                        message.payload,
                        move |update| {
                            let db = db.clone();
                            async move { apply_status_update(&db, update).await.map(|_| ()) }
                        },
                    )
                    .await
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Status update consumer stopped unexpectedly");
    }
}

/// What applying a status update did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusApplied {
    Applied,
    /// The update would not advance the state machine (e.g. a redelivered
    /// RUNNING arriving after the final verdict) and was ignored.
    IgnoredStale,
}

/// Apply a single status update transactionally.
///
/// A missing submission is a permanent error: the row must have been
/// committed before the job was ever published, so redelivery can never
/// make it appear.
pub async fn apply_status_update(
    db: &DatabaseConnection,
    update: StatusUpdate,
) -> Result<StatusApplied, ApplyError> {
    let txn = db.begin().await.map_err(ApplyError::from)?;

    let current = submission::Entity::find_by_id(update.submission_id)
        .lock(LockType::Update)
        .one(&txn)
        .await
        .map_err(ApplyError::from)?
        .ok_or_else(|| ApplyError::submission_not_found(update.submission_id))?;

    if !current.status.can_transition_to(update.status) {
        info!(
            submission_id = update.submission_id,
            current = %current.status,
            incoming = %update.status,
            "Ignoring stale status update"
        );
        txn.rollback().await.map_err(ApplyError::from)?;
        return Ok(StatusApplied::IgnoredStale);
    }

    submission::Entity::update_many()
        .col_expr(submission::Column::Status, Expr::value(update.status))
        .filter(submission::Column::Id.eq(update.submission_id))
        .exec(&txn)
        .await
        .map_err(ApplyError::from)?;

    txn.commit().await.map_err(ApplyError::from)?;

    info!(
        submission_id = update.submission_id,
        status = %update.status,
        "Applied status update"
    );

    Ok(StatusApplied::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{Language, SubmissionStatus};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn submission_with_status(status: SubmissionStatus) -> submission::Model {
        submission::Model {
            id: 42,
            code: "print(1)".into(),
            language: Language::Python,
            status,
            time_taken: None,
            memory_used: None,
            error_code: None,
            error_message: None,
            dispatch_attempts: 1,
            last_dispatched_at: Utc::now(),
            user_id: 1,
            problem_id: 1,
            created_at: Utc::now(),
            judged_at: None,
        }
    }

    #[tokio::test]
    async fn test_missing_submission_is_permanent() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<submission::Model>::new()])
            .into_connection();

        let result = apply_status_update(&db, StatusUpdate::running(42)).await;

        match result {
            Err(ApplyError::Permanent { code, .. }) => {
                assert_eq!(code, common::DlqErrorCode::SubmissionNotFound);
            }
            other => panic!("expected Permanent, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_running_applies_to_pending_submission() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![submission_with_status(
                SubmissionStatus::WaitingForExecution,
            )]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let applied = apply_status_update(&db, StatusUpdate::running(42))
            .await
            .unwrap();

        assert_eq!(applied, StatusApplied::Applied);
    }

    #[tokio::test]
    async fn test_late_running_never_regresses_final_verdict() {
        // No exec results appended: a regression attempt would error out
        // in the mock, so Ok(IgnoredStale) proves nothing was written.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![submission_with_status(SubmissionStatus::Passed)]])
            .into_connection();

        let applied = apply_status_update(&db, StatusUpdate::running(42))
            .await
            .unwrap();

        assert_eq!(applied, StatusApplied::IgnoredStale);
    }
}
