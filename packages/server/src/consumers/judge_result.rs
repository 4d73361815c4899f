use std::sync::Arc;

use chrono::Utc;
use common::config::MqAppConfig;
use common::judge_result::JudgeResult;
use common::DlqMessageType;
use mq::{BrokerMessage, Mq};
use sea_orm::sea_query::{Expr, LockType, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, NotSet, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use tracing::{error, info, warn};

use super::{ApplyError, ListenerContext, handle_with_retry};
use crate::entity::{submission, test_case_result};

/// Consume judge results from the result queue.
pub async fn consume_judge_results(db: DatabaseConnection, mq: Arc<Mq>, mq_config: MqAppConfig) {
    let queue_name = mq_config.result_queue_name.clone();
    info!(queue = %queue_name, "Starting judge result consumer");

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
                    handle_with_retry::<JudgeResult, _, _>(
                        &ctx,
                        DlqMessageType::JudgeResult,
                        message.payload,
                        move |result| {
                            let db = db.clone();
                            async move { apply_judge_result(&db, result).await }
                        },
                    )
                    .await
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Judge result consumer stopped unexpectedly");
    }
}

/// Apply a judge result transactionally and idempotently.
///
/// Per-test-case rows are insert-or-replace keyed by
/// (submission_id, test_case_id), so redelivering the same result message
/// produces exactly the rows a single delivery would have.
pub async fn apply_judge_result(
    db: &DatabaseConnection,
    result: JudgeResult,
) -> Result<(), ApplyError> {
    let txn = db.begin().await.map_err(ApplyError::from)?;

    let current = submission::Entity::find_by_id(result.submission_id)
        .lock(LockType::Update)
        .one(&txn)
        .await
        .map_err(ApplyError::from)?
        .ok_or_else(|| ApplyError::submission_not_found(result.submission_id))?;

    // Redelivery of an already-applied result carries the same verdict;
    // anything else that fails the transition check is a stale or
    // conflicting message and is dropped without touching the rows.
    let is_redelivery = current.status == result.status;
    if !is_redelivery && !current.status.can_transition_to(result.status) {
        warn!(
            submission_id = result.submission_id,
            current = %current.status,
            incoming = %result.status,
            "Dropping judge result that would regress the submission"
        );
        txn.rollback().await.map_err(ApplyError::from)?;
        return Ok(());
    }

    let now = Utc::now();

    for tc_result in &result.test_case_results {
        let model = test_case_result::ActiveModel {
            id: NotSet,
            submission_id: Set(result.submission_id),
            test_case_id: Set(tc_result.test_case_id),
            status: Set(tc_result.status),
            output: Set(tc_result.output.clone()),
            checker_log: Set(tc_result.checker_log.clone()),
            time_taken: Set(tc_result.time_taken),
            memory_used: Set(tc_result.memory_used),
            created_at: Set(now),
        };

        test_case_result::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    test_case_result::Column::SubmissionId,
                    test_case_result::Column::TestCaseId,
                ])
                .update_columns([
                    test_case_result::Column::Status,
                    test_case_result::Column::Output,
                    test_case_result::Column::CheckerLog,
                    test_case_result::Column::TimeTaken,
                    test_case_result::Column::MemoryUsed,
                ])
                .to_owned(),
            )
            .exec_without_returning(&txn)
            .await
            .map_err(ApplyError::from)?;
    }

    if !is_redelivery {
        submission::Entity::update_many()
            .col_expr(submission::Column::Status, Expr::value(result.status))
            .col_expr(
                submission::Column::TimeTaken,
                Expr::value(Some(result.time_taken)),
            )
            .col_expr(
                submission::Column::MemoryUsed,
                Expr::value(Some(result.memory_used)),
            )
            .col_expr(submission::Column::JudgedAt, Expr::value(Some(now)))
            .filter(submission::Column::Id.eq(result.submission_id))
            .exec(&txn)
            .await
            .map_err(ApplyError::from)?;
    }

    txn.commit().await.map_err(ApplyError::from)?;

    info!(
        submission_id = result.submission_id,
        status = %result.status,
        test_cases = result.test_case_results.len(),
        redelivery = is_redelivery,
        "Applied judge result"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::judge_result::TestCaseJudgeResult;
    use common::{Language, SubmissionStatus};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use uuid::Uuid;

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

    fn passed_result() -> JudgeResult {
        JudgeResult {
            submission_id: 42,
            status: SubmissionStatus::Passed,
            time_taken: 0.3,
            memory_used: 4096,
            test_case_results: vec![
                TestCaseJudgeResult {
                    test_case_id: Uuid::new_v4(),
                    output: "3\n".into(),
                    status: SubmissionStatus::Passed,
                    time_taken: 0.1,
                    memory_used: 2048,
                    checker_log: None,
                },
                TestCaseJudgeResult {
                    test_case_id: Uuid::new_v4(),
                    output: "30\n".into(),
                    status: SubmissionStatus::Passed,
                    time_taken: 0.3,
                    memory_used: 4096,
                    checker_log: None,
                },
            ],
        }
    }

    fn exec_ok() -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }
    }

    #[tokio::test]
    async fn test_missing_submission_is_permanent() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<submission::Model>::new()])
            .into_connection();

        let result = apply_judge_result(&db, passed_result()).await;

        match result {
            Err(ApplyError::Permanent { code, .. }) => {
                assert_eq!(code, common::DlqErrorCode::SubmissionNotFound);
            }
            other => panic!("expected Permanent, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_first_delivery_upserts_rows_and_aggregate() {
        // One find, two upserts, one aggregate update.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![submission_with_status(SubmissionStatus::Running)]])
            .append_exec_results([exec_ok(), exec_ok(), exec_ok()])
            .into_connection();

        apply_judge_result(&db, passed_result()).await.unwrap();
    }

    #[tokio::test]
    async fn test_redelivery_reapplies_rows_only() {
        // The submission already carries the verdict: the two upserts
        // rewrite identical rows and no aggregate update is issued (the
        // mock would fail on a third exec).
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![submission_with_status(SubmissionStatus::Passed)]])
            .append_exec_results([exec_ok(), exec_ok()])
            .into_connection();

        apply_judge_result(&db, passed_result()).await.unwrap();
    }

    #[tokio::test]
    async fn test_conflicting_result_is_dropped() {
        // A different terminal verdict for an already-final submission
        // must not touch any rows: no exec results are available, so a
        // write would fail the test.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![submission_with_status(SubmissionStatus::WrongAnswer)]])
            .into_connection();

        apply_judge_result(&db, passed_result()).await.unwrap();
    }
}
