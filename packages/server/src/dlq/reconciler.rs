//! Background reconciler closing the fire-and-forget publish gap.
//!
//! A nacked or lost job publish leaves its submission in
//! WAITING_FOR_EXECUTION with nothing else ever touching it. The
//! reconciler re-publishes such jobs from the persisted row (the row is
//! the outbox: it holds everything needed to rebuild the job) up to a
//! bounded number of dispatch attempts, then dead-letters the
//! submission. Submissions stuck in RUNNING past their timeout are
//! dead-lettered directly: their worker is presumed lost and redelivery
//! already had its chance.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::config::MqAppConfig;
use common::{DlqErrorCode, DlqMessageType, SubmissionDlqErrorCode, SubmissionStatus};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, ExprTrait, QueryFilter, QuerySelect,
    TransactionTrait,
};
use tracing::{error, info, warn};

use crate::consumers::mark_submission_system_error;
use crate::dlq::DlqService;
use crate::entity::submission;
use crate::publisher;

/// Run the reconciler as a background task.
pub async fn run_reconciler(
    db: DatabaseConnection,
    mq: Option<Arc<mq::Mq>>,
    mq_config: MqAppConfig,
) {
    let dlq_config = mq_config.dlq.clone();
    let scan_interval = Duration::from_secs(dlq_config.reconciler_scan_interval_secs);

    info!(
        pending_timeout_secs = dlq_config.pending_timeout_secs,
        running_timeout_secs = dlq_config.running_timeout_secs,
        max_dispatch_attempts = dlq_config.max_dispatch_attempts,
        scan_interval_secs = dlq_config.reconciler_scan_interval_secs,
        "Starting submission reconciler"
    );

    let mut interval = tokio::time::interval(scan_interval);

    loop {
        interval.tick().await;

        if let Err(e) = reconcile_pending(&db, mq.as_deref(), &mq_config).await {
            error!(error = %e, "Pending submission scan failed");
        }
        if let Err(e) = reconcile_running(&db, &mq_config).await {
            error!(error = %e, "Running submission scan failed");
        }
    }
}

/// Find WAITING_FOR_EXECUTION submissions whose last dispatch is older
/// than the pending timeout and re-publish or dead-letter them.
async fn reconcile_pending(
    db: &DatabaseConnection,
    mq: Option<&mq::Mq>,
    mq_config: &MqAppConfig,
) -> anyhow::Result<()> {
    let threshold =
        Utc::now() - chrono::Duration::seconds(mq_config.dlq.pending_timeout_secs as i64);

    let stuck_ids: Vec<i64> = submission::Entity::find()
        .select_only()
        .column(submission::Column::Id)
        .filter(submission::Column::Status.eq(SubmissionStatus::WaitingForExecution))
        .filter(submission::Column::LastDispatchedAt.lt(threshold))
        .into_tuple()
        .all(db)
        .await?;

    if stuck_ids.is_empty() {
        return Ok(());
    }

    info!(count = stuck_ids.len(), "Found unconfirmed submissions");

    for submission_id in stuck_ids {
        if let Err(e) = reconcile_one_pending(db, mq, mq_config, submission_id).await {
            error!(submission_id, error = %e, "Failed to reconcile submission");
        }
    }

    Ok(())
}

async fn reconcile_one_pending(
    db: &DatabaseConnection,
    mq: Option<&mq::Mq>,
    mq_config: &MqAppConfig,
    submission_id: i64,
) -> anyhow::Result<()> {
    let threshold =
        Utc::now() - chrono::Duration::seconds(mq_config.dlq.pending_timeout_secs as i64);

    let txn = db.begin().await?;

    let Some(sub) = submission::Entity::find_by_id(submission_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
    else {
        txn.rollback().await?;
        return Ok(());
    };

    // Re-check under the lock: a listener may have advanced it meanwhile.
    if sub.status != SubmissionStatus::WaitingForExecution || sub.last_dispatched_at >= threshold {
        txn.rollback().await?;
        return Ok(());
    }

    let out_of_attempts = sub.dispatch_attempts >= mq_config.dlq.max_dispatch_attempts;
    let broker = if out_of_attempts { None } else { mq };

    let Some(broker) = broker else {
        let payload = serde_json::json!({
            "submissionId": sub.id,
            "problemId": sub.problem_id,
            "userId": sub.user_id,
            "language": sub.language,
            "dispatchAttempts": sub.dispatch_attempts,
        });

        let dlq = DlqService::new(&txn);
        dlq.create_entry(
            format!("dispatch-{}", sub.id),
            DlqMessageType::JudgeJob,
            Some(sub.id),
            payload,
            DlqErrorCode::StuckJob,
            format!(
                "Job not confirmed by a worker after {} dispatch attempts",
                sub.dispatch_attempts
            ),
        )
        .await?;

        mark_submission_system_error(
            &txn,
            sub.id,
            SubmissionDlqErrorCode::DISPATCH_EXHAUSTED,
            "Job was never picked up by a worker",
        )
        .await?;

        txn.commit().await?;

        warn!(submission_id, "Dead-lettered undispatchable submission");
        return Ok(());
    };

    // Bookkeeping commits before the publish so the row always precedes
    // the message, exactly like the original submit path.
    submission::Entity::update_many()
        .col_expr(
            submission::Column::DispatchAttempts,
            Expr::col(submission::Column::DispatchAttempts).add(1),
        )
        .col_expr(
            submission::Column::LastDispatchedAt,
            Expr::value(Utc::now()),
        )
        .filter(submission::Column::Id.eq(sub.id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    let job = publisher::build_judge_job(db, &sub)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to rebuild judge job: {e:?}"))?;

    match publisher::publish_job(broker, &mq_config.queue_name, &job).await {
        Ok(()) => info!(
            submission_id,
            attempt = sub.dispatch_attempts + 1,
            "Re-published judge job"
        ),
        // Attempt is already counted; the next scan decides again.
        Err(e) => warn!(submission_id, error = %e, "Re-publish failed"),
    }

    Ok(())
}

/// Dead-letter RUNNING submissions whose worker is presumed lost.
async fn reconcile_running(db: &DatabaseConnection, mq_config: &MqAppConfig) -> anyhow::Result<()> {
    let threshold =
        Utc::now() - chrono::Duration::seconds(mq_config.dlq.running_timeout_secs as i64);

    let stuck_ids: Vec<i64> = submission::Entity::find()
        .select_only()
        .column(submission::Column::Id)
        .filter(submission::Column::Status.eq(SubmissionStatus::Running))
        .filter(submission::Column::LastDispatchedAt.lt(threshold))
        .into_tuple()
        .all(db)
        .await?;

    if stuck_ids.is_empty() {
        return Ok(());
    }

    info!(count = stuck_ids.len(), "Found lost running submissions");

    for submission_id in stuck_ids {
        if let Err(e) = dead_letter_running(db, mq_config, submission_id).await {
            error!(submission_id, error = %e, "Failed to dead-letter running submission");
        }
    }

    Ok(())
}

async fn dead_letter_running(
    db: &DatabaseConnection,
    mq_config: &MqAppConfig,
    submission_id: i64,
) -> anyhow::Result<()> {
    let threshold =
        Utc::now() - chrono::Duration::seconds(mq_config.dlq.running_timeout_secs as i64);

    let txn = db.begin().await?;

    let Some(sub) = submission::Entity::find_by_id(submission_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
    else {
        txn.rollback().await?;
        return Ok(());
    };

    if sub.status != SubmissionStatus::Running || sub.last_dispatched_at >= threshold {
        txn.rollback().await?;
        return Ok(());
    }

    let payload = serde_json::json!({
        "submissionId": sub.id,
        "problemId": sub.problem_id,
        "userId": sub.user_id,
        "language": sub.language,
    });

    let dlq = DlqService::new(&txn);
    dlq.create_entry(
        format!("stuck-running-{}", sub.id),
        DlqMessageType::JudgeJob,
        Some(sub.id),
        payload,
        DlqErrorCode::StuckJob,
        format!(
            "Submission stuck in RUNNING for over {} seconds",
            mq_config.dlq.running_timeout_secs
        ),
    )
    .await?;

    mark_submission_system_error(
        &txn,
        sub.id,
        SubmissionDlqErrorCode::STUCK_JOB,
        "Worker never reported a result",
    )
    .await?;

    txn.commit().await?;

    warn!(submission_id, "Dead-lettered lost running submission");

    Ok(())
}
