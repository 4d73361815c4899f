mod config;
mod handlers;
mod models;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::judge_job::JudgeJob;
use common::retry::{
    RetryCleanupGuard, RetryDecision, RetryTracker, calculate_backoff, spawn_cleanup_task,
};
use common::status_update::StatusUpdate;
use common::{DlqConfig, DlqEnvelope, DlqErrorCode, DlqMessageType};
use handlers::judge::handle_judge_job;
use mq::{BroccoliError, BrokerMessage, MqConfig, init_mq};
use models::executor::ExecutionEngine;
use models::local::LocalEngine;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Everything a consumer slot needs besides the job itself.
struct JobContext {
    mq: Arc<mq::Mq>,
    engine: Arc<dyn ExecutionEngine>,
    status_queue: String,
    result_queue: String,
    dlq_queue: String,
    dlq_config: DlqConfig,
    retry_tracker: Arc<Mutex<RetryTracker>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = config::WorkerAppConfig::load().context("Failed to load config")?;
    info!("Worker starting: {}", config.worker.id);

    let mq = Arc::new(
        init_mq(MqConfig {
            url: config.mq.url.clone(),
            pool_size: config.mq.pool_size,
        })
        .await
        .context("Failed to initialize MQ")?,
    );

    info!(
        queue_name = %config.mq.queue_name,
        status_queue_name = %config.mq.status_queue_name,
        result_queue_name = %config.mq.result_queue_name,
        dlq_queue_name = %config.mq.dlq_queue_name,
        slots = config.worker.slots,
        max_retries = config.mq.dlq.max_retries,
        "MQ connected"
    );

    let retry_tracker = Arc::new(Mutex::new(RetryTracker::new(config.mq.dlq.max_retries)));

    // TODO: Store handle for graceful shutdown. Currently the task runs
    // until process exit.
    let _cleanup_handle = spawn_cleanup_task(
        retry_tracker.clone(),
        Duration::from_secs(config.mq.dlq.retry_cleanup_interval_secs),
        Duration::from_secs(config.mq.dlq.retry_max_age_secs),
    );

    let context = Arc::new(JobContext {
        mq: Arc::clone(&mq),
        engine: Arc::new(LocalEngine::new()),
        status_queue: config.mq.status_queue_name.clone(),
        result_queue: config.mq.result_queue_name.clone(),
        dlq_queue: config.mq.dlq_queue_name.clone(),
        dlq_config: config.mq.dlq.clone(),
        retry_tracker,
    });

    // One unacked job per slot: the handler must return (ack or reject)
    // before the slot fetches the next message.
    let result = mq
        .process_messages(
            &config.mq.queue_name,
            Some(config.worker.slots),
            None,
            move |message: BrokerMessage<serde_json::Value>| {
                let context = Arc::clone(&context);
                async move { process_message(message, &context).await }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Worker stopped unexpectedly");
    }

    Ok(())
}

async fn process_message(
    message: BrokerMessage<serde_json::Value>,
    ctx: &JobContext,
) -> Result<(), BroccoliError> {
    let job: JudgeJob = match serde_json::from_value(message.payload.clone()) {
        Ok(job) => job,
        Err(e) => {
            // Permanent: redelivering an unparseable payload can never
            // succeed, so dead-letter it and ack.
            error!(error = %e, "Failed to parse JudgeJob");

            let envelope = DlqEnvelope::deserialization_failure(
                DlqMessageType::JudgeJob,
                message.payload,
                e,
            );
            return publish_to_dlq(ctx, envelope).await;
        }
    };

    let submission_id = job.submission_id;
    let correlation = submission_id.to_string();

    info!(
        submission_id,
        test_cases = job.test_cases.len(),
        "Processing judge job"
    );

    // Interim status goes out before any execution work so the
    // API-visible state reflects "picked up". Best effort: a lost
    // RUNNING update costs nothing once the result lands.
    if let Err(e) = ctx
        .mq
        .publish(
            &ctx.status_queue,
            None,
            &StatusUpdate::running(submission_id),
            None,
        )
        .await
    {
        warn!(submission_id, error = %e, "Failed to publish RUNNING status");
    }

    // Judge exactly once; only result delivery is retried below.
    let result = handle_judge_job(ctx.engine.as_ref(), &job).await;

    let mut cleanup_guard = RetryCleanupGuard::new(&ctx.retry_tracker, &correlation);

    loop {
        match ctx
            .mq
            .publish(&ctx.result_queue, None, &result, None)
            .await
        {
            Ok(_) => {
                ctx.retry_tracker.lock().await.clear(&correlation);
                cleanup_guard.defuse();

                info!(
                    submission_id,
                    status = %result.status,
                    "Published judge result"
                );
                return Ok(());
            }
            Err(e) => {
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
                            submission_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Retrying result publish"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::Exhausted { history } => {
                        error!(
                            submission_id,
                            retry_count = history.len(),
                            error = %e,
                            "Result publish retries exhausted, dead-lettering"
                        );

                        let envelope = DlqEnvelope {
                            message_id: correlation.clone(),
                            message_type: DlqMessageType::JudgeResult,
                            submission_id: Some(submission_id),
                            payload: serde_json::to_value(&result).unwrap_or_default(),
                            error_code: DlqErrorCode::MaxRetriesExceeded,
                            error_message: error_str,
                            retry_history: history,
                        };

                        cleanup_guard.defuse();
                        return publish_to_dlq(ctx, envelope).await;
                    }
                }
            }
        }
    }
}

/// Dead-letter a message and ack the original delivery. If even the DLQ
/// publish fails, reject so the broker redelivers the job: a deliberate
/// nack, never a silent drop.
async fn publish_to_dlq(ctx: &JobContext, envelope: DlqEnvelope) -> Result<(), BroccoliError> {
    if let Err(e) = ctx.mq.publish(&ctx.dlq_queue, None, &envelope, None).await {
        error!(error = %e, "Failed to publish to DLQ");
        return Err(BroccoliError::Publish(format!(
            "Failed to publish to DLQ: {e}"
        )));
    }
    Ok(())
}
