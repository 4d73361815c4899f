use std::sync::Arc;

use common::{DlqEnvelope, DlqMessageType, SubmissionDlqErrorCode};
use mq::{BrokerMessage, Mq};
use sea_orm::{DatabaseConnection, TransactionTrait};
use tracing::{error, info, warn};

use super::mark_submission_system_error;
use crate::dlq::DlqService;

/// Consume dead-letter envelopes, persist them for operator review, and
/// give the referenced submission a terminal SYSTEM_ERROR so it is never
/// stuck in an interim status.
pub async fn consume_worker_dlq(db: DatabaseConnection, mq: Arc<Mq>, queue_name: String) {
    info!(queue = %queue_name, "Starting DLQ consumer");

    let result = mq
        .process_messages(
            &queue_name,
            None,
            None,
            move |message: BrokerMessage<DlqEnvelope>| {
                let db = db.clone();
                async move {
                    let envelope = message.payload;
                    let submission_id = envelope.submission_id;
                    let message_id = envelope.message_id.clone();

                    let txn = db.begin().await.map_err(|e| {
                        error!(error = %e, "Failed to begin DLQ transaction");
                        mq::BroccoliError::Job(format!("Transaction failed: {}", e))
                    })?;

                    let dlq = DlqService::new(&txn);
                    if let Err(e) = dlq.send_to_dlq(&envelope).await {
                        error!(
                            submission_id,
                            message_id = %message_id,
                            error = %e,
                            "Failed to persist DLQ envelope to database"
                        );
                        return Err(mq::BroccoliError::Job(format!(
                            "DB persistence failed: {}",
                            e
                        )));
                    }

                    txn.commit().await.map_err(|e| {
                        error!(error = %e, "Failed to commit DLQ entry");
                        mq::BroccoliError::Job(format!("Commit failed: {}", e))
                    })?;

                    if let Some(submission_id) = submission_id {
                        let error_code = submission_error_code(envelope.message_type);
                        match mark_submission_system_error(
                            &db,
                            submission_id,
                            error_code,
                            &envelope.error_message,
                        )
                        .await
                        {
                            Ok(0) => info!(
                                submission_id,
                                "Submission already carries a final verdict, leaving it untouched"
                            ),
                            Ok(_) => {}
                            Err(e) => warn!(
                                submission_id,
                                error = %e,
                                "Failed to mark submission as SYSTEM_ERROR \
                                 (DLQ entry persisted, submission may need manual review)"
                            ),
                        }
                    } else {
                        info!(
                            message_id = %message_id,
                            "Skipping submission status update: submission_id unknown"
                        );
                    }

                    info!(
                        submission_id,
                        message_id = %message_id,
                        error_code = ?envelope.error_code,
                        "Persisted DLQ envelope"
                    );

                    Ok(())
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "DLQ consumer stopped unexpectedly");
    }
}

fn submission_error_code(message_type: DlqMessageType) -> &'static str {
    match message_type {
        DlqMessageType::JudgeJob => SubmissionDlqErrorCode::WORKER_PROCESSING_FAILED,
        DlqMessageType::StatusUpdate => SubmissionDlqErrorCode::STATUS_PROCESSING_FAILED,
        DlqMessageType::JudgeResult => SubmissionDlqErrorCode::RESULT_PROCESSING_FAILED,
    }
}
