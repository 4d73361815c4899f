use chrono::Utc;
use common::{DlqEnvelope, DlqErrorCode, DlqMessageType};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, NotSet, Set};

use crate::entity::dead_letter_message;

/// Persists dead-letter envelopes for operator review.
///
/// Inserts are keyed by the unique message id and ignore conflicts, so a
/// redelivered DLQ message never produces a second entry.
pub struct DlqService<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> DlqService<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Persist a failed message envelope.
    pub async fn send_to_dlq(&self, envelope: &DlqEnvelope) -> Result<(), DbErr> {
        let first_failed_at = envelope
            .retry_history
            .first()
            .map(|r| r.timestamp)
            .unwrap_or_else(Utc::now);

        let model = dead_letter_message::ActiveModel {
            id: NotSet,
            message_id: Set(envelope.message_id.clone()),
            message_type: Set(envelope.message_type.to_string()),
            submission_id: Set(envelope.submission_id),
            payload: Set(envelope.payload.clone()),
            error_message: Set(envelope.error_message.clone()),
            error_code: Set(envelope.error_code.to_string()),
            retry_count: Set(envelope.retry_history.len() as i32),
            retry_history: Set(serde_json::to_value(&envelope.retry_history).unwrap_or_default()),
            first_failed_at: Set(first_failed_at),
            created_at: Set(Utc::now()),
            resolved: Set(false),
            resolved_at: Set(None),
        };

        self.insert_entry(model).await
    }

    /// Create a DLQ entry directly from components (reconciler path,
    /// where no broker envelope exists).
    pub async fn create_entry(
        &self,
        message_id: String,
        message_type: DlqMessageType,
        submission_id: Option<i64>,
        payload: serde_json::Value,
        error_code: DlqErrorCode,
        error_message: String,
    ) -> Result<(), DbErr> {
        let now = Utc::now();
        let model = dead_letter_message::ActiveModel {
            id: NotSet,
            message_id: Set(message_id),
            message_type: Set(message_type.to_string()),
            submission_id: Set(submission_id),
            payload: Set(payload),
            error_message: Set(error_message),
            error_code: Set(error_code.to_string()),
            retry_count: Set(0),
            retry_history: Set(serde_json::Value::Array(vec![])),
            first_failed_at: Set(now),
            created_at: Set(now),
            resolved: Set(false),
            resolved_at: Set(None),
        };

        self.insert_entry(model).await
    }

    async fn insert_entry(&self, model: dead_letter_message::ActiveModel) -> Result<(), DbErr> {
        dead_letter_message::Entity::insert(model)
            .on_conflict(
                OnConflict::column(dead_letter_message::Column::MessageId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.conn)
            .await?;
        Ok(())
    }
}
