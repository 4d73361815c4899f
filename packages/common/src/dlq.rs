use serde::{Deserialize, Serialize};

use crate::retry::RetryAttempt;

/// Error codes written onto submissions when pipeline processing fails.
pub struct SubmissionDlqErrorCode;

impl SubmissionDlqErrorCode {
    /// Worker failed to process a judge job after exhausting retries.
    pub const WORKER_PROCESSING_FAILED: &'static str = "WORKER_PROCESSING_FAILED";
    /// Server failed to apply a judge result after exhausting retries.
    pub const RESULT_PROCESSING_FAILED: &'static str = "RESULT_PROCESSING_FAILED";
    /// Server failed to apply a status update after exhausting retries.
    pub const STATUS_PROCESSING_FAILED: &'static str = "STATUS_PROCESSING_FAILED";
    /// Job never confirmed by a worker and re-publish attempts ran out.
    pub const DISPATCH_EXHAUSTED: &'static str = "DISPATCH_EXHAUSTED";
    /// Submission stuck in RUNNING past the timeout; the worker is presumed lost.
    pub const STUCK_JOB: &'static str = "STUCK_JOB";
}

/// Error codes for dead-lettered messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DlqErrorCode {
    /// All retry attempts exhausted.
    MaxRetriesExceeded,
    /// Failed to deserialize the message payload.
    DeserializationError,
    /// Message referenced a submission that does not exist.
    SubmissionNotFound,
    /// Submission stuck in an interim status for too long.
    StuckJob,
}

impl DlqErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            Self::DeserializationError => "DESERIALIZATION_ERROR",
            Self::SubmissionNotFound => "SUBMISSION_NOT_FOUND",
            Self::StuckJob => "STUCK_JOB",
        }
    }
}

impl std::fmt::Display for DlqErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which wire message a dead-lettered payload was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqMessageType {
    /// Failed judge job (server -> worker message)
    JudgeJob,
    /// Failed status update (worker -> server message)
    StatusUpdate,
    /// Failed judge result (worker -> server message)
    JudgeResult,
}

impl DlqMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JudgeJob => "judge_job",
            Self::StatusUpdate => "status_update",
            Self::JudgeResult => "judge_result",
        }
    }
}

impl std::fmt::Display for DlqMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DlqMessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "judge_job" => Ok(Self::JudgeJob),
            "status_update" => Ok(Self::StatusUpdate),
            "judge_result" => Ok(Self::JudgeResult),
            _ => Err(format!(
                "Invalid message_type '{}'. Must be 'judge_job', 'status_update' or 'judge_result'",
                s
            )),
        }
    }
}

/// Envelope for transporting failed messages to the DLQ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEnvelope {
    /// Correlation token of the original message (the submission id as a
    /// string, or a synthetic id when the payload was unparseable).
    pub message_id: String,
    /// Type of message that failed.
    pub message_type: DlqMessageType,
    /// Associated submission ID.
    ///
    /// `None` when the submission ID cannot be determined
    /// (e.g., deserialization failed before extracting it).
    pub submission_id: Option<i64>,
    /// Full serialized message payload.
    pub payload: serde_json::Value,
    /// Machine-readable error code.
    pub error_code: DlqErrorCode,
    /// Human-readable error message.
    pub error_message: String,
    /// History of retry attempts before reaching the DLQ.
    pub retry_history: Vec<RetryAttempt>,
}

impl DlqEnvelope {
    /// Envelope for a payload that could not be deserialized at all.
    pub fn deserialization_failure(
        message_type: DlqMessageType,
        payload: serde_json::Value,
        error: impl std::fmt::Display,
    ) -> Self {
        // Best effort: the raw JSON may still carry the submission id.
        let submission_id = payload.get("submissionId").and_then(|v| v.as_i64());
        let message_id = submission_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| format!("unparseable-{}", message_type));

        Self {
            message_id,
            message_type,
            submission_id,
            payload,
            error_code: DlqErrorCode::DeserializationError,
            error_message: error.to_string(),
            retry_history: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialization_failure_extracts_submission_id() {
        let payload = serde_json::json!({ "submissionId": 42, "status": "NOT_A_STATUS" });
        let envelope = DlqEnvelope::deserialization_failure(
            DlqMessageType::StatusUpdate,
            payload,
            "unknown variant",
        );

        assert_eq!(envelope.submission_id, Some(42));
        assert_eq!(envelope.message_id, "42");
        assert_eq!(envelope.error_code, DlqErrorCode::DeserializationError);
    }

    #[test]
    fn test_deserialization_failure_without_submission_id() {
        let envelope = DlqEnvelope::deserialization_failure(
            DlqMessageType::JudgeResult,
            serde_json::json!("garbage"),
            "expected object",
        );

        assert_eq!(envelope.submission_id, None);
        assert_eq!(envelope.message_id, "unparseable-judge_result");
    }
}
