use serde::{Deserialize, Serialize};

use crate::submission_status::SubmissionStatus;

/// Interim status transition published by a worker while it holds a job.
///
/// Published before any execution work begins, so the API-visible state
/// reflects "picked up" even when judging is slow.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub submission_id: i64,
    pub status: SubmissionStatus,
}

impl StatusUpdate {
    /// The update a worker publishes immediately after claiming a job.
    pub fn running(submission_id: i64) -> Self {
        Self {
            submission_id,
            status: SubmissionStatus::Running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let update = StatusUpdate::running(7);
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["submissionId"], 7);
        assert_eq!(value["status"], "RUNNING");
    }
}
