#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a submission during the judging lifecycle.
///
/// The same enumeration is used at submission granularity and at
/// per-test-case granularity. The SCREAMING_SNAKE_CASE literals are part
/// of the wire protocol shared with the worker fleet and must not be
/// renamed without a protocol version bump.
///
/// When the `sea-orm` feature is enabled, this enum can be used directly
/// in SeaORM entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    /// Row committed, job not yet picked up by a worker.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "WAITING_FOR_EXECUTION"))]
    WaitingForExecution,
    /// A worker has claimed the job and is executing test cases.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "RUNNING"))]
    Running,
    /// All test cases passed.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "PASSED"))]
    Passed,
    /// Output did not match the expected output.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "WRONG_ANSWER"))]
    WrongAnswer,
    /// Exceeded the time limit.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "TIME_LIMIT_EXCEEDED"))]
    TimeLimitExceeded,
    /// Exceeded the memory limit.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "MEMORY_LIMIT_EXCEEDED"))]
    MemoryLimitExceeded,
    /// Failed to compile.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "COMPILATION_ERROR"))]
    CompilationError,
    /// Program crashed or exited with a non-zero code.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "RUNTIME_ERROR"))]
    RuntimeError,
    /// The pipeline itself failed on this submission (dead-lettered job,
    /// judge-internal error). Terminal, so no submission is ever silently
    /// stuck in an interim state.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "SYSTEM_ERROR"))]
    SystemError,
}

impl SubmissionStatus {
    /// Returns true if this is a terminal verdict (judging is complete).
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::WaitingForExecution | Self::Running)
    }

    /// Whether moving from `self` to `next` advances the state machine.
    ///
    /// The status of a submission is monotonic: `WAITING_FOR_EXECUTION`
    /// may move to `RUNNING` or directly to any terminal status (the
    /// dead-letter path never passes through `RUNNING`), `RUNNING` may
    /// only move to a terminal status, and terminal statuses absorb.
    /// A redelivered `RUNNING` arriving after the final result must not
    /// regress the submission.
    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        match self {
            Self::WaitingForExecution => next != Self::WaitingForExecution,
            Self::Running => next.is_final(),
            _ => false,
        }
    }

    /// All possible status values.
    pub const ALL: &'static [SubmissionStatus] = &[
        Self::WaitingForExecution,
        Self::Running,
        Self::Passed,
        Self::WrongAnswer,
        Self::TimeLimitExceeded,
        Self::MemoryLimitExceeded,
        Self::CompilationError,
        Self::RuntimeError,
        Self::SystemError,
    ];

    /// Returns the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitingForExecution => "WAITING_FOR_EXECUTION",
            Self::Running => "RUNNING",
            Self::Passed => "PASSED",
            Self::WrongAnswer => "WRONG_ANSWER",
            Self::TimeLimitExceeded => "TIME_LIMIT_EXCEEDED",
            Self::MemoryLimitExceeded => "MEMORY_LIMIT_EXCEEDED",
            Self::CompilationError => "COMPILATION_ERROR",
            Self::RuntimeError => "RUNTIME_ERROR",
            Self::SystemError => "SYSTEM_ERROR",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for SubmissionStatus {
    fn default() -> Self {
        Self::WaitingForExecution
    }
}

/// Error when parsing an invalid status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError {
    invalid: String,
}

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid status '{}'. Valid values: {}",
            self.invalid,
            SubmissionStatus::ALL
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for SubmissionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubmissionStatus::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| ParseStatusError {
                invalid: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_literals() {
        assert_eq!(
            serde_json::to_string(&SubmissionStatus::WaitingForExecution).unwrap(),
            "\"WAITING_FOR_EXECUTION\""
        );
        assert_eq!(
            serde_json::to_string(&SubmissionStatus::TimeLimitExceeded).unwrap(),
            "\"TIME_LIMIT_EXCEEDED\""
        );
        assert_eq!(
            serde_json::to_string(&SubmissionStatus::WrongAnswer).unwrap(),
            "\"WRONG_ANSWER\""
        );
    }

    #[test]
    fn test_serde_roundtrip() {
        for status in SubmissionStatus::ALL {
            let json = serde_json::to_string(status).unwrap();
            let parsed: SubmissionStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(*status, parsed);
        }
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            "PASSED".parse::<SubmissionStatus>().unwrap(),
            SubmissionStatus::Passed
        );
        assert!("Passed".parse::<SubmissionStatus>().is_err());
    }

    #[test]
    fn test_is_final() {
        assert!(!SubmissionStatus::WaitingForExecution.is_final());
        assert!(!SubmissionStatus::Running.is_final());
        assert!(SubmissionStatus::Passed.is_final());
        assert!(SubmissionStatus::SystemError.is_final());
    }

    #[test]
    fn test_transitions_advance() {
        use SubmissionStatus::*;

        assert!(WaitingForExecution.can_transition_to(Running));
        assert!(WaitingForExecution.can_transition_to(SystemError));
        assert!(Running.can_transition_to(Passed));
        assert!(Running.can_transition_to(TimeLimitExceeded));
    }

    #[test]
    fn test_final_statuses_absorb() {
        use SubmissionStatus::*;

        for terminal in [Passed, WrongAnswer, CompilationError, SystemError] {
            for next in SubmissionStatus::ALL {
                assert!(
                    !terminal.can_transition_to(*next),
                    "{terminal} must not transition to {next}"
                );
            }
        }
        // A late RUNNING must never regress a running submission either.
        assert!(!Running.can_transition_to(Running));
        assert!(!Running.can_transition_to(WaitingForExecution));
    }
}
