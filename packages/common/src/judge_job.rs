use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::language::Language;

/// Test case data carried inside a judge job.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseData {
    /// Test case ID
    pub test_case_id: Uuid,
    /// Input data to feed to the program
    pub input: String,
    /// Expected output for comparison
    pub expected_output: String,
}

/// A judge job message sent to the worker queue.
///
/// Self-sufficient by design: it carries the source, the limits and every
/// test case, so a worker never has to call back into the datastore.
/// Field names are part of the wire protocol.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeJob {
    /// ID of the submission being judged. Doubles as the correlation
    /// token for publishes, retries and dead-letter entries.
    pub submission_id: i64,
    pub language: Language,
    /// Base64-encoded source code, so the message stays a single
    /// JSON-safe string payload.
    pub code: String,
    /// Time limit in seconds.
    pub time_limit: f64,
    /// Memory limit in megabytes.
    pub memory_limit: i64,
    /// Test cases to run, in judging order.
    pub test_cases: Vec<TestCaseData>,
}

impl JudgeJob {
    pub fn new(
        submission_id: i64,
        language: Language,
        source: &str,
        time_limit: f64,
        memory_limit: i64,
        test_cases: Vec<TestCaseData>,
    ) -> Self {
        Self {
            submission_id,
            language,
            code: encode_source(source),
            time_limit,
            memory_limit,
            test_cases,
        }
    }

    /// Decode the base64 source back to text.
    pub fn decode_source(&self) -> Result<String, SourceDecodeError> {
        decode_source(&self.code)
    }
}

/// Encode source text for transport.
pub fn encode_source(source: &str) -> String {
    BASE64.encode(source.as_bytes())
}

/// Decode transported source back to text.
pub fn decode_source(code: &str) -> Result<String, SourceDecodeError> {
    let bytes = BASE64.decode(code)?;
    Ok(String::from_utf8(bytes)?)
}

#[derive(Debug, thiserror::Error)]
pub enum SourceDecodeError {
    #[error("Invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Source is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> JudgeJob {
        JudgeJob::new(
            42,
            Language::Cpp,
            "int main() { return 0; }",
            2.0,
            256,
            vec![TestCaseData {
                test_case_id: Uuid::parse_str("9e0f2f2e-72ab-4bfe-a3ac-44f38bb0ef7a").unwrap(),
                input: "1 2".into(),
                expected_output: "3".into(),
            }],
        )
    }

    #[test]
    fn test_source_roundtrip() {
        let job = sample_job();
        assert_eq!(job.decode_source().unwrap(), "int main() { return 0; }");
    }

    #[test]
    fn test_decode_rejects_invalid_base64() {
        assert!(decode_source("not base64!!").is_err());
    }

    /// The serialized field names are a protocol contract shared with the
    /// server process. Renames require a version bump.
    #[test]
    fn test_wire_format() {
        let job = sample_job();
        let value = serde_json::to_value(&job).unwrap();

        assert_eq!(value["submissionId"], 42);
        assert_eq!(value["language"], "CPP");
        assert_eq!(value["code"], encode_source("int main() { return 0; }"));
        assert_eq!(value["timeLimit"], 2.0);
        assert_eq!(value["memoryLimit"], 256);
        assert_eq!(
            value["testCases"][0]["testCaseId"],
            "9e0f2f2e-72ab-4bfe-a3ac-44f38bb0ef7a"
        );
        assert_eq!(value["testCases"][0]["input"], "1 2");
        assert_eq!(value["testCases"][0]["expectedOutput"], "3");
    }

    #[test]
    fn test_wire_roundtrip() {
        let job = sample_job();
        let json = serde_json::to_string(&job).unwrap();
        let parsed: JudgeJob = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.submission_id, job.submission_id);
        assert_eq!(parsed.test_cases.len(), 1);
        assert_eq!(parsed.decode_source().unwrap(), job.decode_source().unwrap());
    }
}
