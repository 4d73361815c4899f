use serde::Deserialize;

/// App-level MQ configuration shared by server and worker.
///
/// Queue names are effectively part of the protocol: producer and consumer
/// must agree on them, so both processes read them from the same defaults.
#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    /// Whether MQ is enabled. Default: true.
    /// Note: the worker ignores this field (it always requires MQ).
    #[serde(default = "default_mq_enabled")]
    pub enabled: bool,
    /// Redis connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_mq_url")]
    pub url: String,
    /// Connection pool size. Default: 5.
    #[serde(default = "default_mq_pool_size")]
    pub pool_size: u8,
    /// Judge jobs queue (server publishes, worker consumes). Default: "judge_jobs".
    #[serde(default = "default_mq_queue_name")]
    pub queue_name: String,
    /// Interim status queue (worker publishes, server consumes). Default: "judge_status".
    #[serde(default = "default_mq_status_queue_name")]
    pub status_queue_name: String,
    /// Result queue (worker publishes, server consumes). Default: "judge_results".
    #[serde(default = "default_mq_result_queue_name")]
    pub result_queue_name: String,
    /// Dead letter queue (either side publishes, server consumes). Default: "judge_dlq".
    #[serde(default = "default_mq_dlq_queue_name")]
    pub dlq_queue_name: String,
    /// Retry and dead-letter policy.
    #[serde(default)]
    pub dlq: DlqConfig,
}

fn default_mq_enabled() -> bool {
    true
}
fn default_mq_url() -> String {
    "redis://localhost:6379".into()
}
fn default_mq_pool_size() -> u8 {
    5
}
fn default_mq_queue_name() -> String {
    "judge_jobs".into()
}
fn default_mq_status_queue_name() -> String {
    "judge_status".into()
}
fn default_mq_result_queue_name() -> String {
    "judge_results".into()
}
fn default_mq_dlq_queue_name() -> String {
    "judge_dlq".into()
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            enabled: default_mq_enabled(),
            url: default_mq_url(),
            pool_size: default_mq_pool_size(),
            queue_name: default_mq_queue_name(),
            status_queue_name: default_mq_status_queue_name(),
            result_queue_name: default_mq_result_queue_name(),
            dlq_queue_name: default_mq_dlq_queue_name(),
            dlq: DlqConfig::default(),
        }
    }
}

/// Retry, reconciler and dead-letter policy.
#[derive(Debug, Deserialize, Clone)]
pub struct DlqConfig {
    /// In-process retries before a message is dead-lettered. Default: 3.
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    /// Base backoff delay between retries, in milliseconds. Default: 1000.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff cap, in milliseconds. Default: 30000.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// How often stale retry-tracker entries are swept, in seconds. Default: 300.
    #[serde(default = "default_retry_cleanup_interval_secs")]
    pub retry_cleanup_interval_secs: u64,
    /// Age after which an abandoned retry-tracker entry is dropped, in seconds. Default: 3600.
    #[serde(default = "default_retry_max_age_secs")]
    pub retry_max_age_secs: u64,
    /// How often the reconciler scans for stuck submissions, in seconds. Default: 60.
    #[serde(default = "default_reconciler_scan_interval_secs")]
    pub reconciler_scan_interval_secs: u64,
    /// Age after which a WAITING_FOR_EXECUTION submission is considered
    /// unconfirmed and its job is re-published, in seconds. Default: 300.
    #[serde(default = "default_pending_timeout_secs")]
    pub pending_timeout_secs: u64,
    /// Age after which a RUNNING submission is considered lost, in seconds.
    /// Default: 1800.
    #[serde(default = "default_running_timeout_secs")]
    pub running_timeout_secs: u64,
    /// Total publish attempts per submission (initial publish included)
    /// before the reconciler dead-letters it. Default: 3.
    #[serde(default = "default_max_dispatch_attempts")]
    pub max_dispatch_attempts: i32,
}

fn default_max_retries() -> u8 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30000
}
fn default_retry_cleanup_interval_secs() -> u64 {
    300
}
fn default_retry_max_age_secs() -> u64 {
    3600
}
fn default_reconciler_scan_interval_secs() -> u64 {
    60
}
fn default_pending_timeout_secs() -> u64 {
    300
}
fn default_running_timeout_secs() -> u64 {
    1800
}
fn default_max_dispatch_attempts() -> i32 {
    3
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            retry_cleanup_interval_secs: default_retry_cleanup_interval_secs(),
            retry_max_age_secs: default_retry_max_age_secs(),
            reconciler_scan_interval_secs: default_reconciler_scan_interval_secs(),
            pending_timeout_secs: default_pending_timeout_secs(),
            running_timeout_secs: default_running_timeout_secs(),
            max_dispatch_attempts: default_max_dispatch_attempts(),
        }
    }
}
