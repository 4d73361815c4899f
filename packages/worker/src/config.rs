use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use common::config::MqAppConfig;

/// Worker-specific configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    /// Unique identifier for this worker instance. Default: "worker-1".
    #[serde(default = "default_worker_id")]
    pub id: String,
    /// Concurrent consumer slots in this process. Each slot holds at most
    /// one unacknowledged job, bounding the blast radius of a crash to
    /// one in-flight submission per slot. Default: 1.
    #[serde(default = "default_slots")]
    pub slots: usize,
}

fn default_worker_id() -> String {
    "worker-1".into()
}
fn default_slots() -> usize {
    1
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            id: default_worker_id(),
            slots: default_slots(),
        }
    }
}

/// Worker application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerAppConfig {
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub mq: MqAppConfig,
}

impl WorkerAppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("GAVEL_CONFIG").unwrap_or_else(|_| "config/config".to_string());

        let s = Config::builder()
            .set_default("worker.id", "worker-1")?
            .set_default("worker.slots", 1_i64)?
            .set_default("mq.url", "redis://localhost:6379")?
            .set_default("mq.pool_size", 5_i64)?
            .add_source(File::with_name(&config_path).required(false))
            .add_source(Environment::with_prefix("GAVEL").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
