use broccoli_queue::queue::BroccoliQueueBuilder;
pub use broccoli_queue::{
    brokers::broker::BrokerMessage,
    error::BroccoliError,
    queue::{BroccoliQueue, ConsumeOptions},
};
use tracing::debug;

use crate::error::MqError;

pub type MqQueue = BroccoliQueue;
pub type MqBuilder = BroccoliQueueBuilder;

pub struct MqConfig {
    pub url: String,
    pub pool_size: u8,
}

/// Connect to the broker.
///
/// Queue declaration is idempotent in the broker client, so whichever
/// process starts first establishes the topology and no bootstrap
/// ordering exists between server and worker.
pub async fn init_mq(config: MqConfig) -> Result<MqQueue, MqError> {
    debug!(url = %config.url, pool_size = config.pool_size, "Connecting to broker");

    BroccoliQueue::builder(&config.url)
        .pool_connections(config.pool_size)
        .build()
        .await
        .map_err(MqError::from)
}
