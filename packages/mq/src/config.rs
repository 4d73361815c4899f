// Re-exported broker client options. Kept behind our own names so the
// rest of the workspace does not import broccoli_queue directly.

pub type PublishConfig = broccoli_queue::queue::PublishOptions;
pub type ConsumeConfig = broccoli_queue::queue::ConsumeOptions;
pub type RetryStrategy = broccoli_queue::queue::RetryStrategy;
