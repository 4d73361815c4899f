pub mod reconciler;
pub mod service;

pub use reconciler::run_reconciler;
pub use service::DlqService;
