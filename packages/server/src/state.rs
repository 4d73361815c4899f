use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DatabaseConnection,
    /// `None` when MQ is disabled: submissions are accepted but stay in
    /// WAITING_FOR_EXECUTION until the reconciler dead-letters them.
    pub mq: Option<Arc<mq::Mq>>,
}
