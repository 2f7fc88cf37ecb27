use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::metrics::ConsumerMetrics;
use crate::services::handler::MessageHandler;

/// Shared application state for the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub handler: Arc<dyn MessageHandler>,
    pub metrics: ConsumerMetrics,
}
