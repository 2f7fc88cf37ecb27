use std::sync::Arc;

use kafka_broker::MessagePublisher;
use sqlx::PgPool;

use crate::config::Config;
use crate::metrics::OutboxMetrics;
use crate::services::batch_queue::BatchQueue;

/// Shared application state handed to handlers and background jobs.
///
/// Everything here is cheap to clone; the only mutable pieces are the
/// batching queue and the metrics, both designed for concurrent access.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub publisher: Arc<dyn MessagePublisher>,
    pub batch_queue: Arc<BatchQueue>,
    pub metrics: OutboxMetrics,
}
