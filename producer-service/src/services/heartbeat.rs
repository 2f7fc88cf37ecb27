//! Self-heartbeat: refresh this producer's registry row, record a health
//! snapshot with the current queue depth, then trigger registry GC.

use chrono::Utc;
use message_schema::{HealthStatus, ServiceKind};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::db::{agent_repo, outbox_repo};
use crate::error::AppError;
use crate::metrics::OutboxMetrics;
use crate::models::agent::HealthCheckRecord;
use crate::services::registry;

pub async fn run_heartbeat_tick(
    pool: &PgPool,
    config: &Config,
    metrics: &OutboxMetrics,
) -> Result<(), AppError> {
    let started = std::time::Instant::now();
    let identity = &config.identity;

    // Queue depth feeds both the health snapshot and the exported gauges
    let stats = outbox_repo::stats(pool).await?;
    let own_pending = outbox_repo::pending_count(pool, &identity.service_id).await?;
    metrics.pending.set(stats.pending);
    metrics
        .oldest_pending_age_seconds
        .set(stats.oldest_pending_age_seconds);

    let touched = agent_repo::touch_heartbeat(pool, &identity.service_id, Utc::now()).await?;
    if !touched {
        tracing::warn!(
            service_id = %identity.service_id,
            "Heartbeat for unregistered agent; was startup registration lost?"
        );
    }

    let snapshot = HealthCheckRecord {
        id: Uuid::new_v4(),
        service_id: identity.service_id.clone(),
        instance_id: identity.instance_id.clone(),
        service_kind: ServiceKind::Producer,
        status: HealthStatus::Healthy,
        checked_at: Utc::now(),
        status_message: None,
        response_time_ms: started.elapsed().as_millis() as i64,
        health_data: Some(serde_json::json!({
            "pendingMessagesCount": own_pending,
            "oldestPendingAgeSeconds": stats.oldest_pending_age_seconds,
        })),
    };
    agent_repo::insert_health_check(pool, &snapshot).await?;

    registry::cleanup_inactive_agents(pool, config.agent_termination_secs).await?;

    tracing::debug!(
        pending = own_pending,
        "Heartbeat recorded"
    );

    Ok(())
}
