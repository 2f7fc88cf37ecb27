//! Retention sweep: delete terminal records past the retention window.

use chrono::{Duration, Utc};
use sqlx::PgPool;

use crate::db::outbox_repo;

/// Delete Acknowledged/Failed/Expired records older than `retention_days`.
/// Live records are never touched regardless of age.
pub async fn run_cleanup_tick(pool: &PgPool, retention_days: i64) -> Result<u64, sqlx::Error> {
    let cutoff = Utc::now() - Duration::days(retention_days);
    let deleted = outbox_repo::cleanup_terminal(pool, cutoff).await?;

    if deleted > 0 {
        tracing::info!(
            deleted,
            retention_days,
            "Cleaned up terminal outbox records"
        );
    } else {
        tracing::debug!("No terminal records past retention");
    }

    Ok(deleted)
}
