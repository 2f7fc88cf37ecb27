use sqlx::{Executor, Pool, Postgres};

// Embed SQL migrations at compile time for deterministic startup
const MIG_0001: &str = include_str!("../migrations/0001_create_types.sql");
const MIG_0002: &str = include_str!("../migrations/0002_create_topic_registry.sql");
const MIG_0003: &str = include_str!("../migrations/0003_create_outbox_records.sql");
const MIG_0004: &str = include_str!("../migrations/0004_create_agents.sql");
const MIG_0005: &str = include_str!("../migrations/0005_create_acknowledgments.sql");

/// Apply the embedded schema. Every statement is idempotent, so re-runs are
/// safe; a hard failure here must abort startup.
pub async fn run_all(db: &Pool<Postgres>) -> Result<(), sqlx::Error> {
    for (i, sql) in [MIG_0001, MIG_0002, MIG_0003, MIG_0004, MIG_0005]
        .into_iter()
        .enumerate()
    {
        let label = i + 1;
        // Multi-statement scripts go through the simple query protocol
        db.execute(sql).await?;
        tracing::info!(migration = %label, "producer-service migration applied");
    }
    Ok(())
}
