use sqlx::{Executor, Pool, Postgres};

// Embed SQL migrations at compile time for deterministic startup
const MIG_0001: &str = include_str!("../migrations/0001_create_processed_messages.sql");
const MIG_0002: &str = include_str!("../migrations/0002_create_failed_messages.sql");

/// Apply the embedded schema. Idempotent; a hard failure aborts startup.
pub async fn run_all(db: &Pool<Postgres>) -> Result<(), sqlx::Error> {
    for (i, sql) in [MIG_0001, MIG_0002].into_iter().enumerate() {
        let label = i + 1;
        db.execute(sql).await?;
        tracing::info!(migration = %label, "consumer-service migration applied");
    }
    Ok(())
}
