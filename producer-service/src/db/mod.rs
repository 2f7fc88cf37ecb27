pub mod ack_repo;
pub mod agent_repo;
pub mod outbox_repo;
pub mod topic_repo;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Pool, Postgres};

pub async fn init_pool(database_url: &str) -> Result<Pool<Postgres>, sqlx::Error> {
    let pool: PgPool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}
