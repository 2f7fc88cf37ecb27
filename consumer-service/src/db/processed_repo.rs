//! Processed store: the idempotency record of successful outcomes.

use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::ProcessedMessage;

const COLUMNS: &str = r#"
    message_id, consumer_group, topic, processed_at, payload,
    producer_service_id, producer_instance_id, consumer_service_id,
    consumer_instance_id, idempotency_key
"#;

/// O(1) duplicate check on the composite primary key.
pub async fn is_processed(
    pool: &PgPool,
    message_id: Uuid,
    consumer_group: &str,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM processed_messages
            WHERE message_id = $1 AND consumer_group = $2
        ) AS exists
        "#,
    )
    .bind(message_id)
    .bind(consumer_group)
    .fetch_one(pool)
    .await?;

    row.try_get("exists")
}

/// Insert the outcome row. `ON CONFLICT DO NOTHING` makes a concurrent
/// duplicate insert an idempotent success; returns whether this call won the
/// race.
pub async fn mark_processed(
    pool: &PgPool,
    message: &ProcessedMessage,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO processed_messages (
            message_id, consumer_group, topic, processed_at, payload,
            producer_service_id, producer_instance_id, consumer_service_id,
            consumer_instance_id, idempotency_key
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (message_id, consumer_group) DO NOTHING
        "#,
    )
    .bind(message.message_id)
    .bind(&message.consumer_group)
    .bind(&message.topic)
    .bind(message.processed_at)
    .bind(&message.payload)
    .bind(&message.producer_service_id)
    .bind(&message.producer_instance_id)
    .bind(&message.consumer_service_id)
    .bind(&message.consumer_instance_id)
    .bind(&message.idempotency_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Recent outcomes for a group, newest first.
pub async fn list_by_group(
    pool: &PgPool,
    consumer_group: &str,
    limit: i64,
) -> Result<Vec<ProcessedMessage>, sqlx::Error> {
    sqlx::query_as::<_, ProcessedMessage>(&format!(
        r#"
        SELECT {COLUMNS} FROM processed_messages
        WHERE consumer_group = $1
        ORDER BY processed_at DESC
        LIMIT $2
        "#
    ))
    .bind(consumer_group)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn count_by_group(pool: &PgPool, consumer_group: &str) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM processed_messages WHERE consumer_group = $1",
    )
    .bind(consumer_group)
    .fetch_one(pool)
    .await?;

    row.try_get("count")
}
