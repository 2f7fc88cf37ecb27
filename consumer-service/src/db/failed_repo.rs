//! Failed store: every failed processing attempt is retained as its own row.

use sqlx::PgPool;

use crate::models::FailedMessage;

const COLUMNS: &str = r#"
    id, message_id, consumer_group, topic, payload, error_message, failed_at,
    retry_count, producer_service_id, producer_instance_id,
    consumer_service_id, consumer_instance_id, idempotency_key
"#;

pub async fn insert_failure(pool: &PgPool, failure: &FailedMessage) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO failed_messages (
            id, message_id, consumer_group, topic, payload, error_message,
            failed_at, retry_count, producer_service_id, producer_instance_id,
            consumer_service_id, consumer_instance_id, idempotency_key
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(failure.id)
    .bind(failure.message_id)
    .bind(&failure.consumer_group)
    .bind(&failure.topic)
    .bind(&failure.payload)
    .bind(&failure.error_message)
    .bind(failure.failed_at)
    .bind(failure.retry_count)
    .bind(&failure.producer_service_id)
    .bind(&failure.producer_instance_id)
    .bind(&failure.consumer_service_id)
    .bind(&failure.consumer_instance_id)
    .bind(&failure.idempotency_key)
    .execute(pool)
    .await?;

    Ok(())
}

/// Recent failures for a group, newest first.
pub async fn list_by_group(
    pool: &PgPool,
    consumer_group: &str,
    limit: i64,
) -> Result<Vec<FailedMessage>, sqlx::Error> {
    sqlx::query_as::<_, FailedMessage>(&format!(
        r#"
        SELECT {COLUMNS} FROM failed_messages
        WHERE consumer_group = $1
        ORDER BY failed_at DESC
        LIMIT $2
        "#
    ))
    .bind(consumer_group)
    .bind(limit)
    .fetch_all(pool)
    .await
}
