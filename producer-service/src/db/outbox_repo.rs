//! Outbox store: the durable queue of record.
//!
//! All status transitions are guarded by a `WHERE status = ...` clause so a
//! terminal record can never be mutated by a late-arriving job tick
//! (`rows_affected == 0` means the guard rejected the transition).

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{OutboxRecord, OutboxStats};

const SELECT_COLUMNS: &str = r#"
    id, topic, consumer_group, payload, status, created_at, processed_at,
    last_retry_at, scheduled_retry_at, retry_count, error_message,
    producer_service_id, producer_instance_id, is_retry, original_message_id,
    target_consumer_service_id, idempotency_key, topic_registration_id
"#;

async fn insert_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    record: &OutboxRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO outbox_records (
            id, topic, consumer_group, payload, status, created_at,
            processed_at, last_retry_at, scheduled_retry_at, retry_count,
            error_message, producer_service_id, producer_instance_id,
            is_retry, original_message_id, target_consumer_service_id,
            idempotency_key, topic_registration_id
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                  $11, $12, $13, $14, $15, $16, $17, $18)
        "#,
    )
    .bind(record.id)
    .bind(&record.topic)
    .bind(&record.consumer_group)
    .bind(&record.payload)
    .bind(record.status)
    .bind(record.created_at)
    .bind(record.processed_at)
    .bind(record.last_retry_at)
    .bind(record.scheduled_retry_at)
    .bind(record.retry_count)
    .bind(&record.error_message)
    .bind(&record.producer_service_id)
    .bind(&record.producer_instance_id)
    .bind(record.is_retry)
    .bind(record.original_message_id)
    .bind(&record.target_consumer_service_id)
    .bind(&record.idempotency_key)
    .bind(record.topic_registration_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Bulk insert in a single transaction; either the whole batch lands or
/// nothing does (the batching intake re-queues on failure).
pub async fn insert_records(pool: &PgPool, records: &[OutboxRecord]) -> Result<(), sqlx::Error> {
    if records.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for record in records {
        insert_in_tx(&mut tx, record).await?;
    }
    tx.commit().await?;

    tracing::debug!(count = records.len(), "Outbox records inserted");
    Ok(())
}

pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<OutboxRecord>, sqlx::Error> {
    sqlx::query_as::<_, OutboxRecord>(&format!(
        "SELECT {SELECT_COLUMNS} FROM outbox_records WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Pending records owned by this producer instance, oldest first.
pub async fn fetch_pending(
    pool: &PgPool,
    producer_service_id: &str,
    limit: i64,
) -> Result<Vec<OutboxRecord>, sqlx::Error> {
    sqlx::query_as::<_, OutboxRecord>(&format!(
        r#"
        SELECT {SELECT_COLUMNS} FROM outbox_records
        WHERE status = 'pending' AND producer_service_id = $1
        ORDER BY created_at ASC
        LIMIT $2
        "#
    ))
    .bind(producer_service_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Pending → Sent after a confirmed broker delivery.
pub async fn mark_sent(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE outbox_records
        SET status = 'sent', processed_at = NOW()
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Record a failed publish attempt while keeping the record Pending so the
/// next dispatch tick retries it.
pub async fn record_publish_failure(
    pool: &PgPool,
    id: Uuid,
    error: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE outbox_records
        SET retry_count = retry_count + 1,
            last_retry_at = NOW(),
            error_message = $2
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(id)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Transition a live (Pending or Sent) record to terminal Failed.
pub async fn fail_terminal(pool: &PgPool, id: Uuid, error: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE outbox_records
        SET status = 'failed', error_message = $2, last_retry_at = NOW()
        WHERE id = $1 AND status IN ('pending', 'sent')
        "#,
    )
    .bind(id)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Pending → Expired for records past their TTL.
pub async fn expire_stale_pending(
    pool: &PgPool,
    producer_service_id: &str,
    cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE outbox_records
        SET status = 'expired', error_message = 'Message TTL exceeded'
        WHERE status = 'pending'
          AND producer_service_id = $1
          AND created_at < $2
        "#,
    )
    .bind(producer_service_id)
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Sent → Acknowledged on a successful consumer outcome. Also promotes a
/// Failed record: the consumer demonstrably processed the message, which
/// outranks a timeout-induced failure. Idempotent for already-acknowledged
/// records.
pub async fn acknowledge(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE outbox_records
        SET status = 'acknowledged'
        WHERE id = $1 AND status IN ('sent', 'failed', 'acknowledged')
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Sent → Failed on a failed consumer outcome.
pub async fn ack_failure(pool: &PgPool, id: Uuid, error: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE outbox_records
        SET status = 'failed',
            retry_count = retry_count + 1,
            last_retry_at = NOW(),
            error_message = $2
        WHERE id = $1 AND status = 'sent'
        "#,
    )
    .bind(id)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Sent records for a (topic, group) whose dispatch happened before the
/// cutoff and which were never acknowledged — the retry scan's input.
pub async fn find_timed_out_sent(
    pool: &PgPool,
    topic: &str,
    consumer_group: &str,
    cutoff: DateTime<Utc>,
) -> Result<Vec<OutboxRecord>, sqlx::Error> {
    sqlx::query_as::<_, OutboxRecord>(&format!(
        r#"
        SELECT {SELECT_COLUMNS} FROM outbox_records
        WHERE status = 'sent'
          AND topic = $1
          AND consumer_group = $2
          AND processed_at < $3
        ORDER BY processed_at ASC
        "#
    ))
    .bind(topic)
    .bind(consumer_group)
    .bind(cutoff)
    .fetch_all(pool)
    .await
}

/// Atomically insert a retry record and mark its predecessor Failed.
pub async fn create_retry(
    pool: &PgPool,
    retry: &OutboxRecord,
    predecessor_id: Uuid,
    predecessor_error: &str,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    insert_in_tx(&mut tx, retry).await?;

    sqlx::query(
        r#"
        UPDATE outbox_records
        SET status = 'failed', error_message = $2, last_retry_at = NOW()
        WHERE id = $1 AND status = 'sent'
        "#,
    )
    .bind(predecessor_id)
    .bind(predecessor_error)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Delete terminal records older than the cutoff.
pub async fn cleanup_terminal(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM outbox_records
        WHERE status IN ('acknowledged', 'failed', 'expired')
          AND created_at < $1
        "#,
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Per-status counts plus the oldest pending age in seconds.
pub async fn stats(pool: &PgPool) -> Result<OutboxStats, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE status = 'pending') AS pending,
            COUNT(*) FILTER (WHERE status = 'sent') AS sent,
            COUNT(*) FILTER (WHERE status = 'acknowledged') AS acknowledged,
            COUNT(*) FILTER (WHERE status = 'failed') AS failed,
            COUNT(*) FILTER (WHERE status = 'expired') AS expired,
            COALESCE(EXTRACT(EPOCH FROM (NOW() - MIN(created_at) FILTER (WHERE status = 'pending')))::BIGINT, 0)
                AS oldest_pending_age_seconds
        FROM outbox_records
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(OutboxStats {
        pending: row.try_get("pending")?,
        sent: row.try_get("sent")?,
        acknowledged: row.try_get("acknowledged")?,
        failed: row.try_get("failed")?,
        expired: row.try_get("expired")?,
        oldest_pending_age_seconds: row.try_get("oldest_pending_age_seconds")?,
    })
}

/// Pending count for this instance's health snapshot.
pub async fn pending_count(
    pool: &PgPool,
    producer_service_id: &str,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS pending FROM outbox_records WHERE status = 'pending' AND producer_service_id = $1",
    )
    .bind(producer_service_id)
    .fetch_one(pool)
    .await?;

    row.try_get("pending")
}
