//! Acknowledgment records: one row per (message, group registration)
//! outcome, kept for the tracking surface.

use sqlx::PgPool;
use uuid::Uuid;

/// Record a consumer outcome. Duplicate acknowledgments for the same
/// message/group pair keep the first row (at-least-once consumers may ack
/// the same delivery twice).
pub async fn record_acknowledgment(
    pool: &PgPool,
    message_id: Uuid,
    consumer_group_registration_id: Uuid,
    success: bool,
    error_message: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO acknowledgment_records
            (id, message_id, consumer_group_registration_id, success, error_message, acknowledged_at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        ON CONFLICT (message_id, consumer_group_registration_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(message_id)
    .bind(consumer_group_registration_id)
    .bind(success)
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
