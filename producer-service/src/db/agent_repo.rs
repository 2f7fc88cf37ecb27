//! Agent registry store: service instances and their health history.

use chrono::{DateTime, Utc};
use message_schema::{HeartbeatRequest, RegisterAgentRequest, ServiceKind};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::agent::{HealthCheckRecord, ServiceAgent};

const AGENT_COLUMNS: &str = r#"
    id, service_id, instance_id, service_kind, service_name, host, ip, port,
    base_url, status, started_at, last_heartbeat, version, metadata,
    assigned_consumer_groups, assigned_topics
"#;

/// Upsert by `service_id`: re-registration of a known service refreshes its
/// instance identity and resets it to Active.
pub async fn upsert_agent(
    pool: &PgPool,
    kind: ServiceKind,
    request: &RegisterAgentRequest,
) -> Result<ServiceAgent, sqlx::Error> {
    sqlx::query_as::<_, ServiceAgent>(&format!(
        r#"
        INSERT INTO service_agents (
            id, service_id, instance_id, service_kind, service_name, host, ip,
            port, base_url, status, started_at, last_heartbeat, version,
            metadata, assigned_consumer_groups, assigned_topics
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'active', NOW(), NOW(),
                  $10, $11, $12, $13)
        ON CONFLICT (service_id) DO UPDATE SET
            instance_id = EXCLUDED.instance_id,
            service_name = EXCLUDED.service_name,
            host = EXCLUDED.host,
            ip = EXCLUDED.ip,
            port = EXCLUDED.port,
            base_url = EXCLUDED.base_url,
            status = 'active',
            started_at = NOW(),
            last_heartbeat = NOW(),
            version = EXCLUDED.version,
            metadata = EXCLUDED.metadata,
            assigned_consumer_groups = EXCLUDED.assigned_consumer_groups,
            assigned_topics = EXCLUDED.assigned_topics
        RETURNING {AGENT_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(&request.service_id)
    .bind(&request.instance_id)
    .bind(kind)
    .bind(&request.service_name)
    .bind(&request.host)
    .bind(&request.ip)
    .bind(request.port as i32)
    .bind(&request.base_url)
    .bind(&request.version)
    .bind(&request.metadata)
    .bind(&request.assigned_consumer_groups)
    .bind(&request.assigned_topics)
    .fetch_one(pool)
    .await
}

/// Refresh `last_heartbeat` and append a health observation, atomically.
/// Returns false when the agent was never registered.
pub async fn update_heartbeat(
    pool: &PgPool,
    kind: ServiceKind,
    request: &HeartbeatRequest,
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE service_agents
        SET last_heartbeat = NOW(), status = $3
        WHERE service_id = $1 AND instance_id = $2
        "#,
    )
    .bind(&request.service_id)
    .bind(&request.instance_id)
    .bind(request.status)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    sqlx::query(
        r#"
        INSERT INTO health_check_records
            (id, service_id, instance_id, service_kind, status, checked_at,
             status_message, response_time_ms, health_data)
        VALUES ($1, $2, $3, $4, $5, NOW(), $6, $7, $8)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&request.service_id)
    .bind(&request.instance_id)
    .bind(kind)
    .bind(request.health_status)
    .bind(&request.status_message)
    .bind(request.response_time_ms)
    .bind(&request.health_data)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

pub async fn insert_health_check(
    pool: &PgPool,
    record: &HealthCheckRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO health_check_records
            (id, service_id, instance_id, service_kind, status, checked_at,
             status_message, response_time_ms, health_data)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(record.id)
    .bind(&record.service_id)
    .bind(&record.instance_id)
    .bind(record.service_kind)
    .bind(record.status)
    .bind(record.checked_at)
    .bind(&record.status_message)
    .bind(record.response_time_ms)
    .bind(&record.health_data)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_by_service_id(
    pool: &PgPool,
    service_id: &str,
) -> Result<Option<ServiceAgent>, sqlx::Error> {
    sqlx::query_as::<_, ServiceAgent>(&format!(
        "SELECT {AGENT_COLUMNS} FROM service_agents WHERE service_id = $1"
    ))
    .bind(service_id)
    .fetch_optional(pool)
    .await
}

/// Active agents of one kind with a heartbeat inside the staleness window.
pub async fn list_active(
    pool: &PgPool,
    kind: ServiceKind,
    staleness_secs: i64,
) -> Result<Vec<ServiceAgent>, sqlx::Error> {
    sqlx::query_as::<_, ServiceAgent>(&format!(
        r#"
        SELECT {AGENT_COLUMNS} FROM service_agents
        WHERE service_kind = $1
          AND status = 'active'
          AND last_heartbeat >= NOW() - ($2 * INTERVAL '1 second')
        ORDER BY last_heartbeat DESC
        "#
    ))
    .bind(kind)
    .bind(staleness_secs)
    .fetch_all(pool)
    .await
}

pub async fn list_all(
    pool: &PgPool,
    kind: Option<ServiceKind>,
) -> Result<Vec<ServiceAgent>, sqlx::Error> {
    match kind {
        Some(kind) => {
            sqlx::query_as::<_, ServiceAgent>(&format!(
                "SELECT {AGENT_COLUMNS} FROM service_agents WHERE service_kind = $1 ORDER BY service_id"
            ))
            .bind(kind)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, ServiceAgent>(&format!(
                "SELECT {AGENT_COLUMNS} FROM service_agents ORDER BY service_id"
            ))
            .fetch_all(pool)
            .await
        }
    }
}

pub async fn deactivate(pool: &PgPool, service_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE service_agents SET status = 'inactive' WHERE service_id = $1",
    )
    .bind(service_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Registry GC: agents silent past the termination threshold go Terminated.
/// Rows are retained for audit.
pub async fn terminate_stale(pool: &PgPool, threshold_secs: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE service_agents
        SET status = 'terminated'
        WHERE last_heartbeat < NOW() - ($1 * INTERVAL '1 second')
          AND status NOT IN ('terminated', 'maintenance')
        "#,
    )
    .bind(threshold_secs)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Non-healthy observations for a service inside the lookback window.
pub async fn recent_failure_count(
    pool: &PgPool,
    service_id: &str,
    window_secs: i64,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS failures
        FROM health_check_records
        WHERE service_id = $1
          AND checked_at >= NOW() - ($2 * INTERVAL '1 second')
          AND status <> 'healthy'
        "#,
    )
    .bind(service_id)
    .bind(window_secs)
    .fetch_one(pool)
    .await?;

    row.try_get("failures")
}

/// Heartbeat frequency proxy: health observations inside the window.
pub async fn heartbeat_count(
    pool: &PgPool,
    service_id: &str,
    window_secs: i64,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS beats
        FROM health_check_records
        WHERE service_id = $1
          AND checked_at >= NOW() - ($2 * INTERVAL '1 second')
        "#,
    )
    .bind(service_id)
    .bind(window_secs)
    .fetch_one(pool)
    .await?;

    row.try_get("beats")
}

/// Most recent health map reported by a service, if any.
pub async fn latest_health_data(
    pool: &PgPool,
    service_id: &str,
) -> Result<Option<serde_json::Value>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT health_data
        FROM health_check_records
        WHERE service_id = $1
        ORDER BY checked_at DESC
        LIMIT 1
        "#,
    )
    .bind(service_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.and_then(|r| r.try_get("health_data").ok()).flatten())
}

/// Recent health history, newest first.
pub async fn health_history(
    pool: &PgPool,
    service_id: &str,
    limit: i64,
) -> Result<Vec<HealthCheckRecord>, sqlx::Error> {
    sqlx::query_as::<_, HealthCheckRecord>(
        r#"
        SELECT id, service_id, instance_id, service_kind, status, checked_at,
               status_message, response_time_ms, health_data
        FROM health_check_records
        WHERE service_id = $1
        ORDER BY checked_at DESC
        LIMIT $2
        "#,
    )
    .bind(service_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Touch only `last_heartbeat` (used by the producer's own heartbeat tick
/// before it records the full snapshot).
pub async fn touch_heartbeat(
    pool: &PgPool,
    service_id: &str,
    at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE service_agents SET last_heartbeat = $2 WHERE service_id = $1",
    )
    .bind(service_id)
    .bind(at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
