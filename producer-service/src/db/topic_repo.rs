//! Topic registry: catalog of topics and their consumer groups.
//!
//! Deactivation flips `active` instead of deleting so historical outbox
//! records keep a resolvable `topic_registration_id`.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    ConsumerGroupRegistration, RegisterConsumerGroupRequest, RegisterTopicRequest,
    TopicRegistration, TopicWithGroups,
};

const TOPIC_COLUMNS: &str = "id, name, description, active, created_at, updated_at";
const GROUP_COLUMNS: &str =
    "id, topic_id, name, requires_ack, active, ack_timeout_minutes, max_retries, created_at, updated_at";

/// Create a topic and its consumer groups atomically. Fails if the name is
/// already registered.
pub async fn register_topic(
    pool: &PgPool,
    request: &RegisterTopicRequest,
) -> Result<TopicWithGroups, AppError> {
    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM topic_registrations WHERE name = $1",
    )
    .bind(&request.name)
    .fetch_one(pool)
    .await?;

    if existing > 0 {
        return Err(AppError::Conflict(format!(
            "topic '{}' is already registered",
            request.name
        )));
    }

    let mut tx = pool.begin().await?;

    let topic = TopicRegistration {
        id: Uuid::new_v4(),
        name: request.name.clone(),
        description: request.description.clone(),
        active: true,
        created_at: Utc::now(),
        updated_at: None,
    };

    sqlx::query(
        "INSERT INTO topic_registrations (id, name, description, active, created_at) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(topic.id)
    .bind(&topic.name)
    .bind(&topic.description)
    .bind(topic.active)
    .bind(topic.created_at)
    .execute(&mut *tx)
    .await?;

    let mut groups = Vec::with_capacity(request.consumer_groups.len());
    for group_request in &request.consumer_groups {
        let group = group_from_request(topic.id, group_request);
        sqlx::query(
            r#"
            INSERT INTO consumer_group_registrations
                (id, topic_id, name, requires_ack, active, ack_timeout_minutes, max_retries, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(group.id)
        .bind(group.topic_id)
        .bind(&group.name)
        .bind(group.requires_ack)
        .bind(group.active)
        .bind(group.ack_timeout_minutes)
        .bind(group.max_retries)
        .bind(group.created_at)
        .execute(&mut *tx)
        .await?;
        groups.push(group);
    }

    tx.commit().await?;

    tracing::info!(
        topic = %topic.name,
        groups = groups.len(),
        "Topic registered"
    );

    Ok(TopicWithGroups { topic, groups })
}

fn group_from_request(
    topic_id: Uuid,
    request: &RegisterConsumerGroupRequest,
) -> ConsumerGroupRegistration {
    ConsumerGroupRegistration {
        id: Uuid::new_v4(),
        topic_id,
        name: request.name.clone(),
        requires_ack: request.requires_ack,
        active: true,
        ack_timeout_minutes: request.ack_timeout_minutes,
        max_retries: request.max_retries,
        created_at: Utc::now(),
        updated_at: None,
    }
}

/// Add a consumer group to an existing topic; (topic, name) must be unique.
pub async fn add_consumer_group(
    pool: &PgPool,
    topic_id: Uuid,
    request: &RegisterConsumerGroupRequest,
) -> Result<ConsumerGroupRegistration, AppError> {
    let topic_exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM topic_registrations WHERE id = $1",
    )
    .bind(topic_id)
    .fetch_one(pool)
    .await?;

    if topic_exists == 0 {
        return Err(AppError::NotFound(format!("topic {} not found", topic_id)));
    }

    let group = group_from_request(topic_id, request);
    let inserted = sqlx::query(
        r#"
        INSERT INTO consumer_group_registrations
            (id, topic_id, name, requires_ack, active, ack_timeout_minutes, max_retries, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (topic_id, name) DO NOTHING
        "#,
    )
    .bind(group.id)
    .bind(group.topic_id)
    .bind(&group.name)
    .bind(group.requires_ack)
    .bind(group.active)
    .bind(group.ack_timeout_minutes)
    .bind(group.max_retries)
    .bind(group.created_at)
    .execute(pool)
    .await?;

    if inserted.rows_affected() == 0 {
        return Err(AppError::Conflict(format!(
            "consumer group '{}' already exists on topic {}",
            request.name, topic_id
        )));
    }

    Ok(group)
}

pub async fn deactivate_topic(pool: &PgPool, topic_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE topic_registrations SET active = FALSE, updated_at = NOW() WHERE id = $1",
    )
    .bind(topic_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn deactivate_consumer_group(pool: &PgPool, group_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE consumer_group_registrations SET active = FALSE, updated_at = NOW() WHERE id = $1",
    )
    .bind(group_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Active topic with its groups; `None` when the topic is unknown or
/// inactive.
pub async fn get_active_topic_with_groups(
    pool: &PgPool,
    name: &str,
) -> Result<Option<TopicWithGroups>, sqlx::Error> {
    let topic = sqlx::query_as::<_, TopicRegistration>(&format!(
        "SELECT {TOPIC_COLUMNS} FROM topic_registrations WHERE name = $1 AND active = TRUE"
    ))
    .bind(name)
    .fetch_optional(pool)
    .await?;

    let Some(topic) = topic else {
        return Ok(None);
    };

    let groups = sqlx::query_as::<_, ConsumerGroupRegistration>(&format!(
        "SELECT {GROUP_COLUMNS} FROM consumer_group_registrations WHERE topic_id = $1 ORDER BY name"
    ))
    .bind(topic.id)
    .fetch_all(pool)
    .await?;

    Ok(Some(TopicWithGroups { topic, groups }))
}

pub async fn get_topic_by_name(
    pool: &PgPool,
    name: &str,
) -> Result<Option<TopicWithGroups>, sqlx::Error> {
    let topic = sqlx::query_as::<_, TopicRegistration>(&format!(
        "SELECT {TOPIC_COLUMNS} FROM topic_registrations WHERE name = $1"
    ))
    .bind(name)
    .fetch_optional(pool)
    .await?;

    let Some(topic) = topic else {
        return Ok(None);
    };

    let groups = sqlx::query_as::<_, ConsumerGroupRegistration>(&format!(
        "SELECT {GROUP_COLUMNS} FROM consumer_group_registrations WHERE topic_id = $1 ORDER BY name"
    ))
    .bind(topic.id)
    .fetch_all(pool)
    .await?;

    Ok(Some(TopicWithGroups { topic, groups }))
}

pub async fn list_topics(pool: &PgPool) -> Result<Vec<TopicRegistration>, sqlx::Error> {
    sqlx::query_as::<_, TopicRegistration>(&format!(
        "SELECT {TOPIC_COLUMNS} FROM topic_registrations ORDER BY name"
    ))
    .fetch_all(pool)
    .await
}

/// Every active (topic, group) pair with `requires_ack = TRUE` — the retry
/// scan's work list.
pub async fn list_active_ack_groups(
    pool: &PgPool,
) -> Result<Vec<(String, ConsumerGroupRegistration)>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ActiveGroupRow>(
        r#"
        SELECT t.name AS topic_name,
               g.id, g.topic_id, g.name, g.requires_ack, g.active,
               g.ack_timeout_minutes, g.max_retries, g.created_at, g.updated_at
        FROM consumer_group_registrations g
        JOIN topic_registrations t ON t.id = g.topic_id
        WHERE g.active = TRUE AND g.requires_ack = TRUE AND t.active = TRUE
        ORDER BY t.name, g.name
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let topic_name = row.topic_name.clone();
            (topic_name, row.group())
        })
        .collect())
}

#[derive(sqlx::FromRow)]
struct ActiveGroupRow {
    topic_name: String,
    id: Uuid,
    topic_id: Uuid,
    name: String,
    requires_ack: bool,
    active: bool,
    ack_timeout_minutes: i32,
    max_retries: i32,
    created_at: chrono::DateTime<Utc>,
    updated_at: Option<chrono::DateTime<Utc>>,
}

impl ActiveGroupRow {
    fn group(self) -> ConsumerGroupRegistration {
        ConsumerGroupRegistration {
            id: self.id,
            topic_id: self.topic_id,
            name: self.name,
            requires_ack: self.requires_ack,
            active: self.active,
            ack_timeout_minutes: self.ack_timeout_minutes,
            max_retries: self.max_retries,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Group registration addressed by the denormalized keys an outbox record
/// carries.
pub async fn get_group_registration(
    pool: &PgPool,
    topic_id: Uuid,
    group_name: &str,
) -> Result<Option<ConsumerGroupRegistration>, sqlx::Error> {
    sqlx::query_as::<_, ConsumerGroupRegistration>(&format!(
        "SELECT {GROUP_COLUMNS} FROM consumer_group_registrations WHERE topic_id = $1 AND name = $2"
    ))
    .bind(topic_id)
    .bind(group_name)
    .fetch_optional(pool)
    .await
}

/// Resolve the registration id for a (topic name, group name) pair, used by
/// the acknowledgment intake to key its records.
pub async fn find_group_id(
    pool: &PgPool,
    topic_name: &str,
    group_name: &str,
) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT g.id
        FROM consumer_group_registrations g
        JOIN topic_registrations t ON t.id = g.topic_id
        WHERE t.name = $1 AND g.name = $2
        "#,
    )
    .bind(topic_name)
    .bind(group_name)
    .fetch_optional(pool)
    .await
}
