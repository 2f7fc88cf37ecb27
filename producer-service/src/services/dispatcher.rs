//! DispatchPending: relay Pending outbox records to the broker.
//!
//! Only records stamped with this instance's `producer_service_id` are
//! picked up, so producer instances never contend for the same record.
//! Publish failures keep the record Pending (with the attempt recorded) so
//! the next tick retries immediately; the group's `max_retries` bounds the
//! total number of publish attempts.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use kafka_broker::MessagePublisher;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{outbox_repo, topic_repo};
use crate::error::AppError;
use crate::metrics::OutboxMetrics;
use crate::models::ConsumerGroupRegistration;

pub const MAX_RETRIES_EXCEEDED: &str = "Maximum retry attempts exceeded";

#[derive(Debug, Default, PartialEq)]
pub struct DispatchOutcome {
    pub published: usize,
    pub failed_attempts: usize,
    pub failed_terminal: usize,
    pub expired: u64,
}

/// One dispatch tick.
pub async fn run_dispatch_tick(
    pool: &PgPool,
    publisher: &dyn MessagePublisher,
    producer_service_id: &str,
    batch_size: i64,
    message_ttl_hours: i64,
    metrics: &OutboxMetrics,
) -> Result<DispatchOutcome, AppError> {
    let mut outcome = DispatchOutcome::default();

    // Age out records that waited past their TTL before ever being sent
    let ttl_cutoff = Utc::now() - Duration::hours(message_ttl_hours);
    outcome.expired =
        outbox_repo::expire_stale_pending(pool, producer_service_id, ttl_cutoff).await?;
    if outcome.expired > 0 {
        tracing::warn!(count = outcome.expired, "Expired stale pending records");
    }

    let records = outbox_repo::fetch_pending(pool, producer_service_id, batch_size).await?;
    if records.is_empty() {
        return Ok(outcome);
    }

    // One registration lookup per (topic, group) in the batch
    let mut groups: HashMap<(Uuid, String), Option<ConsumerGroupRegistration>> = HashMap::new();

    for record in records {
        let key = (record.topic_registration_id, record.consumer_group.clone());
        if !groups.contains_key(&key) {
            let group =
                topic_repo::get_group_registration(pool, key.0, &record.consumer_group).await?;
            groups.insert(key.clone(), group);
        }

        let Some(group) = groups.get(&key).and_then(|g| g.as_ref()) else {
            // Registration rows are never deleted, so a miss means the record
            // was corrupted; park it rather than retry forever.
            tracing::error!(
                message_id = %record.id,
                topic = %record.topic,
                consumer_group = %record.consumer_group,
                "No consumer group registration for record"
            );
            outbox_repo::fail_terminal(pool, record.id, "Unknown consumer group registration")
                .await?;
            outcome.failed_terminal += 1;
            continue;
        };

        match publisher.publish(&record.envelope()).await {
            Ok(()) => {
                outbox_repo::mark_sent(pool, record.id).await?;
                if !group.requires_ack {
                    // Fire-and-forget groups never ack; a confirmed publish
                    // is as far as their lifecycle goes.
                    outbox_repo::acknowledge(pool, record.id).await?;
                }
                metrics.published.inc();
                outcome.published += 1;
            }
            Err(e) => {
                let error = e.to_string();
                tracing::error!(
                    message_id = %record.id,
                    topic = %record.topic,
                    retry_count = record.retry_count,
                    error = %error,
                    "Broker publish failed"
                );
                metrics.dispatch_failures.inc();

                if group.allows_retry(record.retry_count + 1) {
                    outbox_repo::record_publish_failure(pool, record.id, &error).await?;
                    outcome.failed_attempts += 1;
                } else {
                    outbox_repo::fail_terminal(pool, record.id, MAX_RETRIES_EXCEEDED).await?;
                    outcome.failed_terminal += 1;
                }
            }
        }
    }

    if outcome.published > 0 {
        tracing::info!(published = outcome.published, "Dispatched pending records");
    }

    Ok(outcome)
}
