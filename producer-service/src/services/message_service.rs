//! Message submission: validation, fan-out and bulk outbox creation.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Identity;
use crate::db::{outbox_repo, topic_repo};
use crate::error::AppError;
use crate::models::{
    OutboxRecord, OutboxStatus, SendMessageRequest, SendMessageResponse, TopicWithGroups,
};
use crate::services::batch_queue::QueuedSend;
use crate::state::AppState;

/// Expand one submit into one Pending record per matched active group.
fn fan_out(
    topic: &TopicWithGroups,
    payload: &str,
    only_group: Option<&str>,
    identity: &Identity,
) -> Vec<OutboxRecord> {
    topic
        .active_groups()
        .filter(|group| only_group.map(|name| group.name == name).unwrap_or(true))
        .map(|group| {
            let id = Uuid::new_v4();
            OutboxRecord {
                id,
                topic: topic.topic.name.clone(),
                consumer_group: group.name.clone(),
                payload: payload.to_string(),
                status: OutboxStatus::Pending,
                created_at: Utc::now(),
                processed_at: None,
                last_retry_at: None,
                scheduled_retry_at: None,
                retry_count: 0,
                error_message: None,
                producer_service_id: identity.service_id.clone(),
                producer_instance_id: identity.instance_id.clone(),
                is_retry: false,
                original_message_id: None,
                target_consumer_service_id: None,
                // First-sends derive their duplicate-detection key from the id
                idempotency_key: id.to_string(),
                topic_registration_id: topic.topic.id,
            }
        })
        .collect()
}

/// Handle a submit request.
///
/// The batched path validates the topic, enqueues and returns a synthetic
/// message id that is never persisted; the synchronous path bulk-inserts the
/// fan-out and returns the first record's id. Neither path ever waits on
/// the broker or on consumer availability.
pub async fn send_message(
    state: &AppState,
    request: SendMessageRequest,
) -> Result<SendMessageResponse, AppError> {
    if request.topic.trim().is_empty() {
        return Err(AppError::BadRequest("topic is required".into()));
    }

    let topic = topic_repo::get_active_topic_with_groups(&state.db, &request.topic)
        .await?
        .ok_or_else(|| {
            AppError::BadRequest(format!("topic '{}' is not registered", request.topic))
        })?;

    let matched: Vec<String> = topic
        .active_groups()
        .filter(|group| {
            request
                .consumer_group
                .as_deref()
                .map(|name| group.name == name)
                .unwrap_or(true)
        })
        .map(|group| group.name.clone())
        .collect();

    if matched.is_empty() {
        return Err(AppError::BadRequest(format!(
            "topic '{}' has no active consumer groups matching the request",
            request.topic
        )));
    }

    let identity = &state.config.identity;

    if request.use_batching {
        let depth = state.batch_queue.push(QueuedSend {
            topic: request.topic.clone(),
            payload: request.message.clone(),
            consumer_group: request.consumer_group.clone(),
        });

        // Size trigger: flush asynchronously, never blocking the submitter
        if state.batch_queue.over_threshold() {
            let flush_state = state.clone();
            tokio::spawn(async move {
                if let Err(e) = flush_batch(&flush_state).await {
                    tracing::warn!(error = %e, "size-triggered batch flush failed");
                }
            });
        }

        tracing::debug!(topic = %request.topic, depth, "Submit enqueued for batching");

        return Ok(SendMessageResponse {
            message_id: Uuid::new_v4(),
            status: "queued".to_string(),
            topic: request.topic,
            target_consumer_groups: matched,
            producer_service_id: identity.service_id.clone(),
            producer_instance_id: identity.instance_id.clone(),
        });
    }

    let records = fan_out(
        &topic,
        &request.message,
        request.consumer_group.as_deref(),
        identity,
    );
    outbox_repo::insert_records(&state.db, &records).await?;

    tracing::info!(
        topic = %request.topic,
        records = records.len(),
        "Message fanned out to outbox"
    );

    Ok(SendMessageResponse {
        message_id: records[0].id,
        status: "pending".to_string(),
        topic: request.topic,
        target_consumer_groups: matched,
        producer_service_id: identity.service_id.clone(),
        producer_instance_id: identity.instance_id.clone(),
    })
}

/// Expand queued submits against the current registry state. Requests whose
/// topic has since vanished or lost all groups are dropped with a warning
/// (there is no caller left to surface a 400 to).
async fn expand_batch(
    pool: &PgPool,
    batch: &[QueuedSend],
    identity: &Identity,
) -> Result<Vec<OutboxRecord>, AppError> {
    let mut records = Vec::new();
    let mut topics: std::collections::HashMap<String, Option<TopicWithGroups>> =
        std::collections::HashMap::new();

    for request in batch {
        // One registry lookup per distinct topic in the batch
        if !topics.contains_key(&request.topic) {
            let resolved =
                topic_repo::get_active_topic_with_groups(pool, &request.topic).await?;
            topics.insert(request.topic.clone(), resolved);
        }

        match topics.get(&request.topic).and_then(|t| t.as_ref()) {
            Some(topic) => {
                let expanded = fan_out(
                    topic,
                    &request.payload,
                    request.consumer_group.as_deref(),
                    identity,
                );
                if expanded.is_empty() {
                    tracing::warn!(
                        topic = %request.topic,
                        "Dropping batched submit with no matching active groups"
                    );
                }
                records.extend(expanded);
            }
            None => {
                tracing::warn!(
                    topic = %request.topic,
                    "Dropping batched submit for unregistered topic"
                );
            }
        }
    }

    Ok(records)
}

/// Drain and persist one batch. On a failed bulk insert the entire batch is
/// re-queued so the submit stays durable; it will be retried by the next
/// flush tick.
pub async fn flush_batch(state: &AppState) -> Result<usize, AppError> {
    let batch = state.batch_queue.drain().await;
    if batch.is_empty() {
        return Ok(0);
    }

    let records = match expand_batch(&state.db, &batch, &state.config.identity).await {
        Ok(records) => records,
        Err(e) => {
            state.batch_queue.requeue(batch);
            return Err(e);
        }
    };

    if let Err(e) = outbox_repo::insert_records(&state.db, &records).await {
        tracing::error!(
            error = %e,
            batch_size = batch.len(),
            "Bulk outbox insert failed; re-queueing batch"
        );
        state.batch_queue.requeue(batch);
        return Err(e.into());
    }

    tracing::info!(
        requests = batch.len(),
        records = records.len(),
        "Batch flushed to outbox"
    );

    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConsumerGroupRegistration, TopicRegistration};

    fn topic_with_groups(names: &[(&str, bool)]) -> TopicWithGroups {
        let topic_id = Uuid::new_v4();
        TopicWithGroups {
            topic: TopicRegistration {
                id: topic_id,
                name: "orders".to_string(),
                description: None,
                active: true,
                created_at: Utc::now(),
                updated_at: None,
            },
            groups: names
                .iter()
                .map(|(name, active)| ConsumerGroupRegistration {
                    id: Uuid::new_v4(),
                    topic_id,
                    name: name.to_string(),
                    requires_ack: true,
                    active: *active,
                    ack_timeout_minutes: 5,
                    max_retries: 5,
                    created_at: Utc::now(),
                    updated_at: None,
                })
                .collect(),
        }
    }

    fn identity() -> Identity {
        Identity {
            service_id: "producer-test".to_string(),
            instance_id: "producer-test-0".to_string(),
        }
    }

    #[test]
    fn test_fan_out_one_record_per_active_group() {
        let topic = topic_with_groups(&[("g1", true), ("g2", true), ("g3", false)]);
        let records = fan_out(&topic, "payload", None, &identity());

        assert_eq!(records.len(), 2);
        let groups: Vec<_> = records.iter().map(|r| r.consumer_group.as_str()).collect();
        assert!(groups.contains(&"g1"));
        assert!(groups.contains(&"g2"));
        for record in &records {
            assert_eq!(record.status, OutboxStatus::Pending);
            assert_eq!(record.retry_count, 0);
            assert!(!record.is_retry);
            assert_eq!(record.idempotency_key, record.id.to_string());
            assert_eq!(record.producer_service_id, "producer-test");
        }
    }

    #[test]
    fn test_fan_out_respects_group_filter() {
        let topic = topic_with_groups(&[("g1", true), ("g2", true)]);
        let records = fan_out(&topic, "payload", Some("g2"), &identity());

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].consumer_group, "g2");
    }

    #[test]
    fn test_fan_out_unknown_group_yields_nothing() {
        let topic = topic_with_groups(&[("g1", true)]);
        let records = fan_out(&topic, "payload", Some("missing"), &identity());
        assert!(records.is_empty());
    }
}
