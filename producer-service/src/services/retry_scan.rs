//! RetryScan: detect Sent records whose acknowledgment timed out and
//! re-enter them as targeted retry records.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Identity;
use crate::db::{outbox_repo, topic_repo};
use crate::error::AppError;
use crate::metrics::OutboxMetrics;
use crate::models::{ConsumerGroupRegistration, OutboxRecord, OutboxStatus};
use crate::services::dispatcher::MAX_RETRIES_EXCEEDED;
use crate::services::registry;

#[derive(Debug, Default, PartialEq)]
pub struct RetryScanOutcome {
    pub retries_created: usize,
    pub exhausted: usize,
}

/// Build the successor record for a timed-out predecessor.
///
/// The retry carries `retry_count = predecessor + 1` and the idempotency key
/// `retry-{predecessorId}-{newRetryCount}`, and is stamped with this
/// instance's identity so this instance dispatches it.
pub fn build_retry_record(
    predecessor: &OutboxRecord,
    group: &ConsumerGroupRegistration,
    target_consumer_service_id: Option<String>,
    identity: &Identity,
) -> OutboxRecord {
    let retry_count = predecessor.retry_count + 1;
    let id = Uuid::new_v4();
    OutboxRecord {
        id,
        topic: predecessor.topic.clone(),
        consumer_group: group.name.clone(),
        payload: predecessor.payload.clone(),
        status: OutboxStatus::Pending,
        created_at: Utc::now(),
        processed_at: None,
        last_retry_at: None,
        scheduled_retry_at: Some(Utc::now()),
        retry_count,
        error_message: None,
        producer_service_id: identity.service_id.clone(),
        producer_instance_id: identity.instance_id.clone(),
        is_retry: true,
        original_message_id: Some(predecessor.id),
        target_consumer_service_id,
        idempotency_key: message_schema::retry_idempotency_key(predecessor.id, retry_count),
        topic_registration_id: predecessor.topic_registration_id,
    }
}

/// One retry-scan tick across every active group that requires acks.
pub async fn run_retry_scan_tick(
    pool: &PgPool,
    identity: &Identity,
    agent_staleness_secs: i64,
    metrics: &OutboxMetrics,
) -> Result<RetryScanOutcome, AppError> {
    let mut outcome = RetryScanOutcome::default();

    for (topic_name, group) in topic_repo::list_active_ack_groups(pool).await? {
        let cutoff = Utc::now() - group.ack_timeout();
        let timed_out =
            outbox_repo::find_timed_out_sent(pool, &topic_name, &group.name, cutoff).await?;

        for record in timed_out {
            if group.allows_retry(record.retry_count) {
                let target = registry::select_consumer_for_group(
                    pool,
                    &group.name,
                    agent_staleness_secs,
                )
                .await?
                .map(|agent| agent.service_id);

                if target.is_none() {
                    tracing::warn!(
                        consumer_group = %group.name,
                        message_id = %record.id,
                        "No healthy consumer for group; creating untargeted retry"
                    );
                }

                let retry = build_retry_record(&record, &group, target, identity);
                let predecessor_error = format!("Retrying with {}", retry.id);
                outbox_repo::create_retry(pool, &retry, record.id, &predecessor_error).await?;

                metrics.retries_created.inc();
                outcome.retries_created += 1;

                tracing::info!(
                    message_id = %record.id,
                    retry_id = %retry.id,
                    retry_count = retry.retry_count,
                    consumer_group = %group.name,
                    target = ?retry.target_consumer_service_id,
                    "Acknowledgment timed out; retry record created"
                );
            } else {
                outbox_repo::fail_terminal(pool, record.id, MAX_RETRIES_EXCEEDED).await?;
                outcome.exhausted += 1;

                tracing::warn!(
                    message_id = %record.id,
                    retry_count = record.retry_count,
                    max_retries = group.max_retries,
                    consumer_group = %group.name,
                    "Retry budget exhausted; record failed terminally"
                );
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(max_retries: i32) -> ConsumerGroupRegistration {
        ConsumerGroupRegistration {
            id: Uuid::new_v4(),
            topic_id: Uuid::new_v4(),
            name: "order-processor".to_string(),
            requires_ack: true,
            active: true,
            ack_timeout_minutes: 1,
            max_retries,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn sent_record(retry_count: i32) -> OutboxRecord {
        OutboxRecord {
            id: Uuid::new_v4(),
            topic: "orders".to_string(),
            consumer_group: "order-processor".to_string(),
            payload: "p".to_string(),
            status: OutboxStatus::Sent,
            created_at: Utc::now() - chrono::Duration::minutes(10),
            processed_at: Some(Utc::now() - chrono::Duration::minutes(9)),
            last_retry_at: None,
            scheduled_retry_at: None,
            retry_count,
            error_message: None,
            producer_service_id: "producer-a".to_string(),
            producer_instance_id: "producer-a-1".to_string(),
            is_retry: retry_count > 0,
            original_message_id: None,
            target_consumer_service_id: None,
            idempotency_key: "k".to_string(),
            topic_registration_id: Uuid::new_v4(),
        }
    }

    fn identity() -> Identity {
        Identity {
            service_id: "producer-b".to_string(),
            instance_id: "producer-b-0".to_string(),
        }
    }

    #[test]
    fn test_retry_record_shape() {
        let predecessor = sent_record(0);
        let retry = build_retry_record(
            &predecessor,
            &group(2),
            Some("consumer-x".to_string()),
            &identity(),
        );

        assert_eq!(retry.retry_count, 1);
        assert!(retry.is_retry);
        assert_eq!(retry.original_message_id, Some(predecessor.id));
        assert_eq!(retry.status, OutboxStatus::Pending);
        assert_eq!(
            retry.idempotency_key,
            format!("retry-{}-1", predecessor.id)
        );
        assert_eq!(retry.target_consumer_service_id.as_deref(), Some("consumer-x"));
        // The retry belongs to the scanning instance, not the original producer
        assert_eq!(retry.producer_service_id, "producer-b");
        assert_eq!(retry.payload, predecessor.payload);
        assert_eq!(retry.topic_registration_id, predecessor.topic_registration_id);
    }

    #[test]
    fn test_retry_chain_increments_counts() {
        let first = sent_record(0);
        let second = build_retry_record(&first, &group(-1), None, &identity());
        let third = build_retry_record(&second, &group(-1), None, &identity());

        assert_eq!(second.retry_count, 1);
        assert_eq!(third.retry_count, 2);
        // Each key references the immediate predecessor
        assert_eq!(
            third.idempotency_key,
            format!("retry-{}-2", second.id)
        );
    }
}
