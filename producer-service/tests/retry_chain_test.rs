//! Retry record invariants across a full timeout/retry chain.

use chrono::Utc;
use producer_service::config::Identity;
use producer_service::models::{ConsumerGroupRegistration, OutboxRecord, OutboxStatus};
use producer_service::services::retry_scan::build_retry_record;
use uuid::Uuid;

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

fn identity() -> Identity {
    Identity {
        service_id: "producer-a".to_string(),
        instance_id: "producer-a-1".to_string(),
    }
}

fn first_send() -> OutboxRecord {
    let id = Uuid::new_v4();
    OutboxRecord {
        id,
        topic: "orders".to_string(),
        consumer_group: "order-processor".to_string(),
        payload: r#"{"order":17}"#.to_string(),
        status: OutboxStatus::Sent,
        created_at: Utc::now() - chrono::Duration::minutes(10),
        processed_at: Some(Utc::now() - chrono::Duration::minutes(9)),
        last_retry_at: None,
        scheduled_retry_at: None,
        retry_count: 0,
        error_message: None,
        producer_service_id: "producer-a".to_string(),
        producer_instance_id: "producer-a-1".to_string(),
        is_retry: false,
        original_message_id: None,
        target_consumer_service_id: None,
        idempotency_key: id.to_string(),
        topic_registration_id: Uuid::new_v4(),
    }
}

/// Simulate the scan deciding on a timed-out record, the way
/// `run_retry_scan_tick` does, without a database.
fn scan_step(
    record: &OutboxRecord,
    group: &ConsumerGroupRegistration,
) -> Option<OutboxRecord> {
    if group.allows_retry(record.retry_count) {
        let mut retry = build_retry_record(record, group, None, &identity());
        // Dispatch + timeout would move it to Sent for the next scan round
        retry.status = OutboxStatus::Sent;
        retry.processed_at = Some(Utc::now());
        Some(retry)
    } else {
        None
    }
}

#[test]
fn chain_exhausts_exactly_at_max_retries() {
    let group = group(2);
    let original = first_send();

    let retry1 = scan_step(&original, &group).expect("first retry allowed");
    assert_eq!(retry1.retry_count, 1);
    assert_eq!(
        retry1.idempotency_key,
        format!("retry-{}-1", original.id)
    );
    assert_eq!(retry1.original_message_id, Some(original.id));

    let retry2 = scan_step(&retry1, &group).expect("second retry allowed");
    assert_eq!(retry2.retry_count, 2);
    assert_eq!(retry2.idempotency_key, format!("retry-{}-2", retry1.id));

    // retry_count == max_retries: the budget is spent, no third record
    assert!(scan_step(&retry2, &group).is_none());
}

#[test]
fn unbounded_group_never_exhausts() {
    let group = group(-1);
    let mut record = first_send();

    for expected in 1..=25 {
        let retry = scan_step(&record, &group).expect("unbounded retries");
        assert_eq!(retry.retry_count, expected);
        assert!(retry.is_retry);
        record = retry;
    }
}

#[test]
fn every_retry_is_a_fresh_pending_record_for_the_scanner() {
    let group = group(5);
    let original = first_send();
    let retry = build_retry_record(&original, &group, Some("consumer-7".to_string()), &identity());

    assert_ne!(retry.id, original.id);
    assert_eq!(retry.status, OutboxStatus::Pending);
    assert!(retry.processed_at.is_none());
    assert!(retry.error_message.is_none());
    assert!(retry.scheduled_retry_at.is_some());
    assert_eq!(retry.target_consumer_service_id.as_deref(), Some("consumer-7"));

    // The envelope advertises the targeting and the retry lineage
    let envelope = retry.envelope();
    assert!(envelope.is_retry);
    assert_eq!(envelope.original_message_id, Some(original.id));
    assert!(!envelope.accepts_consumer("someone-else"));
    assert!(envelope.accepts_consumer("consumer-7"));
}
