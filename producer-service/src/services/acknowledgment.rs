//! Acknowledgment intake: apply consumer outcomes to outbox records.

use message_schema::AcknowledgmentRequest;
use sqlx::PgPool;

use crate::db::{ack_repo, outbox_repo, topic_repo};
use crate::error::AppError;
use crate::metrics::OutboxMetrics;
use crate::models::OutboxStatus;

#[derive(Debug, PartialEq)]
pub enum AckOutcome {
    Acknowledged,
    Failed,
}

/// Resolve the record named by the acknowledgment and transition it.
///
/// A success outcome promotes Sent (or an already timed-out Failed) to
/// Acknowledged and is idempotent for repeat deliveries. A failure outcome
/// only transitions Sent; anything else means the record already reached a
/// terminal decision and the request conflicts with it.
pub async fn apply_acknowledgment(
    pool: &PgPool,
    request: &AcknowledgmentRequest,
    metrics: &OutboxMetrics,
) -> Result<AckOutcome, AppError> {
    let record = outbox_repo::get_by_id(pool, request.message_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("message {} not found", request.message_id))
        })?;

    // Keep the audit row regardless of the state transition's outcome
    if let Some(group_id) =
        topic_repo::find_group_id(pool, &record.topic, &request.consumer_group).await?
    {
        ack_repo::record_acknowledgment(
            pool,
            request.message_id,
            group_id,
            request.success,
            request.error_message.as_deref(),
        )
        .await?;
    } else {
        tracing::warn!(
            topic = %record.topic,
            consumer_group = %request.consumer_group,
            "Acknowledgment for unregistered consumer group"
        );
    }

    if request.success {
        if !accepts_success_ack(record.status) {
            // Pending or Expired: the consumer acked something this record
            // never legitimately reached.
            return Err(AppError::Conflict(format!(
                "message {} cannot be acknowledged from state {}",
                request.message_id, record.status
            )));
        }
        // The UPDATE carries the same guard, so a racing transition between
        // the read above and here still cannot corrupt a terminal state.
        let transitioned = outbox_repo::acknowledge(pool, request.message_id).await?;
        if !transitioned {
            return Err(AppError::Conflict(format!(
                "message {} changed state concurrently",
                request.message_id
            )));
        }

        metrics.acknowledged.inc();
        tracing::info!(
            message_id = %request.message_id,
            consumer_group = %request.consumer_group,
            "Message acknowledged"
        );
        Ok(AckOutcome::Acknowledged)
    } else {
        let error = request
            .error_message
            .as_deref()
            .unwrap_or("consumer reported failure");
        let transitioned = outbox_repo::ack_failure(pool, request.message_id, error).await?;
        if !transitioned {
            if record.status.is_terminal() {
                return Err(AppError::Conflict(format!(
                    "message {} is already terminal ({})",
                    request.message_id, record.status
                )));
            }
            return Err(AppError::Conflict(format!(
                "message {} cannot fail from state {}",
                request.message_id, record.status
            )));
        }

        tracing::warn!(
            message_id = %request.message_id,
            consumer_group = %request.consumer_group,
            error = %error,
            "Consumer reported processing failure"
        );
        Ok(AckOutcome::Failed)
    }
}

/// Whether a record in this state would accept a successful acknowledgment.
pub fn accepts_success_ack(status: OutboxStatus) -> bool {
    matches!(
        status,
        OutboxStatus::Sent | OutboxStatus::Failed | OutboxStatus::Acknowledged
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_ack_acceptance() {
        assert!(accepts_success_ack(OutboxStatus::Sent));
        // A late ack outranks a timeout-induced failure
        assert!(accepts_success_ack(OutboxStatus::Failed));
        // Repeat delivery of the same ack is idempotent
        assert!(accepts_success_ack(OutboxStatus::Acknowledged));
        assert!(!accepts_success_ack(OutboxStatus::Pending));
        assert!(!accepts_success_ack(OutboxStatus::Expired));
    }
}
