//! Processor callback seam. The platform guarantees at-least-once delivery
//! with store-level dedup; handlers may still run more than once if the
//! process crashes between handling and the processed-row insert, so they
//! should be idempotent for safety.

use async_trait::async_trait;

use crate::models::ConsumerMessage;

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &ConsumerMessage) -> anyhow::Result<()>;
}

/// Default handler: accepts everything. Business logic plugs in by swapping
/// this out at startup.
pub struct NoopHandler;

#[async_trait]
impl MessageHandler for NoopHandler {
    async fn handle(&self, message: &ConsumerMessage) -> anyhow::Result<()> {
        tracing::debug!(
            message_id = %message.message_id,
            topic = %message.topic,
            "No-op handler accepted message"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_noop_handler_accepts() {
        let message = ConsumerMessage {
            message_id: Uuid::new_v4(),
            topic: "orders".to_string(),
            consumer_group: "order-processor".to_string(),
            payload: "{}".to_string(),
            is_retry: false,
            retry_count: 0,
            producer_service_id: "p".to_string(),
            producer_instance_id: "p-1".to_string(),
            idempotency_key: "k".to_string(),
        };

        assert!(NoopHandler.handle(&message).await.is_ok());
    }
}
