//! Idempotent message processor and the poll loop that drives it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use kafka_broker::{BrokerError, BrokerSubscriber};
use message_schema::{AcknowledgmentRequest, MessageEnvelope};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::{Config, Identity};
use crate::db::{failed_repo, processed_repo};
use crate::error::AppError;
use crate::metrics::ConsumerMetrics;
use crate::models::{ConsumerMessage, FailedMessage, ProcessedMessage};
use crate::services::handler::MessageHandler;
use crate::services::producer_client::ProducerClient;

/// Persistence seam for processing outcomes.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    async fn is_processed(&self, message_id: Uuid, group: &str) -> anyhow::Result<bool>;

    /// Returns false when another worker already recorded the outcome
    /// (unique violation treated as idempotent success).
    async fn record_processed(&self, message: &ProcessedMessage) -> anyhow::Result<bool>;

    async fn record_failure(&self, failure: &FailedMessage) -> anyhow::Result<()>;
}

pub struct SqlxOutcomeStore {
    pool: PgPool,
}

impl SqlxOutcomeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutcomeStore for SqlxOutcomeStore {
    async fn is_processed(&self, message_id: Uuid, group: &str) -> anyhow::Result<bool> {
        Ok(processed_repo::is_processed(&self.pool, message_id, group).await?)
    }

    async fn record_processed(&self, message: &ProcessedMessage) -> anyhow::Result<bool> {
        Ok(processed_repo::mark_processed(&self.pool, message).await?)
    }

    async fn record_failure(&self, failure: &FailedMessage) -> anyhow::Result<()> {
        Ok(failed_repo::insert_failure(&self.pool, failure).await?)
    }
}

/// Acknowledgment seam toward the producer.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn acknowledge(&self, request: &AcknowledgmentRequest) -> anyhow::Result<()>;
}

#[async_trait]
impl Acknowledger for ProducerClient {
    async fn acknowledge(&self, request: &AcknowledgmentRequest) -> anyhow::Result<()> {
        Ok(ProducerClient::acknowledge(self, request).await?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Handled and recorded for the first time
    Processed,
    /// Already in the processed store; producer re-acked
    Duplicate,
    /// Targeted at a different consumer instance; not touched
    SkippedTarget,
    /// Handler rejected the message; failure recorded and producer notified
    Failed,
}

pub struct MessageProcessor {
    store: Arc<dyn OutcomeStore>,
    acker: Arc<dyn Acknowledger>,
    handler: Arc<dyn MessageHandler>,
    identity: Identity,
    metrics: ConsumerMetrics,
}

impl MessageProcessor {
    pub fn new(
        store: Arc<dyn OutcomeStore>,
        acker: Arc<dyn Acknowledger>,
        handler: Arc<dyn MessageHandler>,
        identity: Identity,
        metrics: ConsumerMetrics,
    ) -> Self {
        Self {
            store,
            acker,
            handler,
            identity,
            metrics,
        }
    }

    /// Steps 2–6 of the loop body: target check, dedup, handle, record,
    /// acknowledge. The caller broker-acks afterwards on any `Ok`.
    pub async fn process_envelope(
        &self,
        envelope: &MessageEnvelope,
    ) -> Result<ProcessOutcome, AppError> {
        // A targeted retry belongs to exactly one instance; everyone else
        // steps aside and lets the broker offset advance.
        if !envelope.accepts_consumer(&self.identity.service_id) {
            tracing::debug!(
                message_id = %envelope.message_id,
                target = ?envelope.target_consumer_service_id,
                "Envelope targeted at another consumer; skipping"
            );
            self.metrics.skipped.inc();
            return Ok(ProcessOutcome::SkippedTarget);
        }

        if self
            .store
            .is_processed(envelope.message_id, &envelope.consumer_group)
            .await?
        {
            // Duplicate delivery: re-assert success so a lost ack cannot
            // keep the producer retrying forever.
            self.acker.acknowledge(&success_ack(envelope)).await?;
            self.metrics.duplicates.inc();
            tracing::debug!(
                message_id = %envelope.message_id,
                consumer_group = %envelope.consumer_group,
                "Duplicate delivery absorbed"
            );
            return Ok(ProcessOutcome::Duplicate);
        }

        let message = ConsumerMessage::from(envelope);
        match self.handler.handle(&message).await {
            Ok(()) => {
                let row = self.processed_row(envelope);
                let first = self.store.record_processed(&row).await?;
                if !first {
                    tracing::debug!(
                        message_id = %envelope.message_id,
                        "Processed row already present (concurrent duplicate)"
                    );
                }
                self.acker.acknowledge(&success_ack(envelope)).await?;
                self.metrics.processed.inc();
                tracing::info!(
                    message_id = %envelope.message_id,
                    topic = %envelope.topic,
                    consumer_group = %envelope.consumer_group,
                    is_retry = envelope.is_retry,
                    "Message processed"
                );
                Ok(ProcessOutcome::Processed)
            }
            Err(e) => {
                let error = e.to_string();
                self.store
                    .record_failure(&self.failed_row(envelope, &error))
                    .await?;
                self.acker
                    .acknowledge(&failure_ack(envelope, &error))
                    .await?;
                self.metrics.failed.inc();
                tracing::warn!(
                    message_id = %envelope.message_id,
                    topic = %envelope.topic,
                    error = %error,
                    "Message processing failed"
                );
                Ok(ProcessOutcome::Failed)
            }
        }
    }

    fn processed_row(&self, envelope: &MessageEnvelope) -> ProcessedMessage {
        ProcessedMessage {
            message_id: envelope.message_id,
            consumer_group: envelope.consumer_group.clone(),
            topic: envelope.topic.clone(),
            processed_at: Utc::now(),
            payload: Some(envelope.payload.clone()),
            producer_service_id: envelope.producer_service_id.clone(),
            producer_instance_id: envelope.producer_instance_id.clone(),
            consumer_service_id: self.identity.service_id.clone(),
            consumer_instance_id: self.identity.instance_id.clone(),
            idempotency_key: envelope.idempotency_key.clone(),
        }
    }

    fn failed_row(&self, envelope: &MessageEnvelope, error: &str) -> FailedMessage {
        FailedMessage {
            id: Uuid::new_v4(),
            message_id: envelope.message_id,
            consumer_group: envelope.consumer_group.clone(),
            topic: envelope.topic.clone(),
            payload: Some(envelope.payload.clone()),
            error_message: Some(error.to_string()),
            failed_at: Utc::now(),
            retry_count: envelope.retry_count,
            producer_service_id: envelope.producer_service_id.clone(),
            producer_instance_id: envelope.producer_instance_id.clone(),
            consumer_service_id: self.identity.service_id.clone(),
            consumer_instance_id: self.identity.instance_id.clone(),
            idempotency_key: envelope.idempotency_key.clone(),
        }
    }
}

fn success_ack(envelope: &MessageEnvelope) -> AcknowledgmentRequest {
    AcknowledgmentRequest {
        message_id: envelope.message_id,
        consumer_group: envelope.consumer_group.clone(),
        success: true,
        error_message: None,
    }
}

fn failure_ack(envelope: &MessageEnvelope, error: &str) -> AcknowledgmentRequest {
    AcknowledgmentRequest {
        message_id: envelope.message_id,
        consumer_group: envelope.consumer_group.clone(),
        success: false,
        error_message: Some(error.to_string()),
    }
}

/// One long-lived poll loop per (group, topics) assignment.
///
/// If the inner loop throws, the task logs and restarts after a cooldown
/// unless shutdown has been requested.
pub async fn run_poll_loop(
    processor: Arc<MessageProcessor>,
    config: Arc<Config>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    loop {
        let result = poll_until_error(&processor, &config, &mut shutdown).await;

        match result {
            Ok(()) => {
                tracing::info!("Poll loop stopped on shutdown signal");
                return;
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    restart_delay_secs = config.poll_restart_delay_secs,
                    "Poll loop crashed; restarting after cooldown"
                );
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(config.poll_restart_delay_secs)) => {}
            _ = shutdown.recv() => {
                tracing::info!("Shutdown requested during poll-loop cooldown");
                return;
            }
        }
    }
}

async fn poll_until_error(
    processor: &MessageProcessor,
    config: &Config,
    shutdown: &mut tokio::sync::broadcast::Receiver<()>,
) -> Result<(), AppError> {
    let subscriber = BrokerSubscriber::subscribe(
        &config.kafka_brokers,
        &config.consumer_group,
        &config.topics,
    )?;

    tracing::info!(
        consumer_group = %config.consumer_group,
        topics = ?config.topics,
        "Consumer subscribed"
    );

    loop {
        tokio::select! {
            received = subscriber.recv() => {
                match received {
                    Ok(envelope) => {
                        match processor.process_envelope(&envelope).await {
                            Ok(_) => {
                                // Outcome is durable (or the skip is deliberate):
                                // safe to advance the broker offset.
                                if let Err(e) = subscriber.ack() {
                                    tracing::warn!(error = %e, "Broker offset commit failed");
                                }
                            }
                            Err(e) => {
                                // Leave the offset uncommitted; the record is
                                // re-delivered after restart/rebalance and the
                                // producer retry scan covers the meantime.
                                tracing::error!(
                                    message_id = %envelope.message_id,
                                    error = %e,
                                    "Processing aborted; offset not committed"
                                );
                            }
                        }
                    }
                    Err(e @ (BrokerError::Deserialize(_) | BrokerError::Payload(_))) => {
                        // Poison message: record the fact and move on so the
                        // partition cannot wedge.
                        tracing::warn!(error = %e, "Skipping undecodable record");
                        if let Err(e) = subscriber.ack() {
                            tracing::warn!(error = %e, "Broker offset commit failed");
                        }
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            _ = shutdown.recv() => {
                return Ok(());
            }
        }
    }
}
