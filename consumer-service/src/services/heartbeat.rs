//! Heartbeat loop posting this consumer's liveness to the producer's
//! registry. Registry unavailability is logged and never stops the loop —
//! the poll loops keep consuming regardless.

use std::time::Duration;

use message_schema::{AgentStatus, HealthStatus, HeartbeatRequest};
use tokio::time::{interval, MissedTickBehavior};

use crate::config::Config;
use crate::services::producer_client::ProducerClient;

pub async fn run_heartbeat_loop(
    client: ProducerClient,
    config: std::sync::Arc<Config>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let mut ticker = interval(Duration::from_secs(config.heartbeat_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut consecutive_failures = 0u32;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let request = HeartbeatRequest {
                    service_id: config.identity.service_id.clone(),
                    instance_id: config.identity.instance_id.clone(),
                    status: AgentStatus::Active,
                    health_status: HealthStatus::Healthy,
                    status_message: None,
                    response_time_ms: 0,
                    health_data: Some(serde_json::json!({
                        "consumerGroup": config.consumer_group,
                        "topics": config.topics,
                    })),
                };

                match client.heartbeat(&request).await {
                    Ok(()) => {
                        if consecutive_failures > 0 {
                            tracing::info!(
                                recovered_after = consecutive_failures,
                                "Heartbeat recovered"
                            );
                            consecutive_failures = 0;
                        }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        tracing::warn!(
                            error = %e,
                            consecutive_failures,
                            "Heartbeat failed; registry may be unavailable"
                        );
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Heartbeat loop stopping");
                return;
            }
        }
    }
}
