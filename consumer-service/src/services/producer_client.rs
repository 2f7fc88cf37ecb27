//! HTTP client for the producer's control surface: registration, heartbeats
//! and acknowledgments.

use std::time::Duration;

use message_schema::{AcknowledgmentRequest, HeartbeatRequest, RegisterAgentRequest};
use tracing::{info, warn};

use crate::error::AppError;

#[derive(Clone)]
pub struct ProducerClient {
    http: reqwest::Client,
    base_url: String,
}

impl ProducerClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn register(&self, request: &RegisterAgentRequest) -> Result<(), AppError> {
        let response = self
            .http
            .post(self.url("/api/agents/consumers/register"))
            .json(request)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::StartServer(format!(
                "consumer registration rejected: {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Registration with exponential backoff. Exhaustion is fatal at
    /// startup: a consumer the producer cannot route retries to is useless.
    pub async fn register_with_retry(
        &self,
        request: &RegisterAgentRequest,
        max_attempts: u32,
    ) -> Result<(), AppError> {
        let mut last_error = None;
        for attempt in 0..max_attempts {
            match self.register(request).await {
                Ok(()) => {
                    info!(
                        service_id = %request.service_id,
                        attempt = attempt + 1,
                        "Consumer registered with producer"
                    );
                    return Ok(());
                }
                Err(e) => {
                    let backoff = Duration::from_secs(2u64.pow(attempt.min(5)));
                    warn!(
                        error = %e,
                        attempt = attempt + 1,
                        max_attempts,
                        backoff_secs = backoff.as_secs(),
                        "Consumer registration failed"
                    );
                    last_error = Some(e);
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AppError::StartServer("consumer registration exhausted".into())
        }))
    }

    pub async fn heartbeat(&self, request: &HeartbeatRequest) -> Result<(), AppError> {
        let response = self
            .http
            .post(self.url("/api/agents/consumers/heartbeat"))
            .json(request)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "heartbeat rejected: {}",
                response.status()
            )));
        }
        Ok(())
    }

    pub async fn acknowledge(&self, request: &AcknowledgmentRequest) -> Result<(), AppError> {
        let response = self
            .http
            .post(self.url("/api/messages/acknowledge"))
            .json(request)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "acknowledgment for {} rejected: {}",
                request.message_id,
                response.status()
            )));
        }
        Ok(())
    }
}
