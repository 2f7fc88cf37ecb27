use dotenv::dotenv;
use rand::RngCore;
use std::env;

use crate::error::AppError;

/// Identity of this consumer instance. Immutable after startup.
#[derive(Debug, Clone)]
pub struct Identity {
    pub service_id: String,
    pub instance_id: String,
}

/// `CONSUMER_SERVICE_ID` wins over `SERVICE_ID`; fallback
/// `consumer-{hostname}`. `INSTANCE_ID` falls back to
/// `{serviceId}-{randomHex32}`.
pub fn resolve_identity() -> Identity {
    let hostname = env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    let service_id = env::var("CONSUMER_SERVICE_ID")
        .or_else(|_| env::var("SERVICE_ID"))
        .unwrap_or_else(|_| format!("consumer-{}", hostname));

    let instance_id = env::var("INSTANCE_ID").unwrap_or_else(|_| {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        format!("{}-{}", service_id, hex::encode(bytes))
    });

    Identity {
        service_id,
        instance_id,
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub kafka_brokers: String,
    pub port: u16,
    pub base_url: String,
    pub producer_base_url: String,
    pub identity: Identity,

    /// Kafka consumer group this instance joins
    pub consumer_group: String,
    /// Topics polled under that group
    pub topics: Vec<String>,

    pub heartbeat_interval_secs: u64,
    /// Cooldown before a crashed poll loop restarts
    pub poll_restart_delay_secs: u64,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Configuration("DATABASE_URL missing".into()))?;
        let producer_base_url = env::var("PRODUCER_BASE_URL")
            .map_err(|_| AppError::Configuration("PRODUCER_BASE_URL missing".into()))?;
        let consumer_group = env::var("KAFKA_CONSUMER_GROUP")
            .map_err(|_| AppError::Configuration("KAFKA_CONSUMER_GROUP missing".into()))?;

        let topics_raw = env::var("KAFKA_TOPICS")
            .map_err(|_| AppError::Configuration("KAFKA_TOPICS missing".into()))?;
        let topics: Vec<String> = topics_raw
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        if topics.is_empty() {
            return Err(AppError::Configuration(
                "KAFKA_TOPICS must name at least one topic".into(),
            ));
        }

        let kafka_brokers =
            env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".into());
        let port = env_parse("PORT", 8081u16);
        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://localhost:{}", port));

        Ok(Self {
            database_url,
            kafka_brokers,
            port,
            base_url,
            producer_base_url,
            identity: resolve_identity(),
            consumer_group,
            topics,
            heartbeat_interval_secs: env_parse("HEARTBEAT_INTERVAL_SECS", 30),
            poll_restart_delay_secs: env_parse("POLL_RESTART_DELAY_SECS", 30),
        })
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            kafka_brokers: "localhost:9092".into(),
            port: 8081,
            base_url: "http://localhost:8081".into(),
            producer_base_url: "http://localhost:8080".into(),
            identity: Identity {
                service_id: "consumer-test".into(),
                instance_id: "consumer-test-0".into(),
            },
            consumer_group: "order-processor".into(),
            topics: vec!["orders".into()],
            heartbeat_interval_secs: 30,
            poll_restart_delay_secs: 30,
        }
    }
}
