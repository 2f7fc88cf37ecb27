use dotenv::dotenv;
use rand::RngCore;
use std::env;

use crate::error::AppError;

/// Identity of this process in the agent registry. Immutable after startup.
#[derive(Debug, Clone)]
pub struct Identity {
    pub service_id: String,
    pub instance_id: String,
}

/// Resolve service/instance identity from the environment.
///
/// `{ROLE}_SERVICE_ID` wins over `SERVICE_ID`; the fallback is
/// `{role}-{hostname}`. `INSTANCE_ID` falls back to
/// `{serviceId}-{randomHex32}` so parallel instances of one service stay
/// distinguishable.
pub fn resolve_identity(role: &str, role_env: &str) -> Identity {
    let hostname = env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    let service_id = env::var(role_env)
        .or_else(|_| env::var("SERVICE_ID"))
        .unwrap_or_else(|_| format!("{}-{}", role, hostname));

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
    pub identity: Identity,

    // Dispatch pipeline
    pub dispatch_interval_secs: u64,
    pub dispatch_batch_size: i64,
    pub message_ttl_hours: i64,

    // Retry scan
    pub retry_scan_interval_secs: u64,

    // Retention
    pub cleanup_interval_secs: u64,
    pub retention_days: i64,

    // Registry plane
    pub heartbeat_interval_secs: u64,
    pub agent_staleness_secs: i64,
    pub agent_termination_secs: i64,

    // Batching intake
    pub batch_flush_interval_secs: u64,
    pub batch_max_size: usize,
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
        let kafka_brokers =
            env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".into());
        let port = env_parse("PORT", 8080u16);
        let identity = resolve_identity("producer", "PRODUCER_SERVICE_ID");
        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://localhost:{}", port));

        Ok(Self {
            database_url,
            kafka_brokers,
            port,
            base_url,
            identity,
            dispatch_interval_secs: env_parse("DISPATCH_INTERVAL_SECS", 5),
            dispatch_batch_size: env_parse("DISPATCH_BATCH_SIZE", 100),
            message_ttl_hours: env_parse("MESSAGE_TTL_HOURS", 24),
            retry_scan_interval_secs: env_parse("RETRY_SCAN_INTERVAL_SECS", 10),
            cleanup_interval_secs: env_parse("CLEANUP_INTERVAL_SECS", 3600),
            retention_days: env_parse("RETENTION_DAYS", 7),
            heartbeat_interval_secs: env_parse("HEARTBEAT_INTERVAL_SECS", 30),
            agent_staleness_secs: env_parse("AGENT_STALENESS_SECS", 90),
            agent_termination_secs: env_parse("AGENT_TERMINATION_SECS", 300),
            batch_flush_interval_secs: env_parse("BATCH_FLUSH_INTERVAL_SECS", 5),
            batch_max_size: env_parse("BATCH_MAX_SIZE", 500),
        })
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            kafka_brokers: "localhost:9092".into(),
            port: 8080,
            base_url: "http://localhost:8080".into(),
            identity: Identity {
                service_id: "producer-test".into(),
                instance_id: "producer-test-0".into(),
            },
            dispatch_interval_secs: 5,
            dispatch_batch_size: 100,
            message_ttl_hours: 24,
            retry_scan_interval_secs: 10,
            cleanup_interval_secs: 3600,
            retention_days: 7,
            heartbeat_interval_secs: 30,
            agent_staleness_secs: 90,
            agent_termination_secs: 300,
            batch_flush_interval_secs: 5,
            batch_max_size: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_id_fallback_is_unique_per_call() {
        env::remove_var("INSTANCE_ID");
        let a = resolve_identity("producer", "PRODUCER_SERVICE_ID_UNSET");
        let b = resolve_identity("producer", "PRODUCER_SERVICE_ID_UNSET");
        assert_ne!(a.instance_id, b.instance_id);
        assert!(a.instance_id.starts_with(&a.service_id));
        // serviceId + "-" + 32 hex chars
        let suffix = a.instance_id.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 32);
    }
}
