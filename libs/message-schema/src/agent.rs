use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of the platform an agent belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "service_kind", rename_all = "lowercase")]
pub enum ServiceKind {
    Producer,
    Consumer,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Producer => "producer",
            ServiceKind::Consumer => "consumer",
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry status of a service agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "agent_status", rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Inactive,
    Unhealthy,
    Maintenance,
    Terminated,
}

/// Point-in-time health reported with a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "health_status", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

/// Upsert request for the agent registry, sent at startup by both sides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgentRequest {
    pub service_id: String,
    pub instance_id: String,
    pub service_name: String,
    pub host: String,
    pub ip: String,
    pub port: u16,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Consumer groups this instance is subscribed to (consumer side only)
    #[serde(default)]
    pub assigned_consumer_groups: Vec<String>,
    /// Topics this instance polls (consumer side only)
    #[serde(default)]
    pub assigned_topics: Vec<String>,
}

/// Periodic heartbeat refreshing `last_heartbeat` and appending a health
/// observation to the agent's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub service_id: String,
    pub instance_id: String,
    pub status: AgentStatus,
    pub health_status: HealthStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default)]
    pub response_time_ms: i64,
    /// Opaque string-keyed health map (e.g. `pendingMessagesCount`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_data: Option<serde_json::Value>,
}

/// Registry view of an agent returned by the discovery and selection
/// endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDescriptor {
    pub id: Uuid,
    pub service_id: String,
    pub instance_id: String,
    pub service_kind: ServiceKind,
    pub service_name: String,
    pub host: String,
    pub ip: String,
    pub port: i32,
    pub base_url: String,
    pub status: AgentStatus,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub assigned_consumer_groups: Vec<String>,
    pub assigned_topics: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_kind_display() {
        assert_eq!(ServiceKind::Producer.to_string(), "producer");
        assert_eq!(ServiceKind::Consumer.to_string(), "consumer");
    }

    #[test]
    fn test_status_wire_casing() {
        assert_eq!(
            serde_json::to_string(&AgentStatus::Terminated).unwrap(),
            "\"terminated\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
    }

    #[test]
    fn test_register_request_defaults() {
        // Assignment lists are optional on the wire; producers omit them
        let json = r#"{
            "serviceId": "producer-a",
            "instanceId": "producer-a-1",
            "serviceName": "courier-producer",
            "host": "node-1",
            "ip": "10.0.0.5",
            "port": 8080,
            "baseUrl": "http://node-1:8080"
        }"#;

        let req: RegisterAgentRequest = serde_json::from_str(json).unwrap();
        assert!(req.assigned_consumer_groups.is_empty());
        assert!(req.assigned_topics.is_empty());
        assert!(req.metadata.is_none());
    }

    #[test]
    fn test_heartbeat_round_trip() {
        let hb = HeartbeatRequest {
            service_id: "consumer-a".to_string(),
            instance_id: "consumer-a-1".to_string(),
            status: AgentStatus::Active,
            health_status: HealthStatus::Healthy,
            status_message: None,
            response_time_ms: 12,
            health_data: Some(serde_json::json!({"pendingMessagesCount": 4})),
        };

        let decoded: HeartbeatRequest =
            serde_json::from_str(&serde_json::to_string(&hb).unwrap()).unwrap();
        assert_eq!(decoded.health_data.unwrap()["pendingMessagesCount"], 4);
    }
}
