use chrono::{DateTime, Utc};
use message_schema::{AgentDescriptor, AgentStatus, HealthStatus, ServiceKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Registry row for a producer or consumer instance.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAgent {
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
    pub version: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub assigned_consumer_groups: Vec<String>,
    pub assigned_topics: Vec<String>,
}

impl From<ServiceAgent> for AgentDescriptor {
    fn from(agent: ServiceAgent) -> Self {
        AgentDescriptor {
            id: agent.id,
            service_id: agent.service_id,
            instance_id: agent.instance_id,
            service_kind: agent.service_kind,
            service_name: agent.service_name,
            host: agent.host,
            ip: agent.ip,
            port: agent.port,
            base_url: agent.base_url,
            status: agent.status,
            started_at: agent.started_at,
            last_heartbeat: agent.last_heartbeat,
            version: agent.version,
            metadata: agent.metadata,
            assigned_consumer_groups: agent.assigned_consumer_groups,
            assigned_topics: agent.assigned_topics,
        }
    }
}

/// Append-only health observation attached to an agent.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckRecord {
    pub id: Uuid,
    pub service_id: String,
    pub instance_id: String,
    pub service_kind: ServiceKind,
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    pub status_message: Option<String>,
    pub response_time_ms: i64,
    pub health_data: Option<serde_json::Value>,
}

/// Selection view produced by the registry queries: an agent joined with its
/// recent failure count and last reported queue depth.
#[derive(Debug, Clone)]
pub struct AgentCandidate {
    pub agent: ServiceAgent,
    pub recent_failures: i64,
    pub pending_load: i64,
}

impl AgentCandidate {
    /// Ordering key per the selection heuristic: fewer recent failures,
    /// then lower load, then most recent heartbeat.
    pub fn selection_key(&self) -> (i64, i64, i64) {
        (
            self.recent_failures,
            self.pending_load,
            -self.agent.last_heartbeat.timestamp_millis(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(failures: i64, load: i64, heartbeat_offset_secs: i64) -> AgentCandidate {
        AgentCandidate {
            agent: ServiceAgent {
                id: Uuid::new_v4(),
                service_id: format!("svc-{}", Uuid::new_v4()),
                instance_id: format!("inst-{}", Uuid::new_v4()),
                service_kind: ServiceKind::Consumer,
                service_name: "courier-consumer".to_string(),
                host: "node".to_string(),
                ip: "10.0.0.1".to_string(),
                port: 8081,
                base_url: "http://node:8081".to_string(),
                status: AgentStatus::Active,
                started_at: Utc::now(),
                last_heartbeat: Utc::now() - chrono::Duration::seconds(heartbeat_offset_secs),
                version: None,
                metadata: None,
                assigned_consumer_groups: vec!["g".to_string()],
                assigned_topics: vec!["t".to_string()],
            },
            recent_failures: failures,
            pending_load: load,
        }
    }

    #[test]
    fn test_selection_prefers_fewer_failures() {
        let mut candidates = vec![candidate(3, 0, 0), candidate(0, 100, 60)];
        candidates.sort_by_key(AgentCandidate::selection_key);
        assert_eq!(candidates[0].recent_failures, 0);
    }

    #[test]
    fn test_selection_breaks_ties_on_load_then_heartbeat() {
        let fresh = candidate(1, 5, 0);
        let stale = candidate(1, 5, 120);
        let light = candidate(1, 2, 300);

        let mut candidates = vec![stale.clone(), fresh.clone(), light.clone()];
        candidates.sort_by_key(AgentCandidate::selection_key);

        // Lower load wins outright, then the fresher heartbeat
        assert_eq!(candidates[0].pending_load, 2);
        assert_eq!(candidates[1].agent.instance_id, fresh.agent.instance_id);
    }
}
