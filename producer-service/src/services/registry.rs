//! Agent registry operations: selection heuristics, forced health checks
//! and registry GC.

use chrono::Utc;
use message_schema::{HealthStatus, ServiceKind};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::agent_repo;
use crate::error::AppError;
use crate::models::agent::{AgentCandidate, HealthCheckRecord, ServiceAgent};

/// Lookback window for the recent-failure and heartbeat-frequency signals.
const SIGNAL_WINDOW_SECS: i64 = 300;

fn pending_load(health_data: Option<&serde_json::Value>) -> i64 {
    health_data
        .and_then(|data| data.get("pendingMessagesCount"))
        .and_then(|value| value.as_i64())
        .unwrap_or(0)
}

/// Join each agent with its recent failure count and last reported load.
/// The registry is small, so per-agent lookups beat a correlated query.
async fn build_candidates(
    pool: &PgPool,
    agents: Vec<ServiceAgent>,
) -> Result<Vec<AgentCandidate>, sqlx::Error> {
    let mut candidates = Vec::with_capacity(agents.len());
    for agent in agents {
        let recent_failures =
            agent_repo::recent_failure_count(pool, &agent.service_id, SIGNAL_WINDOW_SECS).await?;
        let health_data = agent_repo::latest_health_data(pool, &agent.service_id).await?;
        candidates.push(AgentCandidate {
            recent_failures,
            pending_load: pending_load(health_data.as_ref()),
            agent,
        });
    }
    Ok(candidates)
}

fn pick_best(mut candidates: Vec<AgentCandidate>) -> Option<ServiceAgent> {
    candidates.sort_by_key(AgentCandidate::selection_key);
    candidates.into_iter().next().map(|c| c.agent)
}

/// Active consumers subscribed to the given group.
pub async fn healthy_consumers_for_group(
    pool: &PgPool,
    group: &str,
    staleness_secs: i64,
) -> Result<Vec<ServiceAgent>, sqlx::Error> {
    let agents = agent_repo::list_active(pool, ServiceKind::Consumer, staleness_secs).await?;
    Ok(agents
        .into_iter()
        .filter(|agent| agent.assigned_consumer_groups.iter().any(|g| g == group))
        .collect())
}

/// Best consumer for a group per the tie-break heuristic: fewest recent
/// failures, then lowest reported load, then freshest heartbeat.
pub async fn select_consumer_for_group(
    pool: &PgPool,
    group: &str,
    staleness_secs: i64,
) -> Result<Option<ServiceAgent>, sqlx::Error> {
    let agents = healthy_consumers_for_group(pool, group, staleness_secs).await?;
    let candidates = build_candidates(pool, agents).await?;
    Ok(pick_best(candidates))
}

/// Best consumer polling the given topic.
pub async fn best_consumer_for_topic(
    pool: &PgPool,
    topic: &str,
    staleness_secs: i64,
) -> Result<Option<ServiceAgent>, sqlx::Error> {
    let agents = agent_repo::list_active(pool, ServiceKind::Consumer, staleness_secs).await?;
    let subscribed: Vec<ServiceAgent> = agents
        .into_iter()
        .filter(|agent| agent.assigned_topics.iter().any(|t| t == topic))
        .collect();
    let candidates = build_candidates(pool, subscribed).await?;
    Ok(pick_best(candidates))
}

/// Producer with the highest heartbeat frequency inside the signal window.
pub async fn healthiest_producer(
    pool: &PgPool,
    staleness_secs: i64,
) -> Result<Option<ServiceAgent>, sqlx::Error> {
    let agents = agent_repo::list_active(pool, ServiceKind::Producer, staleness_secs).await?;

    let mut best: Option<(i64, ServiceAgent)> = None;
    for agent in agents {
        let beats =
            agent_repo::heartbeat_count(pool, &agent.service_id, SIGNAL_WINDOW_SECS).await?;
        let better = match &best {
            None => true,
            Some((best_beats, best_agent)) => {
                beats > *best_beats
                    || (beats == *best_beats && agent.last_heartbeat > best_agent.last_heartbeat)
            }
        };
        if better {
            best = Some((beats, agent));
        }
    }

    Ok(best.map(|(_, agent)| agent))
}

/// Producer with the lowest reported pending queue depth.
pub async fn least_loaded_producer(
    pool: &PgPool,
    staleness_secs: i64,
) -> Result<Option<ServiceAgent>, sqlx::Error> {
    let agents = agent_repo::list_active(pool, ServiceKind::Producer, staleness_secs).await?;
    let candidates = build_candidates(pool, agents).await?;
    Ok(pick_best(candidates))
}

/// Probe an agent's health endpoint and append the observation to its
/// history.
pub async fn force_health_check(
    pool: &PgPool,
    agent: &ServiceAgent,
) -> Result<HealthCheckRecord, AppError> {
    let path = match agent.service_kind {
        ServiceKind::Producer => "/api/messages/health",
        ServiceKind::Consumer => "/api/consumer/health",
    };
    let url = format!("{}{}", agent.base_url.trim_end_matches('/'), path);

    let started = std::time::Instant::now();
    let probe = reqwest::Client::new()
        .get(&url)
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await;
    let elapsed_ms = started.elapsed().as_millis() as i64;

    let (status, message) = match probe {
        Ok(response) if response.status().is_success() => (HealthStatus::Healthy, None),
        Ok(response) => (
            HealthStatus::Degraded,
            Some(format!("health probe returned {}", response.status())),
        ),
        Err(e) => (HealthStatus::Unhealthy, Some(format!("health probe failed: {}", e))),
    };

    let record = HealthCheckRecord {
        id: Uuid::new_v4(),
        service_id: agent.service_id.clone(),
        instance_id: agent.instance_id.clone(),
        service_kind: agent.service_kind,
        status,
        checked_at: Utc::now(),
        status_message: message,
        response_time_ms: elapsed_ms,
        health_data: None,
    };

    agent_repo::insert_health_check(pool, &record).await?;

    tracing::info!(
        service_id = %agent.service_id,
        status = ?record.status,
        response_time_ms = elapsed_ms,
        "Forced health check recorded"
    );

    Ok(record)
}

/// Registry GC: terminate agents silent past the threshold.
pub async fn cleanup_inactive_agents(
    pool: &PgPool,
    termination_threshold_secs: i64,
) -> Result<u64, sqlx::Error> {
    let terminated = agent_repo::terminate_stale(pool, termination_threshold_secs).await?;
    if terminated > 0 {
        tracing::info!(count = terminated, "Terminated inactive agents");
    }
    Ok(terminated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_load_parses_count() {
        let data = serde_json::json!({"pendingMessagesCount": 42});
        assert_eq!(pending_load(Some(&data)), 42);
    }

    #[test]
    fn test_pending_load_defaults_to_zero() {
        assert_eq!(pending_load(None), 0);
        let data = serde_json::json!({"other": true});
        assert_eq!(pending_load(Some(&data)), 0);
        let data = serde_json::json!({"pendingMessagesCount": "not-a-number"});
        assert_eq!(pending_load(Some(&data)), 0);
    }
}
