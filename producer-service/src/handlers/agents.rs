use actix_web::{web, HttpResponse};
use message_schema::{
    AgentDescriptor, HeartbeatRequest, RegisterAgentRequest, ServiceKind,
};
use serde::Deserialize;

use crate::db::agent_repo;
use crate::error::AppError;
use crate::services::registry;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTypeQuery {
    pub service_type: Option<String>,
}

fn parse_kind(value: &str) -> Result<ServiceKind, AppError> {
    match value.to_ascii_lowercase().as_str() {
        "producer" => Ok(ServiceKind::Producer),
        "consumer" => Ok(ServiceKind::Consumer),
        other => Err(AppError::BadRequest(format!(
            "unknown serviceType '{}' (expected producer|consumer)",
            other
        ))),
    }
}

fn descriptors(agents: Vec<crate::models::agent::ServiceAgent>) -> Vec<AgentDescriptor> {
    agents.into_iter().map(AgentDescriptor::from).collect()
}

async fn register(
    state: &AppState,
    kind: ServiceKind,
    request: RegisterAgentRequest,
) -> Result<HttpResponse, AppError> {
    if request.service_id.trim().is_empty() || request.instance_id.trim().is_empty() {
        return Err(AppError::BadRequest(
            "serviceId and instanceId are required".into(),
        ));
    }

    let agent = agent_repo::upsert_agent(&state.db, kind, &request).await?;
    tracing::info!(
        service_id = %agent.service_id,
        instance_id = %agent.instance_id,
        kind = %kind,
        "Agent registered"
    );
    Ok(HttpResponse::Ok().json(AgentDescriptor::from(agent)))
}

async fn heartbeat(
    state: &AppState,
    kind: ServiceKind,
    request: HeartbeatRequest,
) -> Result<HttpResponse, AppError> {
    let updated = agent_repo::update_heartbeat(&state.db, kind, &request).await?;
    if !updated {
        return Err(AppError::NotFound(format!(
            "agent {}/{} is not registered",
            request.service_id, request.instance_id
        )));
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({"updated": true})))
}

// --- producers -------------------------------------------------------------

/// POST /api/agents/producers/register
pub async fn register_producer(
    state: web::Data<AppState>,
    request: web::Json<RegisterAgentRequest>,
) -> Result<HttpResponse, AppError> {
    register(&state, ServiceKind::Producer, request.into_inner()).await
}

/// POST /api/agents/producers/heartbeat
pub async fn heartbeat_producer(
    state: web::Data<AppState>,
    request: web::Json<HeartbeatRequest>,
) -> Result<HttpResponse, AppError> {
    heartbeat(&state, ServiceKind::Producer, request.into_inner()).await
}

/// GET /api/agents/producers
pub async fn list_producers(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let agents = agent_repo::list_active(
        &state.db,
        ServiceKind::Producer,
        state.config.agent_staleness_secs,
    )
    .await?;
    Ok(HttpResponse::Ok().json(descriptors(agents)))
}

/// GET /api/agents/producers/healthiest
pub async fn healthiest_producer(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let agent = registry::healthiest_producer(&state.db, state.config.agent_staleness_secs)
        .await?
        .ok_or_else(|| AppError::NotFound("no active producers".into()))?;
    Ok(HttpResponse::Ok().json(AgentDescriptor::from(agent)))
}

/// GET /api/agents/producers/least-loaded
pub async fn least_loaded_producer(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let agent = registry::least_loaded_producer(&state.db, state.config.agent_staleness_secs)
        .await?
        .ok_or_else(|| AppError::NotFound("no active producers".into()))?;
    Ok(HttpResponse::Ok().json(AgentDescriptor::from(agent)))
}

// --- consumers -------------------------------------------------------------

/// POST /api/agents/consumers/register
pub async fn register_consumer(
    state: web::Data<AppState>,
    request: web::Json<RegisterAgentRequest>,
) -> Result<HttpResponse, AppError> {
    register(&state, ServiceKind::Consumer, request.into_inner()).await
}

/// POST /api/agents/consumers/heartbeat
pub async fn heartbeat_consumer(
    state: web::Data<AppState>,
    request: web::Json<HeartbeatRequest>,
) -> Result<HttpResponse, AppError> {
    heartbeat(&state, ServiceKind::Consumer, request.into_inner()).await
}

/// GET /api/agents/consumers
pub async fn list_consumers(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let agents = agent_repo::list_active(
        &state.db,
        ServiceKind::Consumer,
        state.config.agent_staleness_secs,
    )
    .await?;
    Ok(HttpResponse::Ok().json(descriptors(agents)))
}

/// GET /api/agents/consumers/for-group/{group}
pub async fn consumers_for_group(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let group = path.into_inner();
    let agents = registry::healthy_consumers_for_group(
        &state.db,
        &group,
        state.config.agent_staleness_secs,
    )
    .await?;
    Ok(HttpResponse::Ok().json(descriptors(agents)))
}

/// GET /api/agents/consumers/for-topic/{topic}
pub async fn best_consumer_for_topic(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let topic = path.into_inner();
    let agent =
        registry::best_consumer_for_topic(&state.db, &topic, state.config.agent_staleness_secs)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("no active consumer polls topic '{}'", topic))
            })?;
    Ok(HttpResponse::Ok().json(AgentDescriptor::from(agent)))
}

// --- shared ----------------------------------------------------------------

async fn get_agent_of_kind(
    state: &AppState,
    service_id: &str,
    kind: ServiceKind,
) -> Result<crate::models::agent::ServiceAgent, AppError> {
    let agent = agent_repo::get_by_service_id(&state.db, service_id)
        .await?
        .filter(|agent| agent.service_kind == kind)
        .ok_or_else(|| AppError::NotFound(format!("{} '{}' not found", kind, service_id)))?;
    Ok(agent)
}

/// GET /api/agents/producers/{service_id}
pub async fn get_producer(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let agent = get_agent_of_kind(&state, &path.into_inner(), ServiceKind::Producer).await?;
    Ok(HttpResponse::Ok().json(AgentDescriptor::from(agent)))
}

/// GET /api/agents/consumers/{service_id}
pub async fn get_consumer(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let agent = get_agent_of_kind(&state, &path.into_inner(), ServiceKind::Consumer).await?;
    Ok(HttpResponse::Ok().json(AgentDescriptor::from(agent)))
}

async fn deactivate_of_kind(
    state: &AppState,
    service_id: &str,
    kind: ServiceKind,
) -> Result<HttpResponse, AppError> {
    get_agent_of_kind(state, service_id, kind).await?;
    agent_repo::deactivate(&state.db, service_id).await?;
    tracing::info!(service_id = %service_id, kind = %kind, "Agent deactivated");
    Ok(HttpResponse::Ok().json(serde_json::json!({"deactivated": true})))
}

/// DELETE /api/agents/producers/{service_id}
pub async fn deactivate_producer(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    deactivate_of_kind(&state, &path.into_inner(), ServiceKind::Producer).await
}

/// DELETE /api/agents/consumers/{service_id}
pub async fn deactivate_consumer(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    deactivate_of_kind(&state, &path.into_inner(), ServiceKind::Consumer).await
}

/// GET /api/agents/discover?serviceType=
pub async fn discover(
    state: web::Data<AppState>,
    query: web::Query<ServiceTypeQuery>,
) -> Result<HttpResponse, AppError> {
    let kind = match query.service_type.as_deref() {
        Some(value) => Some(parse_kind(value)?),
        None => None,
    };
    let agents = agent_repo::list_all(&state.db, kind).await?;
    Ok(HttpResponse::Ok().json(descriptors(agents)))
}

/// POST /api/agents/health-check/{service_id}?serviceType=
pub async fn force_health_check(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ServiceTypeQuery>,
) -> Result<HttpResponse, AppError> {
    let service_id = path.into_inner();
    let agent = agent_repo::get_by_service_id(&state.db, &service_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("agent '{}' not found", service_id)))?;

    if let Some(value) = query.service_type.as_deref() {
        let kind = parse_kind(value)?;
        if kind != agent.service_kind {
            return Err(AppError::BadRequest(format!(
                "agent '{}' is a {}, not a {}",
                service_id, agent.service_kind, kind
            )));
        }
    }

    let record = registry::force_health_check(&state.db, &agent).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// POST /api/agents/cleanup
pub async fn cleanup(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let terminated =
        registry::cleanup_inactive_agents(&state.db, state.config.agent_termination_secs).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"terminated": terminated})))
}
