use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{failed_repo, processed_repo};
use crate::error::AppError;
use crate::models::ConsumerMessage;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

#[derive(Serialize)]
struct HealthResponse {
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "Service")]
    service: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

fn clamp_limit(query: &ListQuery) -> i64 {
    query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

/// GET /api/consumer/health
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let status = match sqlx::query("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => "Healthy",
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            "Unhealthy"
        }
    };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        service: "consumer-service".to_string(),
    })
}

/// GET /api/consumer/processed/{group}?limit=N
pub async fn list_processed(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let group = path.into_inner();
    let limit = clamp_limit(&query);
    let messages = processed_repo::list_by_group(&state.db, &group, limit).await?;
    let total = processed_repo::count_by_group(&state.db, &group).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "consumerGroup": group,
        "total": total,
        "messages": messages,
    })))
}

/// GET /api/consumer/failed/{group}?limit=N
pub async fn list_failed(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let group = path.into_inner();
    let limit = clamp_limit(&query);
    let messages = failed_repo::list_by_group(&state.db, &group, limit).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "consumerGroup": group,
        "messages": messages,
    })))
}

/// POST /api/consumer/test-process — invoke the processor callback directly,
/// bypassing the broker and the stores.
pub async fn test_process(
    state: web::Data<AppState>,
    message: web::Json<ConsumerMessage>,
) -> Result<HttpResponse, AppError> {
    let message = message.into_inner();
    match state.handler.handle(&message).await {
        Ok(()) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "messageId": message.message_id,
            "outcome": "processed",
        }))),
        Err(e) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "messageId": message.message_id,
            "outcome": "failed",
            "error": e.to_string(),
        }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_clamping() {
        assert_eq!(clamp_limit(&ListQuery { limit: None }), 50);
        assert_eq!(clamp_limit(&ListQuery { limit: Some(10) }), 10);
        assert_eq!(clamp_limit(&ListQuery { limit: Some(0) }), 1);
        assert_eq!(clamp_limit(&ListQuery { limit: Some(10_000) }), 500);
    }
}
