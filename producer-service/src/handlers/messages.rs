use actix_web::{web, HttpResponse};
use chrono::Utc;
use message_schema::AcknowledgmentRequest;
use serde::Serialize;
use uuid::Uuid;

use crate::db::outbox_repo;
use crate::error::AppError;
use crate::services::{acknowledgment, message_service};
use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "Service")]
    service: String,
}

/// POST /api/messages/send
pub async fn send(
    state: web::Data<AppState>,
    request: web::Json<crate::models::SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let response = message_service::send_message(&state, request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /api/messages/acknowledge
pub async fn acknowledge(
    state: web::Data<AppState>,
    request: web::Json<AcknowledgmentRequest>,
) -> Result<HttpResponse, AppError> {
    let outcome =
        acknowledgment::apply_acknowledgment(&state.db, &request, &state.metrics).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "messageId": request.message_id,
        "outcome": match outcome {
            acknowledgment::AckOutcome::Acknowledged => "acknowledged",
            acknowledgment::AckOutcome::Failed => "failed",
        },
    })))
}

/// GET /api/messages/{id}
pub async fn get_message(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let record = outbox_repo::get_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("message {} not found", id)))?;
    Ok(HttpResponse::Ok().json(record))
}

/// GET /api/messages/stats
pub async fn stats(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let stats = outbox_repo::stats(&state.db).await?;
    Ok(HttpResponse::Ok().json(stats))
}

/// GET /api/messages/health
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    // Health degrades with database reachability; the broker is probed by
    // dispatch and reported through metrics instead.
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
        service: "producer-service".to_string(),
    })
}
