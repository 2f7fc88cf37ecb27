use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::db::topic_repo;
use crate::error::AppError;
use crate::models::{RegisterConsumerGroupRequest, RegisterTopicRequest};
use crate::state::AppState;

/// POST /api/topics/register
pub async fn register_topic(
    state: web::Data<AppState>,
    request: web::Json<RegisterTopicRequest>,
) -> Result<HttpResponse, AppError> {
    let request = request.into_inner();
    if request.name.trim().is_empty() {
        return Err(AppError::BadRequest("topic name is required".into()));
    }

    let registered = topic_repo::register_topic(&state.db, &request).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "topic": registered.topic,
        "consumerGroups": registered.groups,
    })))
}

/// POST /api/topics/{id}/consumer-groups
pub async fn add_consumer_group(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    request: web::Json<RegisterConsumerGroupRequest>,
) -> Result<HttpResponse, AppError> {
    let group =
        topic_repo::add_consumer_group(&state.db, path.into_inner(), &request).await?;
    Ok(HttpResponse::Ok().json(group))
}

/// DELETE /api/topics/{id}
pub async fn deactivate_topic(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    if !topic_repo::deactivate_topic(&state.db, id).await? {
        return Err(AppError::NotFound(format!("topic {} not found", id)));
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({"deactivated": true})))
}

/// DELETE /api/topics/consumer-groups/{id}
pub async fn deactivate_consumer_group(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    if !topic_repo::deactivate_consumer_group(&state.db, id).await? {
        return Err(AppError::NotFound(format!(
            "consumer group {} not found",
            id
        )));
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({"deactivated": true})))
}

/// GET /api/topics/{name}
pub async fn get_topic(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let name = path.into_inner();
    let topic = topic_repo::get_topic_by_name(&state.db, &name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("topic '{}' not found", name)))?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "topic": topic.topic,
        "consumerGroups": topic.groups,
    })))
}

/// GET /api/topics
pub async fn list_topics(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let topics = topic_repo::list_topics(&state.db).await?;
    Ok(HttpResponse::Ok().json(topics))
}
