//! Route configuration for the producer control/data surface.

use actix_web::{web, HttpResponse};

use crate::handlers::{agents, messages, topics};

/// Configure all routes for the application. Literal segments are registered
/// before parameterized ones so `/producers/healthiest` never matches
/// `/producers/{id}`.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics_handler))
        .service(
            web::scope("/api/messages")
                .route("/send", web::post().to(messages::send))
                .route("/acknowledge", web::post().to(messages::acknowledge))
                .route("/health", web::get().to(messages::health))
                .route("/stats", web::get().to(messages::stats))
                .route("/{id}", web::get().to(messages::get_message)),
        )
        .service(
            web::scope("/api/agents")
                .route("/discover", web::get().to(agents::discover))
                .route("/cleanup", web::post().to(agents::cleanup))
                .route(
                    "/health-check/{service_id}",
                    web::post().to(agents::force_health_check),
                )
                .route(
                    "/producers/register",
                    web::post().to(agents::register_producer),
                )
                .route(
                    "/producers/heartbeat",
                    web::post().to(agents::heartbeat_producer),
                )
                .route(
                    "/producers/healthiest",
                    web::get().to(agents::healthiest_producer),
                )
                .route(
                    "/producers/least-loaded",
                    web::get().to(agents::least_loaded_producer),
                )
                .route("/producers", web::get().to(agents::list_producers))
                .route("/producers/{service_id}", web::get().to(agents::get_producer))
                .route(
                    "/producers/{service_id}",
                    web::delete().to(agents::deactivate_producer),
                )
                .route(
                    "/consumers/register",
                    web::post().to(agents::register_consumer),
                )
                .route(
                    "/consumers/heartbeat",
                    web::post().to(agents::heartbeat_consumer),
                )
                .route(
                    "/consumers/for-group/{group}",
                    web::get().to(agents::consumers_for_group),
                )
                .route(
                    "/consumers/for-topic/{topic}",
                    web::get().to(agents::best_consumer_for_topic),
                )
                .route("/consumers", web::get().to(agents::list_consumers))
                .route("/consumers/{service_id}", web::get().to(agents::get_consumer))
                .route(
                    "/consumers/{service_id}",
                    web::delete().to(agents::deactivate_consumer),
                ),
        )
        .service(
            web::scope("/api/topics")
                .route("/register", web::post().to(topics::register_topic))
                .route(
                    "/consumer-groups/{id}",
                    web::delete().to(topics::deactivate_consumer_group),
                )
                .route(
                    "/{id}/consumer-groups",
                    web::post().to(topics::add_consumer_group),
                )
                .route("/{name}", web::get().to(topics::get_topic))
                .route("/{id}", web::delete().to(topics::deactivate_topic))
                .route("", web::get().to(topics::list_topics)),
        );
}

/// Prometheus text exposition
async fn metrics_handler() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(crate::metrics::gather_metrics())
}
