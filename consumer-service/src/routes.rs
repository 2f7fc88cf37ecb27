//! Route configuration for the consumer surface.

use actix_web::{web, HttpResponse};

use crate::handlers::consumer;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics_handler)).service(
        web::scope("/api/consumer")
            .route("/health", web::get().to(consumer::health))
            .route(
                "/processed/{group}",
                web::get().to(consumer::list_processed),
            )
            .route("/failed/{group}", web::get().to(consumer::list_failed))
            .route("/test-process", web::post().to(consumer::test_process)),
    );
}

/// Prometheus text exposition
async fn metrics_handler() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(crate::metrics::gather_metrics())
}
