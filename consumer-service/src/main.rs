use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use consumer_service::services::handler::NoopHandler;
use consumer_service::services::processor::{MessageProcessor, SqlxOutcomeStore};
use consumer_service::services::producer_client::ProducerClient;
use consumer_service::services::{heartbeat, processor};
use consumer_service::{config, db, metrics, migrations, routes, state::AppState};
use message_schema::RegisterAgentRequest;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const REGISTRATION_ATTEMPTS: u32 = 6;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = match config::Config::from_env() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            tracing::error!("Configuration loading failed: {:#}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        service_id = %cfg.identity.service_id,
        instance_id = %cfg.identity.instance_id,
        consumer_group = %cfg.consumer_group,
        topics = ?cfg.topics,
        "Starting consumer-service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pool = match db::init_pool(&cfg.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Database connection failed: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = migrations::run_all(&pool).await {
        tracing::error!("Database migrations failed: {:#}", e);
        std::process::exit(1);
    }

    let consumer_metrics = metrics::ConsumerMetrics::new("consumer-service");
    let handler = Arc::new(NoopHandler);
    let client = ProducerClient::new(&cfg.producer_base_url);

    // Register with the producer's agent registry; exhaustion is fatal
    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    let ip = std::env::var("POD_IP").unwrap_or_else(|_| "127.0.0.1".to_string());
    let registration = RegisterAgentRequest {
        service_id: cfg.identity.service_id.clone(),
        instance_id: cfg.identity.instance_id.clone(),
        service_name: "consumer-service".to_string(),
        host: hostname,
        ip,
        port: cfg.port,
        base_url: cfg.base_url.clone(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
        metadata: None,
        assigned_consumer_groups: vec![cfg.consumer_group.clone()],
        assigned_topics: cfg.topics.clone(),
    };
    if let Err(e) = client
        .register_with_retry(&registration, REGISTRATION_ATTEMPTS)
        .await
    {
        tracing::error!("Consumer registration exhausted: {:#}", e);
        std::process::exit(1);
    }

    let message_processor = Arc::new(MessageProcessor::new(
        Arc::new(SqlxOutcomeStore::new(pool.clone())),
        Arc::new(client.clone()),
        handler.clone(),
        cfg.identity.clone(),
        consumer_metrics.clone(),
    ));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    // One poll loop per (group, topics) assignment
    let poll_handle = tokio::spawn(processor::run_poll_loop(
        message_processor,
        cfg.clone(),
        shutdown_tx.subscribe(),
    ));

    let heartbeat_handle = tokio::spawn(heartbeat::run_heartbeat_loop(
        client,
        cfg.clone(),
        shutdown_tx.subscribe(),
    ));

    let app_state = AppState {
        db: pool,
        config: cfg.clone(),
        handler,
        metrics: consumer_metrics,
    };

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "Consumer REST API listening");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .configure(routes::configure_routes)
            .wrap(TracingLogger::default())
    })
    .bind(&bind_addr)?
    .run();

    let result = server.await;

    tracing::info!("HTTP server stopped; draining poll and heartbeat loops");
    let _ = shutdown_tx.send(());
    for handle in [poll_handle, heartbeat_handle] {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Background task panicked during drain");
        }
    }

    result
}
