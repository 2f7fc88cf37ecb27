use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use kafka_broker::KafkaMessagePublisher;
use message_schema::{RegisterAgentRequest, ServiceKind};
use producer_service::services::batch_queue::BatchQueue;
use producer_service::{config, db, jobs, metrics, migrations, routes, state::AppState};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

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
        "Starting producer-service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pool = match db::init_pool(&cfg.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Database connection failed: {:#}", e);
            std::process::exit(1);
        }
    };

    // Schema must be in sync before any job runs
    if let Err(e) = migrations::run_all(&pool).await {
        tracing::error!("Database migrations failed: {:#}", e);
        std::process::exit(1);
    }

    let publisher = match KafkaMessagePublisher::from_brokers(&cfg.kafka_brokers) {
        Ok(publisher) => Arc::new(publisher),
        Err(e) => {
            tracing::error!("Kafka producer initialization failed: {:#}", e);
            std::process::exit(1);
        }
    };

    let outbox_metrics = metrics::OutboxMetrics::new("producer-service");
    let batch_queue = Arc::new(BatchQueue::new(cfg.batch_max_size));

    let app_state = AppState {
        db: pool.clone(),
        config: cfg.clone(),
        publisher,
        batch_queue,
        metrics: outbox_metrics,
    };

    // Register this instance in its own agent registry
    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    let ip = std::env::var("POD_IP").unwrap_or_else(|_| "127.0.0.1".to_string());
    let registration = RegisterAgentRequest {
        service_id: cfg.identity.service_id.clone(),
        instance_id: cfg.identity.instance_id.clone(),
        service_name: "producer-service".to_string(),
        host: hostname,
        ip,
        port: cfg.port,
        base_url: cfg.base_url.clone(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
        metadata: None,
        assigned_consumer_groups: Vec::new(),
        assigned_topics: Vec::new(),
    };
    if let Err(e) =
        producer_service::db::agent_repo::upsert_agent(&pool, ServiceKind::Producer, &registration)
            .await
    {
        tracing::error!("Agent self-registration failed: {:#}", e);
        std::process::exit(1);
    }
    tracing::info!("Producer agent registered");

    // Background jobs observe this signal between ticks
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let job_handles = jobs::spawn_all(app_state.clone(), &shutdown_tx);

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "Producer REST API listening");

    let server_state = app_state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(server_state.clone()))
            .configure(routes::configure_routes)
            .wrap(TracingLogger::default())
    })
    .bind(&bind_addr)?
    .run();

    let result = server.await;

    // Drain: signal the jobs and wait for their loops to observe it
    tracing::info!("HTTP server stopped; draining background jobs");
    let _ = shutdown_tx.send(());
    for handle in job_handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Job task panicked during drain");
        }
    }

    result
}
