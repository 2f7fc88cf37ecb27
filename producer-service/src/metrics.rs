use prometheus::{Encoder, IntCounter, IntGauge, Opts, TextEncoder};
use tracing::warn;

/// Outbox pipeline metrics registered on the default registry.
#[derive(Clone)]
pub struct OutboxMetrics {
    pub pending: IntGauge,
    pub oldest_pending_age_seconds: IntGauge,
    pub published: IntCounter,
    pub dispatch_failures: IntCounter,
    pub acknowledged: IntCounter,
    pub retries_created: IntCounter,
}

impl OutboxMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();

        let pending = IntGauge::with_opts(
            Opts::new(
                "outbox_pending_count",
                "Number of outbox records currently pending dispatch",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_pending_count");

        let oldest_pending_age_seconds = IntGauge::with_opts(
            Opts::new(
                "outbox_oldest_pending_age_seconds",
                "Age in seconds of the oldest pending outbox record",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_oldest_pending_age_seconds");

        let published = IntCounter::with_opts(
            Opts::new(
                "outbox_published_total",
                "Total number of outbox records handed to the broker",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_published_total");

        let dispatch_failures = IntCounter::with_opts(
            Opts::new(
                "outbox_dispatch_failures_total",
                "Total number of failed broker publish attempts",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_dispatch_failures_total");

        let acknowledged = IntCounter::with_opts(
            Opts::new(
                "outbox_acknowledged_total",
                "Total number of records acknowledged by consumers",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_acknowledged_total");

        let retries_created = IntCounter::with_opts(
            Opts::new(
                "outbox_retries_created_total",
                "Total number of retry records created by the retry scan",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_retries_created_total");

        for metric in [
            Box::new(pending.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(oldest_pending_age_seconds.clone()),
            Box::new(published.clone()),
            Box::new(dispatch_failures.clone()),
            Box::new(acknowledged.clone()),
            Box::new(retries_created.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register outbox metric: {}", e);
            }
        }

        Self {
            pending,
            oldest_pending_age_seconds,
            published,
            dispatch_failures,
            acknowledged,
            retries_created,
        }
    }
}

/// Render the default registry in text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
