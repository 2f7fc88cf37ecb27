use prometheus::{Encoder, IntCounter, Opts, TextEncoder};
use tracing::warn;

/// Consumer processing metrics registered on the default registry.
#[derive(Clone)]
pub struct ConsumerMetrics {
    pub processed: IntCounter,
    pub failed: IntCounter,
    pub duplicates: IntCounter,
    pub skipped: IntCounter,
}

impl ConsumerMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();

        let processed = IntCounter::with_opts(
            Opts::new(
                "consumer_processed_total",
                "Total number of messages processed successfully",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for consumer_processed_total");

        let failed = IntCounter::with_opts(
            Opts::new(
                "consumer_failed_total",
                "Total number of messages whose processing failed",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for consumer_failed_total");

        let duplicates = IntCounter::with_opts(
            Opts::new(
                "consumer_duplicates_total",
                "Total number of duplicate deliveries absorbed by the processed store",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for consumer_duplicates_total");

        let skipped = IntCounter::with_opts(
            Opts::new(
                "consumer_skipped_total",
                "Total number of envelopes targeted at another consumer instance",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for consumer_skipped_total");

        for metric in [
            Box::new(processed.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(failed.clone()),
            Box::new(duplicates.clone()),
            Box::new(skipped.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register consumer metric: {}", e);
            }
        }

        Self {
            processed,
            failed,
            duplicates,
            skipped,
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
