//! Process-wide query metrics and tracing helpers.
//!
//! Metrics are registered on a private prometheus registry; call
//! [`RowguardMetrics::export`] to render them in the text exposition format.

#[cfg(feature = "metrics")]
pub use prometheus_metrics::{RowguardMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<RowguardMetrics> = Lazy::new(RowguardMetrics::init);

    pub struct RowguardMetrics {
        pub registry: Registry,
        pub queries_total: IntCounter,
        pub query_errors_total: IntCounter,
        pub query_duration: Histogram,
        pub entities_materialized: IntCounter,
    }

    impl RowguardMetrics {
        pub fn init() -> Self {
            let registry = Registry::new_custom(Some("rowguard".to_string()), None)
                .expect("metric prefix is valid");

            let queries_total = IntCounter::new("queries_total", "Total queries executed")
                .expect("counter options are valid");
            let query_errors_total =
                IntCounter::new("query_errors_total", "Queries rejected by the driver")
                    .expect("counter options are valid");
            let query_duration = Histogram::with_opts(HistogramOpts::new(
                "query_duration_seconds",
                "Duration of queries",
            ))
            .expect("histogram options are valid");
            let entities_materialized = IntCounter::new(
                "entities_materialized_total",
                "Entities built from fetched rows",
            )
            .expect("counter options are valid");

            for collector in [
                Box::new(queries_total.clone()) as Box<dyn prometheus::core::Collector>,
                Box::new(query_errors_total.clone()),
                Box::new(query_duration.clone()),
                Box::new(entities_materialized.clone()),
            ] {
                if let Err(e) = registry.register(collector) {
                    log::warn!("failed to register metric: {e}");
                }
            }

            Self {
                registry,
                queries_total,
                query_errors_total,
                query_duration,
                entities_materialized,
            }
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.queries_total.inc();
            self.query_duration.observe(elapsed.as_secs_f64());
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.inc();
        }

        pub fn record_materialized(&self, count: usize) {
            self.entities_materialized.inc_by(count as u64);
        }

        /// Render every metric in the prometheus text format
        pub fn export(&self) -> String {
            let mut buffer = Vec::new();
            if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
                log::warn!("failed to encode metrics: {e}");
            }
            String::from_utf8_lossy(&buffer).into_owned()
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    /// Span wrapping a single adapter call
    pub fn execute_query_span(sql: &str) -> tracing::Span {
        tracing::debug_span!("rowguard.query", sql = %sql)
    }

    /// Span wrapping an entity lifecycle operation
    pub fn lifecycle_span(operation: &'static str, kind: &str, id: i64) -> tracing::Span {
        tracing::debug_span!("rowguard.entity", operation, kind = %kind, id)
    }
}
