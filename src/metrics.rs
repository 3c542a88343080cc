use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    started_at_unix: i64,
    pub nodeboard_poll_cycles_total: Counter,
    pub nodeboard_poll_cycle_duration_seconds: Gauge,
    pub nodeboard_nodes_configured: Gauge,
    pub nodeboard_node_up: GaugeVec,
    pub nodeboard_node_poll_duration_seconds: GaugeVec,
    pub nodeboard_node_last_success_timestamp_seconds: GaugeVec,
    pub nodeboard_node_poll_errors_total: CounterVec,
    pub nodeboard_scrape_count_total: Counter,
    pub nodeboard_uptime_seconds: Gauge,
}

impl Metrics {
    pub fn new(started_at_unix: i64) -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let nodeboard_poll_cycles_total = Counter::with_opts(opts!(
            "nodeboard_poll_cycles_total",
            "Completed poll cycles"
        ))?;
        let nodeboard_poll_cycle_duration_seconds = Gauge::with_opts(opts!(
            "nodeboard_poll_cycle_duration_seconds",
            "Wall time of the last poll cycle, slowest node included"
        ))?;
        let nodeboard_nodes_configured = Gauge::with_opts(opts!(
            "nodeboard_nodes_configured",
            "Number of configured nodes"
        ))?;
        let nodeboard_node_up = GaugeVec::new(
            opts!(
                "nodeboard_node_up",
                "1 if the last poll of the node succeeded, 0 otherwise"
            ),
            &["node"],
        )?;
        let nodeboard_node_poll_duration_seconds = GaugeVec::new(
            opts!(
                "nodeboard_node_poll_duration_seconds",
                "Wall time of the last poll by node"
            ),
            &["node"],
        )?;
        let nodeboard_node_last_success_timestamp_seconds = GaugeVec::new(
            opts!(
                "nodeboard_node_last_success_timestamp_seconds",
                "Unix time of the last successful poll by node"
            ),
            &["node"],
        )?;
        let nodeboard_node_poll_errors_total = CounterVec::new(
            opts!(
                "nodeboard_node_poll_errors_total",
                "Failed polls by node and error kind"
            ),
            &["node", "kind"],
        )?;
        let nodeboard_scrape_count_total = Counter::with_opts(opts!(
            "nodeboard_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;
        let nodeboard_uptime_seconds = Gauge::with_opts(opts!(
            "nodeboard_uptime_seconds",
            "Seconds since nodeboard started"
        ))?;

        register(&registry, &nodeboard_poll_cycles_total)?;
        register(&registry, &nodeboard_poll_cycle_duration_seconds)?;
        register(&registry, &nodeboard_nodes_configured)?;
        register(&registry, &nodeboard_node_up)?;
        register(&registry, &nodeboard_node_poll_duration_seconds)?;
        register(&registry, &nodeboard_node_last_success_timestamp_seconds)?;
        register(&registry, &nodeboard_node_poll_errors_total)?;
        register(&registry, &nodeboard_scrape_count_total)?;
        register(&registry, &nodeboard_uptime_seconds)?;

        Ok(Arc::new(Self {
            registry,
            started_at_unix,
            nodeboard_poll_cycles_total,
            nodeboard_poll_cycle_duration_seconds,
            nodeboard_nodes_configured,
            nodeboard_node_up,
            nodeboard_node_poll_duration_seconds,
            nodeboard_node_last_success_timestamp_seconds,
            nodeboard_node_poll_errors_total,
            nodeboard_scrape_count_total,
            nodeboard_uptime_seconds,
        }))
    }

    pub fn set_nodes_configured(&self, count: usize) {
        self.nodeboard_nodes_configured.set(count as f64);
    }

    pub fn record_node_success(&self, node: &str, elapsed: Duration, now_unix: i64) {
        self.nodeboard_node_up.with_label_values(&[node]).set(1.0);
        self.nodeboard_node_poll_duration_seconds
            .with_label_values(&[node])
            .set(elapsed.as_secs_f64());
        self.nodeboard_node_last_success_timestamp_seconds
            .with_label_values(&[node])
            .set(now_unix as f64);
    }

    pub fn record_node_failure(&self, node: &str, kind: &str, elapsed: Duration) {
        self.nodeboard_node_up.with_label_values(&[node]).set(0.0);
        self.nodeboard_node_poll_duration_seconds
            .with_label_values(&[node])
            .set(elapsed.as_secs_f64());
        self.nodeboard_node_poll_errors_total
            .with_label_values(&[node, kind])
            .inc();
    }

    pub fn record_cycle(&self, elapsed: Duration) {
        self.nodeboard_poll_cycles_total.inc();
        self.nodeboard_poll_cycle_duration_seconds
            .set(elapsed.as_secs_f64());
    }

    pub fn update_uptime(&self, now_unix: i64) {
        self.nodeboard_uptime_seconds
            .set(now_unix.saturating_sub(self.started_at_unix).max(0) as f64);
    }

    pub fn inc_scrape_count(&self) {
        self.nodeboard_scrape_count_total.inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}
