use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, MeterProvider};
use opentelemetry_sdk::metrics::{MetricError, SdkMeterProvider};
use prometheus::{Encoder, TextEncoder};
use tracing::{error, info};

pub struct Metrics {
    registry: Arc<prometheus::Registry>,
    _provider: SdkMeterProvider,
    pub service_name: String,

    // Cache metrics
    pub cache_hits: Counter<u64>,
    pub cache_misses: Counter<u64>,

    // Node fetch metrics
    pub node_fetch_successes: Counter<u64>,
    pub node_fetch_failures: Counter<u64>,

    // RPC metrics
    pub rpc_requests: Counter<u64>,
    pub rpc_errors: Counter<u64>,
    pub rpc_latency: Histogram<f64>,

    // Write-back metrics
    pub write_back_records: Counter<u64>,
    pub write_back_failures: Counter<u64>,
    pub channel_capacity: Gauge<u64>,
}

impl Metrics {
    pub fn new(service_name: String) -> Result<Self, MetricError> {
        let registry = prometheus::Registry::new();

        // Configure OpenTelemetry to use this registry
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter("tx_cache_metrics");

        let cache_hits = meter
            .u64_counter("tx_cache_hits")
            .with_description("Requested transactions served from the store")
            .build();

        let cache_misses = meter
            .u64_counter("tx_cache_misses")
            .with_description("Requested transactions missing from the store")
            .build();

        let node_fetch_successes = meter
            .u64_counter("tx_cache_node_fetch_successes")
            .with_description("Transactions resolved against the node")
            .build();

        let node_fetch_failures = meter
            .u64_counter("tx_cache_node_fetch_failures")
            .with_description("Transactions the node failed to resolve")
            .build();

        let rpc_requests = meter
            .u64_counter("tx_cache_rpc_requests")
            .with_description("Number of RPC requests made")
            .build();

        let rpc_errors = meter
            .u64_counter("tx_cache_rpc_errors")
            .with_description("Number of RPC errors encountered")
            .build();

        let rpc_latency = meter
            .f64_histogram("tx_cache_rpc_latency")
            .with_description("RPC request latency")
            .with_boundaries(vec![
                0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 1.0, 5.0, 10.0,
            ])
            .with_unit("s")
            .build();

        let write_back_records = meter
            .u64_counter("tx_cache_write_back_records")
            .with_description("Node-origin records persisted to the store")
            .build();

        let write_back_failures = meter
            .u64_counter("tx_cache_write_back_failures")
            .with_description("Write-back batches that failed or were dropped")
            .build();

        let channel_capacity = meter
            .u64_gauge("tx_cache_write_back_channel_capacity")
            .with_description("Available capacity of the write-back channel")
            .build();

        Ok(Self {
            registry: Arc::new(registry),
            _provider: provider,
            service_name,
            cache_hits,
            cache_misses,
            node_fetch_successes,
            node_fetch_failures,
            rpc_requests,
            rpc_errors,
            rpc_latency,
            write_back_records,
            write_back_failures,
            channel_capacity,
        })
    }

    fn labels(&self) -> [KeyValue; 1] {
        [KeyValue::new("service", self.service_name.clone())]
    }

    fn method_labels(&self, method: &'static str) -> [KeyValue; 2] {
        [
            KeyValue::new("service", self.service_name.clone()),
            KeyValue::new("method", method),
        ]
    }

    pub fn record_cache_lookup(&self, hits: u64, misses: u64) {
        self.cache_hits.add(hits, &self.labels());
        self.cache_misses.add(misses, &self.labels());
    }

    pub fn record_node_fetch(&self, successes: u64, failures: u64) {
        self.node_fetch_successes.add(successes, &self.labels());
        self.node_fetch_failures.add(failures, &self.labels());
    }

    pub fn record_rpc(&self, method: &'static str, started: Instant, failed: bool) {
        let labels = self.method_labels(method);
        self.rpc_requests.add(1, &labels);
        self.rpc_latency
            .record(started.elapsed().as_secs_f64(), &labels);
        if failed {
            self.rpc_errors.add(1, &labels);
        }
    }

    pub fn record_write_back(&self, persisted: u64, failed: bool) {
        self.write_back_records.add(persisted, &self.labels());
        if failed {
            self.write_back_failures.add(1, &self.labels());
        }
    }

    pub fn record_channel_capacity(&self, capacity: usize) {
        self.channel_capacity.record(capacity as u64, &self.labels());
    }

    /// Current state of every instrument in the Prometheus text format.
    pub fn render(&self) -> String {
        render_registry(&self.registry)
    }

    pub async fn start_metrics_server(&self, addr: &str, port: u16) -> Result<()> {
        let addr = format!("{addr}:{port}")
            .parse::<SocketAddr>()
            .context("invalid metrics address")?;
        let registry = self.registry.clone();

        let app = Router::new().route("/metrics", get(move || metrics_handler(registry.clone())));

        // Determine the access URL based on the binding address. Only used for logging.
        let access_url = if addr.ip().is_unspecified() {
            format!("http://localhost:{port}/metrics")
        } else {
            format!("http://{}:{port}/metrics", addr.ip())
        };

        info!(
            "Starting metrics server - binding to {} (accessible at {})",
            addr, access_url
        );

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("failed to bind metrics listener")?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Metrics server error: {}", e);
            }
        });

        Ok(())
    }
}

async fn metrics_handler(registry: Arc<prometheus::Registry>) -> String {
    render_registry(&registry)
}

fn render_registry(registry: &prometheus::Registry) -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
