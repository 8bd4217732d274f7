use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, MeterProvider};
use opentelemetry_sdk::metrics::{MetricError, SdkMeterProvider};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use tracing::{error, info};

pub struct Metrics {
    registry: Arc<prometheus::Registry>,
    _provider: SdkMeterProvider,

    // Window metrics
    pub windows_compared: Counter<u64>,
    pub windows_mismatched: Counter<u64>,
    pub latest_window_end: Gauge<u64>,
    pub latest_window_processing_time: Gauge<f64>,

    // Per-source metrics
    pub logs_fetched: Counter<u64>,

    // RPC metrics
    pub rpc_requests: Counter<u64>,
    pub rpc_errors: Counter<u64>,
    pub rpc_latency: Histogram<f64>,
}

impl Metrics {
    pub fn new() -> Result<Self, MetricError> {
        // Create a new prometheus registry
        let registry = prometheus::Registry::new();

        // Configure OpenTelemetry to use this registry
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        // Set up a meter to create instruments
        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter("reconciler_metrics");

        let windows_compared = meter
            .u64_counter("reconciler_windows_compared")
            .with_description("Total number of block windows compared")
            .build();

        let windows_mismatched = meter
            .u64_counter("reconciler_windows_mismatched")
            .with_description("Number of block windows whose logs differ between sources")
            .build();

        let latest_window_end = meter
            .u64_gauge("reconciler_latest_window_end")
            .with_description("Last block of the most recently compared window")
            .build();

        let latest_window_processing_time = meter
            .f64_gauge("reconciler_latest_window_processing")
            .with_description("Time spent fetching and comparing the latest window")
            .with_unit("s")
            .build();

        let logs_fetched = meter
            .u64_counter("reconciler_logs_fetched")
            .with_description("Number of logs fetched from each source")
            .build();

        let rpc_requests = meter
            .u64_counter("reconciler_rpc_requests")
            .with_description("Number of RPC requests made")
            .build();

        let rpc_errors = meter
            .u64_counter("reconciler_rpc_errors")
            .with_description("Number of RPC errors encountered")
            .build();

        let rpc_latency = meter
            .f64_histogram("reconciler_rpc_latency")
            .with_description("RPC request latency")
            .with_boundaries(vec![
                0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 1.0, 5.0, 10.0,
            ])
            .with_unit("s")
            .build();

        Ok(Self {
            registry: Arc::new(registry),
            _provider: provider,
            windows_compared,
            windows_mismatched,
            latest_window_end,
            latest_window_processing_time,
            logs_fetched,
            rpc_requests,
            rpc_errors,
            rpc_latency,
        })
    }

    pub fn record_rpc(&self, source: &str, method: &'static str, elapsed: Duration, is_err: bool) {
        let labels = [
            KeyValue::new("source", source.to_string()),
            KeyValue::new("method", method),
        ];
        self.rpc_requests.add(1, &labels);
        self.rpc_latency.record(elapsed.as_secs_f64(), &labels);
        if is_err {
            self.rpc_errors.add(1, &labels);
        }
    }

    pub fn record_window(
        &self,
        window_end: u64,
        equal: bool,
        logs: [(&str, usize); 2],
        elapsed: Duration,
    ) {
        self.windows_compared.add(1, &[]);
        if !equal {
            self.windows_mismatched.add(1, &[]);
        }
        for (source, count) in logs {
            self.logs_fetched
                .add(count as u64, &[KeyValue::new("source", source.to_string())]);
        }
        self.latest_window_end.record(window_end, &[]);
        self.latest_window_processing_time
            .record(elapsed.as_secs_f64(), &[]);
    }

    /// Renders the registry in the Prometheus text format.
    pub fn render(&self) -> Result<String> {
        encode_registry(&self.registry)
    }

    pub async fn start_metrics_server(&self, addr: &str, port: u16) -> Result<()> {
        let addr = format!("{addr}:{port}")
            .parse::<SocketAddr>()
            .context("invalid metrics address")?;
        let registry = self.registry.clone();

        let app = Router::new().route("/metrics", get(move || metrics_handler(registry.clone())));

        // Determine the access URL based on the binding address. Only used for logging.
        let access_url = if addr.ip().to_string() == "0.0.0.0" {
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
            .context("failed to bind metrics server")?;

        // Spawn the server in a separate task
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Metrics server stopped: {}", e);
            }
        });

        Ok(())
    }
}

fn encode_registry(registry: &prometheus::Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

async fn metrics_handler(registry: Arc<prometheus::Registry>) -> String {
    encode_registry(&registry).unwrap_or_else(|e| {
        error!("Failed to encode metrics: {}", e);
        String::new()
    })
}
