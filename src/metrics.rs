// Prometheus metrics for try-on engine monitoring
//
// Exposes metrics on /metrics HTTP endpoint:
// - Generation items by outcome (counter)
// - Generation batch duration (histogram)
// - Quota denials by identity class (counter)
// - Quota increments and ordering violations (counters)
// - Poll timeouts, storage upload failures/recoveries (counters)

use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, Histogram, IntCounter, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Generation metrics
    pub static ref GENERATION_ITEMS_TOTAL: CounterVec = CounterVec::new(
        prometheus::Opts::new("generation_items_total", "Generation items by outcome"),
        &["outcome"]
    ).expect("Failed to create generation items metric");

    pub static ref GENERATION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "generation_duration_seconds",
            "Wall time of one generation batch"
        )
        .buckets(vec![1.0, 5.0, 10.0, 20.0, 40.0, 80.0, 160.0])
    ).expect("Failed to create generation duration metric");

    // Quota metrics
    pub static ref QUOTA_DENIALS_TOTAL: CounterVec = CounterVec::new(
        prometheus::Opts::new("quota_denials_total", "Requests denied at the quota gate"),
        &["identity_class"]
    ).expect("Failed to create quota denials metric");

    pub static ref QUOTA_INCREMENTS_TOTAL: IntCounter = IntCounter::new(
        "quota_increments_total",
        "Successful quota consumptions"
    ).expect("Failed to create quota increments metric");

    pub static ref QUOTA_INVARIANT_VIOLATIONS_TOTAL: IntCounter = IntCounter::new(
        "quota_invariant_violations_total",
        "Increments that found no open quota row"
    ).expect("Failed to create quota invariant violations metric");

    // Vendor metrics
    pub static ref POLL_TIMEOUTS_TOTAL: IntCounter = IntCounter::new(
        "poll_timeouts_total",
        "Vendor tasks that never reached a terminal state within the poll budget"
    ).expect("Failed to create poll timeouts metric");

    // Storage metrics
    pub static ref STORAGE_UPLOAD_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "storage_upload_failures_total",
        "Permanent-storage uploads that failed and were queued for the sweep"
    ).expect("Failed to create storage failures metric");

    pub static ref STORAGE_UPLOAD_RECOVERIES_TOTAL: IntCounter = IntCounter::new(
        "storage_upload_recoveries_total",
        "Queued uploads recovered by the sweep"
    ).expect("Failed to create storage recoveries metric");
}

/// Register all metrics with the custom registry.
///
/// Safe to call more than once; re-registration of an already-registered
/// collector is ignored.
pub fn init() -> Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(GENERATION_ITEMS_TOTAL.clone()),
        Box::new(GENERATION_DURATION_SECONDS.clone()),
        Box::new(QUOTA_DENIALS_TOTAL.clone()),
        Box::new(QUOTA_INCREMENTS_TOTAL.clone()),
        Box::new(QUOTA_INVARIANT_VIOLATIONS_TOTAL.clone()),
        Box::new(POLL_TIMEOUTS_TOTAL.clone()),
        Box::new(STORAGE_UPLOAD_FAILURES_TOTAL.clone()),
        Box::new(STORAGE_UPLOAD_RECOVERIES_TOTAL.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e).context("Failed to register metric"),
        }
    }

    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Invalid UTF-8 in metrics")
}

/// Start the metrics HTTP server (`/metrics` and `/health`)
pub async fn serve(port: u16) -> Result<()> {
    init().context("Failed to initialize metrics")?;

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("Starting metrics server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind metrics server")?;

    axum::serve(listener, app)
        .await
        .context("Metrics server error")?;

    Ok(())
}

/// Metrics endpoint handler
async fn metrics_handler() -> Response {
    match gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}
