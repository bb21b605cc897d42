//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route and status
//! - `gateway_request_duration_seconds` (histogram): dispatch latency
//! - `gateway_cors_rejections_total` (counter): origin rejections by route
//! - `gateway_open_channels` (gauge): live WebSocket channels
//!
//! # Design Decisions
//! - Recording is always on and cheap; the Prometheus exporter is only
//!   installed when enabled in config
//! - Unmatched requests are counted under the route label `unmatched`

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter on `address`. Must run inside a tokio
/// runtime.
pub fn init(address: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()?;
    tracing::info!(address = %address, "Metrics exporter listening");
    Ok(())
}

/// Count a dispatched request and record its latency.
pub fn record_request(route: &str, status: u16, started: Instant) {
    counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_cors_rejection(route: &str) {
    counter!("gateway_cors_rejections_total", "route" => route.to_string()).increment(1);
}

pub fn channel_opened() {
    gauge!("gateway_open_channels").increment(1.0);
}

pub fn channel_closed() {
    gauge!("gateway_open_channels").decrement(1.0);
}
