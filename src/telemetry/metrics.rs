//! Prometheus metrics

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};

/// Start the Prometheus scrape endpoint on `port` and register metric
/// descriptions. Must be called inside a tokio runtime.
pub fn install_prometheus(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_metrics();
    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "engine_decisions_total",
        "Decisions recorded, by stage and action"
    );
    describe_counter!("engine_fills_total", "Paper fills, by side");
    describe_counter!("engine_ticks_total", "Completed evaluation ticks");
    describe_counter!(
        "engine_ticks_skipped_total",
        "Ticks skipped because the previous one was still running"
    );
    describe_histogram!(
        "engine_tick_duration_ms",
        Unit::Milliseconds,
        "Wall time of one evaluation tick"
    );
    describe_gauge!("portfolio_equity", "Cash plus open positions at mark");
    describe_gauge!("portfolio_cash", "Uninvested cash");
    describe_gauge!("portfolio_open_positions", "Open position count");
}
