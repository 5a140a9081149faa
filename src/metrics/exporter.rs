//! Prometheus metrics exporter
//!
//! HTTP endpoint for Prometheus scraping. Must be installed from inside a
//! tokio runtime; the reactor itself never touches it.

use anyhow::Result;
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;

use super::counters::{MetricsSnapshot, METRICS};
use crate::config::MetricsConfig;

/// Exported counter names, descriptions and current values
fn exported(s: &MetricsSnapshot) -> [(&'static str, &'static str, u64); 14] {
    [
        ("collab_mux_ticks_total", "Reactor ticks", s.ticks_total),
        ("collab_mux_passes_total", "Poll-and-dispatch passes", s.passes_total),
        ("collab_mux_probes_total", "Readiness probes issued", s.probes_total),
        ("collab_mux_probe_failures_total", "Readiness probes that failed", s.probe_failures),
        ("collab_mux_reads_total", "Successful reads", s.reads_total),
        ("collab_mux_writes_total", "Successful writes", s.writes_total),
        ("collab_mux_read_failures_total", "Failed reads", s.read_failures),
        ("collab_mux_write_failures_total", "Failed writes", s.write_failures),
        ("collab_mux_error_events_total", "Descriptors reported in error", s.error_events),
        ("collab_mux_bytes_received_total", "Bytes received", s.bytes_received),
        ("collab_mux_bytes_sent_total", "Bytes sent", s.bytes_sent),
        ("collab_mux_connect_attempts_total", "Transport connect attempts", s.connect_attempts),
        ("collab_mux_sessions_established_total", "Transports established", s.sessions_established),
        ("collab_mux_reconnects_triggered_total", "Reconnects triggered by the reactor", s.reconnects_triggered),
    ]
}

/// Initialize the Prometheus metrics exporter
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    for (name, description, _) in exported(&MetricsSnapshot::default()) {
        describe_counter!(name, description);
    }

    PrometheusBuilder::new()
        .with_http_listener(config.bind_addr)
        .install()?;

    // Start background task to sync atomic counters to metrics crate
    tokio::spawn(sync_metrics_task());

    Ok(())
}

/// Background task that periodically syncs our atomic counters to the metrics crate
async fn sync_metrics_task() {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    let mut last_snapshot = MetricsSnapshot::default();

    loop {
        interval.tick().await;

        let snapshot = METRICS.snapshot();
        let previous = exported(&last_snapshot);
        for ((name, _, now), (_, _, before)) in exported(&snapshot).into_iter().zip(previous) {
            let delta = now.saturating_sub(before);
            if delta > 0 {
                counter!(name).increment(delta);
            }
        }
        last_snapshot = snapshot;
    }
}
