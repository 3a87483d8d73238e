//! Aggregate report formatting.

use tracing::{info, warn};

use swarm_supervisor::AggregateStats;

pub fn log_aggregate(stats: &AggregateStats) {
    info!(
        clients = stats.clients,
        segments = stats.segment_count,
        segments_per_sec = format!("{:.1}", stats.instant_segments_rate),
        requests_per_sec = format!("{:.1}", stats.instant_http_requests_rate),
        seg_p50_ms = format!("{:.1}", stats.segment_percentiles.p50),
        seg_p95_ms = format!("{:.1}", stats.segment_percentiles.p95),
        seg_p99_ms = format!("{:.1}", stats.segment_percentiles.p99),
        manifest_p95_ms = format!("{:.1}", stats.manifest_percentiles.p95),
        tcp_health = format!("{:.3}", stats.tcp_health_ratio),
        error_rate = format!("{:.4}", stats.error_rate),
        throughput = format_bytes_per_sec(stats.throughput_mean_bps),
        bytes = stats.bytes_downloaded,
        bytes_per_sec = format_bytes_per_sec(stats.instant_bytes_rate),
        jitter_avg_ms = format!("{:.1}", stats.jitter_avg_ms),
        sequence_skips = stats.sequence_skips,
        stalled = stats.stalled_clients,
        high_drift = stats.high_drift_clients,
        restarts = stats.process_starts,
        timestamped = format!("{:.0}%", stats.timestamp_fraction * 100.0),
        "aggregate"
    );

    if stats.max_drop_rate > 0.01 {
        warn!(
            dropped = stats.lines_dropped,
            max_drop_rate = format!("{:.2}%", stats.max_drop_rate * 100.0),
            "a pipeline is degraded, metrics are incomplete"
        );
    }
}

pub fn log_final_summary(stats: &AggregateStats) {
    info!(
        clients = stats.clients,
        lines = stats.lines_total,
        matched = stats.lines_matched,
        segments = stats.segment_count,
        manifests = stats.manifest_count,
        segment_failures = stats.segment_failed_count,
        http_errors = stats.http_errors_total,
        reconnects = stats.reconnect_count,
        tcp_success = stats.tcp_success_count,
        tcp_failure = stats.tcp_failure_count,
        bytes = stats.bytes_downloaded,
        segment_bytes = stats.segment_bytes_downloaded,
        process_starts = stats.process_starts,
        "final totals"
    );
}

fn format_bytes_per_sec(bytes_per_sec: f64) -> String {
    if bytes_per_sec >= 1_000_000_000.0 {
        format!("{:.2} GB/s", bytes_per_sec / 1_000_000_000.0)
    } else if bytes_per_sec >= 1_000_000.0 {
        format!("{:.2} MB/s", bytes_per_sec / 1_000_000.0)
    } else if bytes_per_sec >= 1_000.0 {
        format!("{:.2} KB/s", bytes_per_sec / 1_000.0)
    } else {
        format!("{:.2} B/s", bytes_per_sec)
    }
}
