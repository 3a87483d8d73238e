//! Fleet-wide aggregation.
//!
//! The aggregator is stateless apart from one atomic slot holding its
//! previous snapshot, used to derive instantaneous rates by differencing.
//! Each call tours the client set once; different clients are read at
//! slightly different instants, which is acceptable for a dashboard-feeding
//! best-effort reader.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use tokio_util::sync::CancellationToken;

use swarm_telemetry::{
    ClientStats, DebugEventParser, Percentiles, QuantileSketch, RunningStats, ThroughputHistogram,
};

/// The aggregator's read-only view of one client.
#[derive(Clone)]
pub struct ClientHandle {
    pub id: u64,
    pub stats: Arc<ClientStats>,
    pub parser: Arc<DebugEventParser>,
}

/// Absolute counters remembered between calls for rate differencing.
struct RateBasis {
    taken_at: Instant,
    http_open_count: u64,
    segment_count: u64,
    bytes_downloaded: u64,
    http_errors_total: u64,
}

pub struct Aggregator {
    clients: Vec<ClientHandle>,
    prev: ArcSwapOption<RateBasis>,
}

impl Aggregator {
    pub fn new(clients: Vec<ClientHandle>) -> Self {
        Self {
            clients,
            prev: ArcSwapOption::const_empty(),
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Snapshot and merge every client's state, computing instantaneous
    /// rates against the previous call. Rates are zero on the first call.
    pub fn get_debug_stats(&self) -> AggregateStats {
        self.get_debug_stats_at(Instant::now())
    }

    pub(crate) fn get_debug_stats_at(&self, now: Instant) -> AggregateStats {
        let mut agg = AggregateStats {
            clients: self.clients.len(),
            ..AggregateStats::default()
        };

        let mut segment_sketch = QuantileSketch::new();
        let mut manifest_sketch = QuantileSketch::new();
        let mut throughput = ThroughputHistogram::new(Duration::from_millis(1));
        let mut jitter_sum_ms = 0.0;
        let mut jitter_samples = 0u64;
        let mut bandwidth_sum = 0u128;
        let mut bandwidth_reports = 0u64;

        for client in &self.clients {
            let parser = client.parser.stats();
            let summary = client.stats.get_summary();

            agg.lines_total += parser.lines_total;
            agg.lines_matched += parser.lines_matched;
            agg.timestamps_used += parser.timestamps_used;
            agg.http_open_count += parser.http_open_count;
            agg.http_get_count += parser.http_get_count;
            agg.http_errors_total += parser.http_errors_total;
            agg.http_errors_4xx += parser.http_errors_4xx;
            agg.http_errors_5xx += parser.http_errors_5xx;
            agg.reconnect_count += parser.reconnect_count;
            agg.tcp_success_count += parser.tcp_success_count;
            agg.tcp_failure_count += parser.tcp_failure_count;
            agg.tcp_refused_count += parser.tcp_refused_count;
            agg.tcp_timeout_count += parser.tcp_timeout_count;
            agg.tcp_error_count += parser.tcp_error_count;
            agg.tcp_connect_count += parser.tcp_connect_count;
            agg.playlist_refreshes += parser.playlist_refreshes;
            agg.sequence_skips += parser.sequence_skips;
            agg.segment_count += parser.segment_count;
            agg.manifest_count += parser.manifest_count;
            agg.segment_failed_count += parser.segment_failed_count;
            agg.segment_skipped_count += parser.segment_skipped_count;
            agg.playlist_failed_count += parser.playlist_failed_count;
            agg.segments_expired_sum += parser.segments_expired_sum;
            agg.bytes_downloaded += parser.bytes_downloaded;
            agg.segment_bytes_downloaded += parser.segment_bytes_downloaded;
            agg.size_lookup_misses += parser.size_lookup_misses;

            // Count-weighted merges; never an unweighted average of averages.
            agg.segment_wall.merge(&parser.segment_wall);
            agg.manifest_wall.merge(&parser.manifest_wall);
            agg.tcp_connect.merge(&parser.tcp_connect);
            segment_sketch.merge_from(&parser.segment_sketch);
            manifest_sketch.merge_from(&parser.manifest_sketch);
            throughput.merge_from(&parser.throughput_sketch);

            jitter_sum_ms += parser.jitter_sum_ms;
            jitter_samples += parser.jitter_samples;
            agg.jitter_max_abs_ms = agg.jitter_max_abs_ms.max(parser.jitter_max_abs_ms);
            agg.jitter_late += parser.jitter_late;

            if parser.bandwidth_bps > 0 {
                bandwidth_sum += parser.bandwidth_bps as u128;
                bandwidth_reports += 1;
            }

            agg.total_client_bytes += summary.total_bytes;
            agg.process_starts += summary.process_starts;
            agg.lines_read += summary.lines_read;
            agg.lines_dropped += summary.lines_dropped;
            agg.max_drop_rate = agg.max_drop_rate.max(summary.drop_rate);
            agg.peak_drop_rate = agg.peak_drop_rate.max(summary.peak_drop_rate);
            if summary.stalled {
                agg.stalled_clients += 1;
            }
            if summary.high_drift {
                agg.high_drift_clients += 1;
            }
            agg.max_drift_ns = agg.max_drift_ns.max(summary.drift_max_ns);
        }

        agg.timestamp_fraction = if agg.lines_total == 0 {
            0.0
        } else {
            agg.timestamps_used as f64 / agg.lines_total as f64
        };
        let tcp_total = agg.tcp_success_count + agg.tcp_failure_count;
        agg.tcp_health_ratio = if tcp_total == 0 {
            1.0
        } else {
            agg.tcp_success_count as f64 / tcp_total as f64
        };
        agg.error_rate = if agg.http_open_count == 0 {
            0.0
        } else {
            (agg.http_errors_total + agg.segment_failed_count) as f64
                / agg.http_open_count as f64
        };
        agg.jitter_avg_ms = if jitter_samples == 0 {
            0.0
        } else {
            jitter_sum_ms / jitter_samples as f64
        };
        agg.advertised_bandwidth_mean_bps = if bandwidth_reports == 0 {
            0.0
        } else {
            (bandwidth_sum / bandwidth_reports as u128) as f64
        };
        agg.segment_percentiles = segment_sketch.percentiles();
        agg.manifest_percentiles = manifest_sketch.percentiles();
        agg.throughput_mean_bps = throughput.mean_bps();
        agg.throughput_p50_bps = throughput.value_at(0.50);
        agg.throughput_p95_bps = throughput.value_at(0.95);

        if let Some(prev) = self.prev.load_full() {
            let elapsed = now.saturating_duration_since(prev.taken_at);
            let secs = elapsed.as_secs_f64();
            if secs > 0.0 {
                agg.instant_http_requests_rate =
                    delta(agg.http_open_count, prev.http_open_count) / secs;
                agg.instant_segments_rate = delta(agg.segment_count, prev.segment_count) / secs;
                agg.instant_bytes_rate = delta(agg.bytes_downloaded, prev.bytes_downloaded) / secs;
                agg.instant_errors_rate =
                    delta(agg.http_errors_total, prev.http_errors_total) / secs;
            }
            agg.elapsed_since_prev = Some(elapsed);
        }

        self.prev.store(Some(Arc::new(RateBasis {
            taken_at: now,
            http_open_count: agg.http_open_count,
            segment_count: agg.segment_count,
            bytes_downloaded: agg.bytes_downloaded,
            http_errors_total: agg.http_errors_total,
        })));

        agg
    }

    /// Tick on a fixed cadence, handing each aggregate to `on_tick`, until
    /// the token is cancelled.
    pub async fn run<F>(&self, interval: Duration, token: CancellationToken, mut on_tick: F)
    where
        F: FnMut(&AggregateStats),
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let stats = self.get_debug_stats();
                    on_tick(&stats);
                }
            }
        }
    }
}

fn delta(current: u64, previous: u64) -> f64 {
    current.saturating_sub(previous) as f64
}

/// One internally consistent tour over the client set.
#[derive(Debug, Clone, Default)]
pub struct AggregateStats {
    pub clients: usize,

    pub lines_total: u64,
    pub lines_matched: u64,
    pub timestamps_used: u64,
    pub timestamp_fraction: f64,

    pub http_open_count: u64,
    pub http_get_count: u64,
    pub http_errors_total: u64,
    pub http_errors_4xx: u64,
    pub http_errors_5xx: u64,
    pub reconnect_count: u64,

    pub tcp_success_count: u64,
    pub tcp_failure_count: u64,
    pub tcp_refused_count: u64,
    pub tcp_timeout_count: u64,
    pub tcp_error_count: u64,
    pub tcp_connect_count: u64,
    pub tcp_health_ratio: f64,
    pub error_rate: f64,

    pub playlist_refreshes: u64,
    pub sequence_skips: u64,
    pub segment_count: u64,
    pub manifest_count: u64,
    pub segment_failed_count: u64,
    pub segment_skipped_count: u64,
    pub playlist_failed_count: u64,
    pub segments_expired_sum: u64,

    pub bytes_downloaded: u64,
    pub segment_bytes_downloaded: u64,
    pub size_lookup_misses: u64,
    pub total_client_bytes: u64,
    pub advertised_bandwidth_mean_bps: f64,

    /// Milliseconds, count-weighted across clients.
    pub segment_wall: RunningStats,
    pub segment_percentiles: Percentiles,
    pub manifest_wall: RunningStats,
    pub manifest_percentiles: Percentiles,
    pub tcp_connect: RunningStats,

    pub jitter_avg_ms: f64,
    pub jitter_max_abs_ms: f64,
    pub jitter_late: u64,

    pub throughput_mean_bps: f64,
    pub throughput_p50_bps: f64,
    pub throughput_p95_bps: f64,

    pub stalled_clients: usize,
    pub high_drift_clients: usize,
    pub max_drift_ns: i64,
    pub process_starts: u64,

    pub lines_read: u64,
    pub lines_dropped: u64,
    pub max_drop_rate: f64,
    pub peak_drop_rate: f64,

    pub instant_http_requests_rate: f64,
    pub instant_segments_rate: f64,
    pub instant_bytes_rate: f64,
    pub instant_errors_rate: f64,
    pub elapsed_since_prev: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use swarm_telemetry::{ClientStatsConfig, ParserConfig};

    fn client(id: u64) -> ClientHandle {
        ClientHandle {
            id,
            stats: Arc::new(ClientStats::new(ClientStatsConfig::default())),
            parser: Arc::new(DebugEventParser::new(ParserConfig::default())),
        }
    }

    fn at_ms(offset_ms: i64) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 23)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
            + chrono::Duration::milliseconds(offset_ms)
    }

    fn feed_opens(handle: &ClientHandle, count: usize, start_ms: i64) {
        for i in 0..count {
            let line = format!("[http @ 0x2] Opening 'http://o/item{i}.bin' for reading");
            handle.parser.parse_line_at(&line, at_ms(start_ms + i as i64));
        }
    }

    #[test]
    fn first_call_reports_zero_rates() {
        let aggregator = Aggregator::new(vec![client(0)]);
        let stats = aggregator.get_debug_stats();
        assert_eq!(stats.instant_http_requests_rate, 0.0);
        assert!(stats.elapsed_since_prev.is_none());
        assert_eq!(stats.tcp_health_ratio, 1.0, "no TCP traffic yet");
    }

    #[test]
    fn rates_difference_against_the_previous_snapshot() {
        let handle = client(0);
        let aggregator = Aggregator::new(vec![handle.clone()]);

        feed_opens(&handle, 100, 0);
        let t0 = Instant::now();
        let first = aggregator.get_debug_stats_at(t0);
        assert_eq!(first.http_open_count, 100);

        feed_opens(&handle, 200, 1_000);
        let second = aggregator.get_debug_stats_at(t0 + Duration::from_secs(2));
        assert_eq!(second.http_open_count, 300);
        assert!(
            (second.instant_http_requests_rate - 100.0).abs() < 1e-6,
            "rate {}",
            second.instant_http_requests_rate
        );
        // rate * elapsed + previous ≈ current
        let reconstructed = second.instant_http_requests_rate * 2.0 + first.http_open_count as f64;
        assert!((reconstructed - second.http_open_count as f64).abs() < 1e-6);
    }

    #[test]
    fn averages_are_count_weighted_and_sketches_merge() {
        let fast = client(0);
        let slow = client(1);

        // Client 0: one 10ms segment. Client 1: three 40ms segments.
        for (handle, gap_ms, count) in [(&fast, 10, 2), (&slow, 40, 4)] {
            for i in 0..count {
                let line = format!(
                    "[hls @ 0x1] HLS request for url 'http://o/c{}-{i}.ts', offset 0, playlist 0",
                    handle.id
                );
                handle.parser.parse_line_at(&line, at_ms(i64::from(i * gap_ms)));
            }
        }

        let aggregator = Aggregator::new(vec![fast, slow]);
        let stats = aggregator.get_debug_stats();
        assert_eq!(stats.segment_count, 4);
        // Weighted mean: (1*10 + 3*40) / 4 = 32.5ms, not (10+40)/2 = 25ms.
        assert!((stats.segment_wall.mean() - 32.5).abs() < 1.0);
        assert_eq!(stats.segment_wall.count, 4);
        // Merged sketch sees both populations.
        assert!(stats.segment_percentiles.p99 > 35.0);
        assert!(stats.segment_percentiles.p25 <= 40.0);
    }

    #[test]
    fn error_rate_and_tcp_ratio_aggregate_over_clients() {
        let a = client(0);
        let b = client(1);
        feed_opens(&a, 10, 0);
        a.parser
            .parse_line_at("[http @ 0x2] HTTP error 404 Not Found", at_ms(100));
        b.parser.parse_line_at(
            "[tcp @ 0x1] Successfully connected to 10.0.0.1 port 80",
            at_ms(0),
        );
        b.parser.parse_line_at(
            "[tcp @ 0x1] Connection attempt to 10.0.0.2 port 80 failed: Connection refused",
            at_ms(1),
        );

        let aggregator = Aggregator::new(vec![a, b]);
        let stats = aggregator.get_debug_stats();
        assert!((stats.error_rate - 0.1).abs() < 1e-9);
        assert!((stats.tcp_health_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn client_stats_fold_into_the_aggregate() {
        let a = client(0);
        a.stats.on_process_start();
        a.stats.update_current_bytes(5_000);
        a.stats.record_dropped_lines(200, 20);

        let aggregator = Aggregator::new(vec![a]);
        let stats = aggregator.get_debug_stats();
        assert_eq!(stats.total_client_bytes, 5_000);
        assert_eq!(stats.process_starts, 1);
        assert_eq!(stats.lines_dropped, 20);
        assert!((stats.max_drop_rate - 0.1).abs() < 1e-9);
    }
}
