//! Per-client statistics record.
//!
//! Accepts high-frequency writes from the parsers and an occasional read
//! from the aggregator. Every field on the hot path is a single atomic; the
//! one value that must be read coherently (the summary) is copied out field
//! by field, tolerating a brief inter-field inconsistency window.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Thresholds for stall and drift detection.
#[derive(Debug, Clone)]
pub struct ClientStatsConfig {
    /// Playback speed below which a client is considered falling behind.
    pub stall_threshold: f64,
    /// How long the speed must stay below the threshold before the client
    /// counts as stalled.
    pub stall_window: Duration,
    /// Playback-vs-wall-clock drift above which a client is flagged.
    pub drift_threshold: Duration,
    /// Capacity of the recent segment size ring.
    pub segment_ring_capacity: usize,
}

impl Default for ClientStatsConfig {
    fn default() -> Self {
        Self {
            stall_threshold: 0.9,
            stall_window: Duration::from_secs(5),
            drift_threshold: Duration::from_secs(5),
            segment_ring_capacity: 100,
        }
    }
}

// One slot per 4xx code, one per 5xx code, one for everything else.
const HTTP_4XX_SLOTS: usize = 100;
const HTTP_5XX_SLOTS: usize = 100;
const HTTP_OTHER_SLOT: usize = HTTP_4XX_SLOTS + HTTP_5XX_SLOTS;
const HTTP_ERROR_SLOTS: usize = HTTP_OTHER_SLOT + 1;

// Sentinel for "speed has not dipped below the threshold".
const SPEED_OK: i64 = -1;

/// Narrow capability the parsers use to mutate [`ClientStats`]. A hand-off
/// interface, not inheritance: the parser knows nothing else about the
/// record it feeds.
pub trait StatsSink: Send + Sync {
    fn increment_manifest_requests(&self);
    fn increment_segment_requests(&self);
    fn increment_init_requests(&self);
    fn increment_unknown_requests(&self);
    fn record_http_error(&self, code: u16);
    fn record_segment_size(&self, bytes: u64);
    fn increment_timeouts(&self);
    fn increment_reconnections(&self);
}

/// Per-client record; one instance per client for the client's lifetime,
/// surviving subprocess restarts.
pub struct ClientStats {
    config: ClientStatsConfig,
    started_at: Instant,

    manifest_requests: AtomicU64,
    segment_requests: AtomicU64,
    init_requests: AtomicU64,
    unknown_requests: AtomicU64,
    timeouts: AtomicU64,
    reconnections: AtomicU64,

    http_errors: Vec<AtomicU64>,

    bytes_previous_runs: AtomicU64,
    bytes_current_process: AtomicU64,
    process_starts: AtomicU64,

    speed_bits: AtomicU64,
    // Microseconds since `started_at` when the speed first dipped below the
    // threshold; SPEED_OK while at or above it.
    speed_below_since_us: AtomicI64,

    drift_current_ns: AtomicI64,
    drift_max_ns: AtomicI64,

    segment_sizes: Vec<AtomicU64>,
    segment_size_idx: AtomicUsize,
    segment_size_count: AtomicU64,

    lines_read: AtomicU64,
    lines_dropped: AtomicU64,
    peak_drop_rate_bits: AtomicU64,
}

impl Default for ClientStats {
    fn default() -> Self {
        Self::new(ClientStatsConfig::default())
    }
}

impl ClientStats {
    pub fn new(config: ClientStatsConfig) -> Self {
        let ring_capacity = config.segment_ring_capacity.max(1);
        Self {
            config,
            started_at: Instant::now(),
            manifest_requests: AtomicU64::new(0),
            segment_requests: AtomicU64::new(0),
            init_requests: AtomicU64::new(0),
            unknown_requests: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            reconnections: AtomicU64::new(0),
            http_errors: (0..HTTP_ERROR_SLOTS).map(|_| AtomicU64::new(0)).collect(),
            bytes_previous_runs: AtomicU64::new(0),
            bytes_current_process: AtomicU64::new(0),
            process_starts: AtomicU64::new(0),
            speed_bits: AtomicU64::new(0f64.to_bits()),
            speed_below_since_us: AtomicI64::new(SPEED_OK),
            drift_current_ns: AtomicI64::new(0),
            drift_max_ns: AtomicI64::new(0),
            segment_sizes: (0..ring_capacity).map(|_| AtomicU64::new(0)).collect(),
            segment_size_idx: AtomicUsize::new(0),
            segment_size_count: AtomicU64::new(0),
            lines_read: AtomicU64::new(0),
            lines_dropped: AtomicU64::new(0),
            peak_drop_rate_bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Fold the current-process byte counter into the previous-runs total and
    /// zero it. Called by the supervisor on every subprocess (re)start so the
    /// client's byte total is monotonic across restarts.
    pub fn on_process_start(&self) {
        let current = self.bytes_current_process.swap(0, Ordering::AcqRel);
        self.bytes_previous_runs.fetch_add(current, Ordering::AcqRel);
        self.process_starts.fetch_add(1, Ordering::Relaxed);
    }

    /// Latest byte total reported by the running process.
    pub fn update_current_bytes(&self, bytes: u64) {
        self.bytes_current_process.store(bytes, Ordering::Release);
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_previous_runs.load(Ordering::Acquire)
            + self.bytes_current_process.load(Ordering::Acquire)
    }

    pub fn process_starts(&self) -> u64 {
        self.process_starts.load(Ordering::Relaxed)
    }

    /// Latest playback speed. Crossing below the stall threshold stamps the
    /// first-below timestamp; recovering clears it.
    pub fn update_speed(&self, speed: f64) {
        self.speed_bits.store(speed.to_bits(), Ordering::Relaxed);
        if speed < self.config.stall_threshold {
            let elapsed = self.elapsed_us();
            let _ = self.speed_below_since_us.compare_exchange(
                SPEED_OK,
                elapsed,
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
        } else {
            self.speed_below_since_us.store(SPEED_OK, Ordering::Release);
        }
    }

    pub fn speed(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::Relaxed))
    }

    /// True once the speed has stayed below the threshold for the whole
    /// stall window.
    pub fn is_stalled(&self) -> bool {
        let below_since = self.speed_below_since_us.load(Ordering::Acquire);
        if below_since == SPEED_OK {
            return false;
        }
        let below_for = self.elapsed_us().saturating_sub(below_since);
        below_for > self.config.stall_window.as_micros() as i64
    }

    /// Update current drift from the playback position: wall-clock elapsed
    /// minus playback duration. Positive drift means the client is behind
    /// realtime.
    pub fn update_drift(&self, playback: Duration) {
        let elapsed_ns = i64::try_from(self.started_at.elapsed().as_nanos()).unwrap_or(i64::MAX);
        let playback_ns = i64::try_from(playback.as_nanos()).unwrap_or(i64::MAX);
        let drift = elapsed_ns.saturating_sub(playback_ns);
        self.drift_current_ns.store(drift, Ordering::Relaxed);

        let mut max = self.drift_max_ns.load(Ordering::Relaxed);
        while drift > max {
            match self.drift_max_ns.compare_exchange_weak(
                max,
                drift,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => max = observed,
            }
        }
    }

    pub fn drift(&self) -> i64 {
        self.drift_current_ns.load(Ordering::Relaxed)
    }

    pub fn has_high_drift(&self) -> bool {
        self.drift_current_ns.load(Ordering::Relaxed)
            > self.config.drift_threshold.as_nanos() as i64
    }

    /// Pipeline health as last sampled by the supervisor. Tracks the worst
    /// drop rate ever observed.
    pub fn record_dropped_lines(&self, read: u64, dropped: u64) {
        self.lines_read.store(read, Ordering::Relaxed);
        self.lines_dropped.store(dropped, Ordering::Relaxed);
        let rate = if read == 0 {
            0.0
        } else {
            dropped as f64 / read as f64
        };
        let mut peak_bits = self.peak_drop_rate_bits.load(Ordering::Relaxed);
        while rate > f64::from_bits(peak_bits) {
            match self.peak_drop_rate_bits.compare_exchange_weak(
                peak_bits,
                rate.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => peak_bits = observed,
            }
        }
    }

    pub fn peak_drop_rate(&self) -> f64 {
        f64::from_bits(self.peak_drop_rate_bits.load(Ordering::Relaxed))
    }

    pub fn get_summary(&self) -> ClientStatsSummary {
        let lines_read = self.lines_read.load(Ordering::Relaxed);
        let lines_dropped = self.lines_dropped.load(Ordering::Relaxed);
        ClientStatsSummary {
            uptime: self.started_at.elapsed(),
            manifest_requests: self.manifest_requests.load(Ordering::Relaxed),
            segment_requests: self.segment_requests.load(Ordering::Relaxed),
            init_requests: self.init_requests.load(Ordering::Relaxed),
            unknown_requests: self.unknown_requests.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            reconnections: self.reconnections.load(Ordering::Relaxed),
            http_errors: self.http_error_summary(),
            total_bytes: self.total_bytes(),
            process_starts: self.process_starts.load(Ordering::Relaxed),
            speed: self.speed(),
            stalled: self.is_stalled(),
            drift_ns: self.drift_current_ns.load(Ordering::Relaxed),
            drift_max_ns: self.drift_max_ns.load(Ordering::Relaxed),
            high_drift: self.has_high_drift(),
            recent_segment_sizes: self.recent_segment_sizes(),
            lines_read,
            lines_dropped,
            drop_rate: if lines_read == 0 {
                0.0
            } else {
                lines_dropped as f64 / lines_read as f64
            },
            peak_drop_rate: self.peak_drop_rate(),
        }
    }

    fn http_error_summary(&self) -> HttpErrorSummary {
        let mut summary = HttpErrorSummary::default();
        for (slot, counter) in self.http_errors.iter().enumerate() {
            let count = counter.load(Ordering::Relaxed);
            if count == 0 {
                continue;
            }
            summary.total += count;
            if slot < HTTP_4XX_SLOTS {
                summary.status_4xx += count;
                summary.by_code.push((400 + slot as u16, count));
            } else if slot < HTTP_OTHER_SLOT {
                summary.status_5xx += count;
                summary.by_code.push((500 + (slot - HTTP_4XX_SLOTS) as u16, count));
            } else {
                summary.other += count;
            }
        }
        summary
    }

    fn recent_segment_sizes(&self) -> Vec<u64> {
        let filled = (self.segment_size_count.load(Ordering::Relaxed) as usize)
            .min(self.segment_sizes.len());
        self.segment_sizes[..filled]
            .iter()
            .map(|size| size.load(Ordering::Relaxed))
            .collect()
    }

    fn elapsed_us(&self) -> i64 {
        i64::try_from(self.started_at.elapsed().as_micros()).unwrap_or(i64::MAX)
    }

    #[cfg(test)]
    fn http_error_slot(&self, slot: usize) -> u64 {
        self.http_errors[slot].load(Ordering::Relaxed)
    }
}

impl StatsSink for ClientStats {
    fn increment_manifest_requests(&self) {
        self.manifest_requests.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_segment_requests(&self) {
        self.segment_requests.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_init_requests(&self) {
        self.init_requests.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_unknown_requests(&self) {
        self.unknown_requests.fetch_add(1, Ordering::Relaxed);
    }

    fn record_http_error(&self, code: u16) {
        let slot = match code {
            400..=499 => (code - 400) as usize,
            500..=599 => HTTP_4XX_SLOTS + (code - 500) as usize,
            _ => HTTP_OTHER_SLOT,
        };
        self.http_errors[slot].fetch_add(1, Ordering::Relaxed);
    }

    fn record_segment_size(&self, bytes: u64) {
        let idx = self.segment_size_idx.fetch_add(1, Ordering::Relaxed) % self.segment_sizes.len();
        self.segment_sizes[idx].store(bytes, Ordering::Relaxed);
        self.segment_size_count.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_reconnections(&self) {
        self.reconnections.fetch_add(1, Ordering::Relaxed);
    }
}

/// HTTP error counts grouped by class, with per-code breakdown for the codes
/// actually seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpErrorSummary {
    pub total: u64,
    pub status_4xx: u64,
    pub status_5xx: u64,
    pub other: u64,
    pub by_code: Vec<(u16, u64)>,
}

/// Copy-out snapshot of a [`ClientStats`].
#[derive(Debug, Clone)]
pub struct ClientStatsSummary {
    pub uptime: Duration,
    pub manifest_requests: u64,
    pub segment_requests: u64,
    pub init_requests: u64,
    pub unknown_requests: u64,
    pub timeouts: u64,
    pub reconnections: u64,
    pub http_errors: HttpErrorSummary,
    pub total_bytes: u64,
    pub process_starts: u64,
    pub speed: f64,
    pub stalled: bool,
    pub drift_ns: i64,
    pub drift_max_ns: i64,
    pub high_drift: bool,
    pub recent_segment_sizes: Vec<u64>,
    pub lines_read: u64,
    pub lines_dropped: u64,
    pub drop_rate: f64,
    pub peak_drop_rate: f64,
}
