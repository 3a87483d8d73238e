//! Debug-event parser: raw diagnostic lines in, typed events and online
//! aggregates out.
//!
//! One instance per client, living as long as the client does (subprocess
//! restarts re-create pipelines, never the parser). A single internal mutex
//! guards the pending tables, order state and sketches; scalar counters are
//! atomics updated outside the mutex and readable at any time through
//! [`DebugEventParser::stats`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::client_stats::StatsSink;
use crate::event::{DebugEvent, DebugEventKind, TcpFailureKind};
use crate::lookup::SegmentSizeLookup;
use crate::patterns;
use crate::sketch::{Percentiles, QuantileSketch, RingBuffer, RunningStats, ThroughputHistogram};
use crate::timestamp::split_timestamp;

#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Expected interval between manifest refreshes; jitter is measured
    /// against it.
    pub target_duration: Duration,
    /// Transfers completing faster than this are excluded from throughput.
    pub min_throughput_wall: Duration,
    /// Capacity of the segment wall-time and TCP latency sample rings.
    pub ring_capacity: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            target_duration: Duration::from_secs(2),
            min_throughput_wall: Duration::from_millis(1),
            ring_capacity: 100,
        }
    }
}

type EventObserver = Box<dyn Fn(&DebugEvent) + Send + Sync>;

enum UrlKind {
    Manifest,
    Segment,
    Init,
    Other,
}

fn classify_url(url: &str) -> UrlKind {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let filename = path.rsplit('/').next().unwrap_or(path);
    if filename.contains(".m3u8") {
        return UrlKind::Manifest;
    }
    if filename.contains("init") {
        return UrlKind::Init;
    }
    if filename.ends_with(".ts") || filename.ends_with(".m4s") {
        return UrlKind::Segment;
    }
    UrlKind::Other
}

/// Filename a segment URL is keyed by: text after the final `/`, query
/// string ignored.
fn segment_filename(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

/// Wall time between two log timestamps, clamped to zero when the sources
/// disagree about clock order.
fn wall_between(start: NaiveDateTime, end: NaiveDateTime) -> Duration {
    match (end - start).to_std() {
        Ok(wall) => wall,
        Err(_) => {
            debug!(%start, %end, "completion precedes start, clamping wall time to zero");
            Duration::ZERO
        }
    }
}

struct Pending {
    url: String,
    started: NaiveDateTime,
}

struct JitterStats {
    sum_ms: f64,
    max_abs_ms: f64,
    late: u64,
    samples: u64,
}

struct Inner {
    pending_segments: VecDeque<Pending>,
    pending_manifests: VecDeque<Pending>,
    pending_tcp: HashMap<String, NaiveDateTime>,
    last_refresh: Option<NaiveDateTime>,
    last_sequence: i64,
    segment_wall: RingBuffer,
    segment_stats: RunningStats,
    segment_sketch: QuantileSketch,
    manifest_stats: RunningStats,
    manifest_sketch: QuantileSketch,
    tcp_wall: RingBuffer,
    tcp_stats: RunningStats,
    throughput: ThroughputHistogram,
    jitter: JitterStats,
}

#[derive(Default)]
struct Counters {
    lines_total: AtomicU64,
    lines_matched: AtomicU64,
    timestamps_used: AtomicU64,
    http_open_count: AtomicU64,
    http_get_count: AtomicU64,
    http_errors_total: AtomicU64,
    http_errors_4xx: AtomicU64,
    http_errors_5xx: AtomicU64,
    reconnect_count: AtomicU64,
    tcp_success_count: AtomicU64,
    tcp_failure_count: AtomicU64,
    tcp_refused_count: AtomicU64,
    tcp_timeout_count: AtomicU64,
    tcp_error_count: AtomicU64,
    tcp_connect_count: AtomicU64,
    playlist_refreshes: AtomicU64,
    sequence_skips: AtomicU64,
    segment_count: AtomicU64,
    manifest_count: AtomicU64,
    segment_failed_count: AtomicU64,
    segment_skipped_count: AtomicU64,
    playlist_failed_count: AtomicU64,
    segments_expired_sum: AtomicU64,
    bytes_downloaded: AtomicU64,
    segment_bytes_downloaded: AtomicU64,
    size_lookup_misses: AtomicU64,
    bandwidth_bps: AtomicU64,
}

/// Parser for one client's diagnostic stream.
pub struct DebugEventParser {
    config: ParserConfig,
    sink: Option<Arc<dyn StatsSink>>,
    size_lookup: Option<Arc<dyn SegmentSizeLookup>>,
    observer: Option<EventObserver>,
    counters: Counters,
    inner: Mutex<Inner>,
}

impl DebugEventParser {
    pub fn new(config: ParserConfig) -> Self {
        let inner = Inner {
            pending_segments: VecDeque::new(),
            pending_manifests: VecDeque::new(),
            pending_tcp: HashMap::new(),
            last_refresh: None,
            last_sequence: 0,
            segment_wall: RingBuffer::new(config.ring_capacity),
            segment_stats: RunningStats::default(),
            segment_sketch: QuantileSketch::new(),
            manifest_stats: RunningStats::default(),
            manifest_sketch: QuantileSketch::new(),
            tcp_wall: RingBuffer::new(config.ring_capacity),
            tcp_stats: RunningStats::default(),
            throughput: ThroughputHistogram::new(config.min_throughput_wall),
            jitter: JitterStats {
                sum_ms: 0.0,
                max_abs_ms: 0.0,
                late: 0,
                samples: 0,
            },
        };
        Self {
            config,
            sink: None,
            size_lookup: None,
            observer: None,
            counters: Counters::default(),
            inner: Mutex::new(inner),
        }
    }

    /// Route request counts, HTTP errors and segment sizes into a per-client
    /// stats record.
    pub fn with_stats_sink(mut self, sink: Arc<dyn StatsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_size_lookup(mut self, lookup: Arc<dyn SegmentSizeLookup>) -> Self {
        self.size_lookup = Some(lookup);
        self
    }

    /// Observe every typed event, in the order of the lines that produced
    /// them.
    pub fn with_event_observer(
        mut self,
        observer: impl Fn(&DebugEvent) + Send + Sync + 'static,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Parse one diagnostic line using the ingestion wall clock as fallback
    /// timestamp. Unrecognized input is counted and otherwise ignored.
    pub fn parse_line(&self, line: &str) {
        self.parse_line_at(line, Utc::now().naive_utc());
    }

    /// Parse one line with an explicit fallback clock. The line's own
    /// timestamp prefix, when present, still wins.
    pub fn parse_line_at(&self, line: &str, now: NaiveDateTime) {
        self.counters.lines_total.fetch_add(1, Ordering::Relaxed);
        let (at, rest) = match split_timestamp(line) {
            Some((ts, rest)) => {
                self.counters.timestamps_used.fetch_add(1, Ordering::Relaxed);
                (ts, rest)
            }
            None => (now, line),
        };
        if !patterns::line_of_interest(rest) {
            return;
        }
        if self.dispatch(rest, at) {
            self.counters.lines_matched.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// First match wins, in approximate frequency order.
    fn dispatch(&self, line: &str, at: NaiveDateTime) -> bool {
        if let Some(caps) = patterns::TCP_CONNECTED.captures(line) {
            self.on_tcp_connected(&caps[1], parse_u16(&caps[2]), at);
            return true;
        }
        if let Some(caps) = patterns::HLS_REQUEST.captures(line) {
            self.on_hls_request(&caps[1], at);
            return true;
        }
        if let Some(caps) = patterns::HTTP_OPEN.captures(line) {
            self.on_http_open(&caps[1], at);
            return true;
        }
        if let Some(caps) = patterns::HTTP_GET.captures(line) {
            self.on_http_get(&caps[1], at);
            return true;
        }
        if let Some(caps) = patterns::TCP_START.captures(line) {
            self.on_tcp_start(&caps[1], parse_u16(&caps[2]), at);
            return true;
        }
        if let Some(caps) = patterns::TCP_FAILED.captures(line) {
            self.on_tcp_failed(&caps[1], parse_u16(&caps[2]), &caps[3], at);
            return true;
        }
        if let Some(caps) = patterns::SEQUENCE_CHANGE.captures(line) {
            self.on_sequence_change(parse_i64(&caps[1]), parse_i64(&caps[2]), at);
            return true;
        }
        if patterns::FORMAT_PROBED.is_match(line) || patterns::MANIFEST_SKIP.is_match(line) {
            self.on_manifest_parsed(at);
            return true;
        }
        if let Some(caps) = patterns::BANDWIDTH.captures(line) {
            let bits_per_sec = parse_u64(&caps[1]);
            self.counters.bandwidth_bps.store(bits_per_sec, Ordering::Relaxed);
            self.emit(at, || DebugEventKind::Bandwidth { bits_per_sec });
            return true;
        }
        if let Some(caps) = patterns::HTTP_ERROR.captures(line) {
            self.on_http_error(parse_u16(&caps[1]), &caps[2], at);
            return true;
        }
        if patterns::RECONNECT.is_match(line) {
            self.counters.reconnect_count.fetch_add(1, Ordering::Relaxed);
            if let Some(sink) = &self.sink {
                sink.increment_reconnections();
            }
            self.emit(at, || DebugEventKind::Reconnect);
            return true;
        }
        if let Some(caps) = patterns::SEGMENT_SKIPPED.captures(line) {
            self.counters.segment_skipped_count.fetch_add(1, Ordering::Relaxed);
            let (segment, playlist) = (caps[1].to_string(), caps[2].to_string());
            self.emit(at, || DebugEventKind::SegmentSkipped { segment, playlist });
            return true;
        }
        if let Some(caps) = patterns::SEGMENT_FAILED.captures(line) {
            self.counters.segment_failed_count.fetch_add(1, Ordering::Relaxed);
            let (segment, playlist) = (caps[1].to_string(), caps[2].to_string());
            self.emit(at, || DebugEventKind::SegmentFailed { segment, playlist });
            return true;
        }
        if let Some(caps) = patterns::PLAYLIST_FAILED.captures(line) {
            self.counters.playlist_failed_count.fetch_add(1, Ordering::Relaxed);
            let playlist = caps[1].to_string();
            self.emit(at, || DebugEventKind::PlaylistFailed { playlist });
            return true;
        }
        if let Some(caps) = patterns::SEGMENTS_EXPIRED.captures(line) {
            let count = parse_u64(&caps[1]);
            self.counters.segments_expired_sum.fetch_add(count, Ordering::Relaxed);
            self.emit(at, || DebugEventKind::SegmentsExpired { count });
            return true;
        }
        if let Some(caps) = patterns::CONTENT_LENGTH.captures(line) {
            let bytes = parse_u64(&caps[1]);
            self.counters.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
            self.emit(at, || DebugEventKind::HttpContentLength { bytes });
            return true;
        }
        false
    }

    fn emit(&self, at: NaiveDateTime, kind: impl FnOnce() -> DebugEventKind) {
        if let Some(observer) = &self.observer {
            observer(&DebugEvent { at, kind: kind() });
        }
    }

    fn on_hls_request(&self, url: &str, at: NaiveDateTime) {
        self.emit(at, || DebugEventKind::HlsRequest {
            url: url.to_string(),
        });
        match classify_url(url) {
            UrlKind::Manifest => {
                if let Some(sink) = &self.sink {
                    sink.increment_manifest_requests();
                }
            }
            UrlKind::Segment => {
                if let Some(sink) = &self.sink {
                    sink.increment_segment_requests();
                }
                self.track_segment(url, at);
            }
            UrlKind::Init => {
                if let Some(sink) = &self.sink {
                    sink.increment_init_requests();
                }
            }
            UrlKind::Other => {
                if let Some(sink) = &self.sink {
                    sink.increment_unknown_requests();
                }
            }
        }
    }

    fn on_http_open(&self, url: &str, at: NaiveDateTime) {
        match classify_url(url) {
            UrlKind::Manifest => {
                self.emit(at, || DebugEventKind::PlaylistOpen {
                    url: url.to_string(),
                });
                self.on_playlist_open(url, at);
            }
            UrlKind::Segment => {
                self.emit(at, || DebugEventKind::HttpOpen {
                    url: url.to_string(),
                });
                self.counters.http_open_count.fetch_add(1, Ordering::Relaxed);
                self.track_segment(url, at);
            }
            UrlKind::Init | UrlKind::Other => {
                self.emit(at, || DebugEventKind::HttpOpen {
                    url: url.to_string(),
                });
                self.counters.http_open_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn on_http_get(&self, path: &str, at: NaiveDateTime) {
        self.counters.http_get_count.fetch_add(1, Ordering::Relaxed);
        self.emit(at, || DebugEventKind::HttpRequestGet {
            path: path.to_string(),
        });
        // Keep-alive GETs complete segments too, but never bump the open
        // count: the open path already counted this resource once.
        if let UrlKind::Segment = classify_url(path) {
            self.track_segment(path, at);
        }
    }

    /// Segment tracking shared by the HLS request, HTTP open and HTTP GET
    /// paths. A same-filename event refreshes the pending entry; a
    /// different-filename event flushes the oldest pending entry as a
    /// completion and becomes pending itself.
    fn track_segment(&self, url: &str, at: NaiveDateTime) {
        let filename = segment_filename(url);
        let mut inner = self.inner.lock();
        if let Some(pending) = inner
            .pending_segments
            .iter_mut()
            .find(|pending| segment_filename(&pending.url) == filename)
        {
            pending.started = at;
            return;
        }
        if let Some(oldest) = inner.pending_segments.pop_front() {
            self.complete_segment(&mut inner, &oldest, at);
        }
        inner.pending_segments.push_back(Pending {
            url: url.to_string(),
            started: at,
        });
    }

    fn complete_segment(&self, inner: &mut Inner, pending: &Pending, at: NaiveDateTime) {
        let wall = wall_between(pending.started, at);
        let wall_ms = wall.as_secs_f64() * 1_000.0;
        inner.segment_wall.push(wall_ms);
        inner.segment_stats.record(wall_ms);
        inner.segment_sketch.record(wall);
        self.counters.segment_count.fetch_add(1, Ordering::Relaxed);

        let Some(lookup) = &self.size_lookup else {
            return;
        };
        match lookup.segment_size(segment_filename(&pending.url)) {
            Some(bytes) => {
                self.counters
                    .segment_bytes_downloaded
                    .fetch_add(bytes, Ordering::Relaxed);
                if let Some(sink) = &self.sink {
                    sink.record_segment_size(bytes);
                }
                inner.throughput.record(bytes, wall);
            }
            None => {
                self.counters.size_lookup_misses.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn on_playlist_open(&self, url: &str, at: NaiveDateTime) {
        self.counters.playlist_refreshes.fetch_add(1, Ordering::Relaxed);
        if let Some(sink) = &self.sink {
            sink.increment_manifest_requests();
        }
        let target_ms = self.config.target_duration.as_secs_f64() * 1_000.0;
        let mut inner = self.inner.lock();
        if let Some(last) = inner.last_refresh {
            let interval_ms = (at - last).num_milliseconds() as f64;
            let jitter_ms = interval_ms - target_ms;
            inner.jitter.samples += 1;
            inner.jitter.sum_ms += jitter_ms;
            inner.jitter.max_abs_ms = inner.jitter.max_abs_ms.max(jitter_ms.abs());
            if jitter_ms > 0.0 {
                inner.jitter.late += 1;
            }
        }
        inner.last_refresh = Some(at);

        if let Some(pending) = inner
            .pending_manifests
            .iter_mut()
            .find(|pending| pending.url == url)
        {
            pending.started = at;
        } else {
            inner.pending_manifests.push_back(Pending {
                url: url.to_string(),
                started: at,
            });
        }
    }

    /// Both the format-probe line and the manifest skip line mean the same
    /// thing: the manifest has been fully read. Only the first of the two
    /// finds the pending entry.
    fn on_manifest_parsed(&self, at: NaiveDateTime) {
        self.emit(at, || DebugEventKind::ManifestParsed);
        let mut inner = self.inner.lock();
        if let Some(pending) = inner.pending_manifests.pop_front() {
            let wall = wall_between(pending.started, at);
            inner.manifest_stats.record(wall.as_secs_f64() * 1_000.0);
            inner.manifest_sketch.record(wall);
            self.counters.manifest_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_tcp_start(&self, ip: &str, port: u16, at: NaiveDateTime) {
        self.emit(at, || DebugEventKind::TcpStart {
            ip: ip.to_string(),
            port,
        });
        let mut inner = self.inner.lock();
        inner.pending_tcp.insert(format!("{ip}:{port}"), at);
    }

    fn on_tcp_connected(&self, ip: &str, port: u16, at: NaiveDateTime) {
        self.counters.tcp_success_count.fetch_add(1, Ordering::Relaxed);
        self.emit(at, || DebugEventKind::TcpConnected {
            ip: ip.to_string(),
            port,
        });
        let mut inner = self.inner.lock();
        // Only a paired start produces a latency sample.
        if let Some(started) = inner.pending_tcp.remove(&format!("{ip}:{port}")) {
            let wall_ms = wall_between(started, at).as_secs_f64() * 1_000.0;
            inner.tcp_wall.push(wall_ms);
            inner.tcp_stats.record(wall_ms);
            self.counters.tcp_connect_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_tcp_failed(&self, ip: &str, port: u16, reason: &str, at: NaiveDateTime) {
        let kind = TcpFailureKind::classify(reason);
        self.counters.tcp_failure_count.fetch_add(1, Ordering::Relaxed);
        match kind {
            TcpFailureKind::Refused => {
                self.counters.tcp_refused_count.fetch_add(1, Ordering::Relaxed);
            }
            TcpFailureKind::TimedOut => {
                self.counters.tcp_timeout_count.fetch_add(1, Ordering::Relaxed);
                if let Some(sink) = &self.sink {
                    sink.increment_timeouts();
                }
            }
            TcpFailureKind::Error => {
                self.counters.tcp_error_count.fetch_add(1, Ordering::Relaxed);
            }
        }
        // Drop the pending start, if any, so a later unrelated success
        // cannot pair with it. No latency sample for failures.
        self.inner.lock().pending_tcp.remove(&format!("{ip}:{port}"));
        self.emit(at, || DebugEventKind::TcpFailed { kind });
    }

    fn on_sequence_change(&self, old: i64, new: i64, at: NaiveDateTime) {
        self.emit(at, || DebugEventKind::SequenceChange { old, new });
        let mut inner = self.inner.lock();
        if inner.last_sequence > 0 && new != inner.last_sequence + 1 {
            self.counters.sequence_skips.fetch_add(1, Ordering::Relaxed);
        }
        inner.last_sequence = new;
    }

    fn on_http_error(&self, code: u16, message: &str, at: NaiveDateTime) {
        self.counters.http_errors_total.fetch_add(1, Ordering::Relaxed);
        match code {
            400..=499 => {
                self.counters.http_errors_4xx.fetch_add(1, Ordering::Relaxed);
            }
            500..=599 => {
                self.counters.http_errors_5xx.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        if let Some(sink) = &self.sink {
            sink.record_http_error(code);
        }
        let message = message.to_string();
        self.emit(at, || DebugEventKind::HttpError { code, message });
    }

    /// Snapshot of everything the parser has derived so far. Scalar counters
    /// are read from atomics; distribution state is cloned under the mutex so
    /// the aggregator can merge sketches across clients.
    pub fn stats(&self) -> ParserStats {
        let c = &self.counters;
        let lines_total = c.lines_total.load(Ordering::Relaxed);
        let timestamps_used = c.timestamps_used.load(Ordering::Relaxed);
        let http_open_count = c.http_open_count.load(Ordering::Relaxed);
        let http_errors_total = c.http_errors_total.load(Ordering::Relaxed);
        let segment_failed_count = c.segment_failed_count.load(Ordering::Relaxed);
        let tcp_success_count = c.tcp_success_count.load(Ordering::Relaxed);
        let tcp_failure_count = c.tcp_failure_count.load(Ordering::Relaxed);

        let inner = self.inner.lock();
        ParserStats {
            lines_total,
            lines_matched: c.lines_matched.load(Ordering::Relaxed),
            timestamps_used,
            timestamp_fraction: if lines_total == 0 {
                0.0
            } else {
                timestamps_used as f64 / lines_total as f64
            },
            http_open_count,
            http_get_count: c.http_get_count.load(Ordering::Relaxed),
            http_errors_total,
            http_errors_4xx: c.http_errors_4xx.load(Ordering::Relaxed),
            http_errors_5xx: c.http_errors_5xx.load(Ordering::Relaxed),
            reconnect_count: c.reconnect_count.load(Ordering::Relaxed),
            tcp_success_count,
            tcp_failure_count,
            tcp_refused_count: c.tcp_refused_count.load(Ordering::Relaxed),
            tcp_timeout_count: c.tcp_timeout_count.load(Ordering::Relaxed),
            tcp_error_count: c.tcp_error_count.load(Ordering::Relaxed),
            tcp_connect_count: c.tcp_connect_count.load(Ordering::Relaxed),
            playlist_refreshes: c.playlist_refreshes.load(Ordering::Relaxed),
            sequence_skips: c.sequence_skips.load(Ordering::Relaxed),
            segment_count: c.segment_count.load(Ordering::Relaxed),
            manifest_count: c.manifest_count.load(Ordering::Relaxed),
            segment_failed_count,
            segment_skipped_count: c.segment_skipped_count.load(Ordering::Relaxed),
            playlist_failed_count: c.playlist_failed_count.load(Ordering::Relaxed),
            segments_expired_sum: c.segments_expired_sum.load(Ordering::Relaxed),
            bytes_downloaded: c.bytes_downloaded.load(Ordering::Relaxed),
            segment_bytes_downloaded: c.segment_bytes_downloaded.load(Ordering::Relaxed),
            size_lookup_misses: c.size_lookup_misses.load(Ordering::Relaxed),
            bandwidth_bps: c.bandwidth_bps.load(Ordering::Relaxed),
            error_rate: if http_open_count == 0 {
                0.0
            } else {
                (http_errors_total + segment_failed_count) as f64 / http_open_count as f64
            },
            tcp_health_ratio: if tcp_success_count + tcp_failure_count == 0 {
                1.0
            } else {
                tcp_success_count as f64 / (tcp_success_count + tcp_failure_count) as f64
            },
            segment_wall: inner.segment_stats,
            segment_percentiles: inner.segment_sketch.percentiles(),
            recent_segment_wall_ms: inner.segment_wall.to_vec(),
            manifest_wall: inner.manifest_stats,
            manifest_percentiles: inner.manifest_sketch.percentiles(),
            tcp_connect: inner.tcp_stats,
            recent_tcp_connect_ms: inner.tcp_wall.to_vec(),
            jitter_sum_ms: inner.jitter.sum_ms,
            jitter_max_abs_ms: inner.jitter.max_abs_ms,
            jitter_late: inner.jitter.late,
            jitter_samples: inner.jitter.samples,
            throughput_mean_bps: inner.throughput.mean_bps(),
            throughput_p50_bps: inner.throughput.value_at(0.50),
            throughput_p95_bps: inner.throughput.value_at(0.95),
            throughput_samples: inner.throughput.count(),
            pending_segments: inner.pending_segments.len(),
            pending_manifests: inner.pending_manifests.len(),
            pending_tcp: inner.pending_tcp.len(),
            segment_sketch: inner.segment_sketch.clone(),
            manifest_sketch: inner.manifest_sketch.clone(),
            throughput_sketch: inner.throughput.clone(),
        }
    }
}

impl line_pipeline::LineParser for DebugEventParser {
    fn parse_line(&self, line: &str) {
        DebugEventParser::parse_line(self, line);
    }
}

fn parse_u16(text: &str) -> u16 {
    text.parse().unwrap_or(0)
}

fn parse_u64(text: &str) -> u64 {
    text.parse().unwrap_or(0)
}

fn parse_i64(text: &str) -> i64 {
    text.parse().unwrap_or(0)
}

/// Snapshot struct returned by [`DebugEventParser::stats`].
#[derive(Debug, Clone)]
pub struct ParserStats {
    pub lines_total: u64,
    pub lines_matched: u64,
    pub timestamps_used: u64,
    /// Fraction of lines that carried transcoder-supplied timestamps; tells
    /// operators how precise the downstream timings are.
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
    /// Paired start→connected samples only.
    pub tcp_connect_count: u64,
    pub playlist_refreshes: u64,
    pub sequence_skips: u64,
    pub segment_count: u64,
    pub manifest_count: u64,
    pub segment_failed_count: u64,
    pub segment_skipped_count: u64,
    pub playlist_failed_count: u64,
    pub segments_expired_sum: u64,
    /// Sum of observed Content-Length headers.
    pub bytes_downloaded: u64,
    /// Bytes attributed to completed segments via the size lookup.
    pub segment_bytes_downloaded: u64,
    pub size_lookup_misses: u64,
    /// Advertised bandwidth, last writer wins.
    pub bandwidth_bps: u64,
    pub error_rate: f64,
    pub tcp_health_ratio: f64,
    /// Milliseconds.
    pub segment_wall: RunningStats,
    pub segment_percentiles: Percentiles,
    pub recent_segment_wall_ms: Vec<f64>,
    pub manifest_wall: RunningStats,
    pub manifest_percentiles: Percentiles,
    pub tcp_connect: RunningStats,
    pub recent_tcp_connect_ms: Vec<f64>,
    pub jitter_sum_ms: f64,
    pub jitter_max_abs_ms: f64,
    pub jitter_late: u64,
    pub jitter_samples: u64,
    pub throughput_mean_bps: f64,
    pub throughput_p50_bps: f64,
    pub throughput_p95_bps: f64,
    pub throughput_samples: u64,
    pub pending_segments: usize,
    pub pending_manifests: usize,
    pub pending_tcp: usize,
    pub segment_sketch: QuantileSketch,
    pub manifest_sketch: QuantileSketch,
    pub throughput_sketch: ThroughputHistogram,
}
