//! Compact summaries kept per client: fixed-capacity sample rings, running
//! min/max/sum/count, a mergeable quantile sketch and a logarithmic
//! throughput histogram.

use std::time::Duration;

use hdrhistogram::Histogram;

// Sketch range: 1 µs to 60 s at 3 significant figures.
const SKETCH_HIGH_US: u64 = 60_000_000;
const SKETCH_SIGFIG: u8 = 3;

// Throughput range: 1 B/s to 100 GB/s. Two significant figures are plenty
// for a log-bucketed rate distribution.
const THROUGHPUT_HIGH_BPS: u64 = 100_000_000_000;
const THROUGHPUT_SIGFIG: u8 = 2;

/// Fixed-capacity overwrite-oldest sample buffer.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    samples: Vec<f64>,
    capacity: usize,
    next: usize,
    total: u64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            next: 0,
            total: 0,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.samples.len() < self.capacity {
            self.samples.push(value);
        } else {
            self.samples[self.next] = value;
        }
        self.next = (self.next + 1) % self.capacity;
        self.total += 1;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Total samples ever pushed, including overwritten ones.
    pub fn total_pushed(&self) -> u64 {
        self.total
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.samples.clone()
    }
}

/// Online min/max/sum/count.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl RunningStats {
    pub fn record(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.sum += value;
        self.count += 1;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn merge(&mut self, other: &RunningStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.count += other.count;
    }
}

/// The percentile set reported for duration distributions, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Percentiles {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Mergeable quantile sketch over durations, microsecond resolution.
#[derive(Clone)]
pub struct QuantileSketch {
    hist: Histogram<u64>,
}

impl std::fmt::Debug for QuantileSketch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuantileSketch")
            .field("count", &self.hist.len())
            .field("p50_ms", &self.value_at(0.5))
            .finish()
    }
}

impl Default for QuantileSketch {
    fn default() -> Self {
        Self::new()
    }
}

impl QuantileSketch {
    pub fn new() -> Self {
        Self {
            hist: Histogram::new_with_bounds(1, SKETCH_HIGH_US, SKETCH_SIGFIG)
                .expect("static histogram bounds"),
        }
    }

    /// Record a duration sample. Values past the 60 s range saturate rather
    /// than error; a poisoned sketch is never acceptable on the hot path.
    pub fn record(&mut self, wall: Duration) {
        let us = u64::try_from(wall.as_micros()).unwrap_or(u64::MAX);
        self.hist.saturating_record(us);
    }

    pub fn count(&self) -> u64 {
        self.hist.len()
    }

    /// Value at quantile `q` in [0, 1], milliseconds.
    pub fn value_at(&self, q: f64) -> f64 {
        if self.hist.is_empty() {
            return 0.0;
        }
        self.hist.value_at_quantile(q) as f64 / 1_000.0
    }

    pub fn percentiles(&self) -> Percentiles {
        Percentiles {
            p25: self.value_at(0.25),
            p50: self.value_at(0.50),
            p75: self.value_at(0.75),
            p95: self.value_at(0.95),
            p99: self.value_at(0.99),
        }
    }

    /// Fold `other` into this sketch. Both sides share static bounds, so the
    /// addition cannot fail on range.
    pub fn merge_from(&mut self, other: &QuantileSketch) {
        let _ = self.hist.add(&other.hist);
    }
}

/// Logarithmic histogram of transfer rates in bytes per second.
#[derive(Clone)]
pub struct ThroughputHistogram {
    hist: Histogram<u64>,
    min_wall: Duration,
}

impl std::fmt::Debug for ThroughputHistogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThroughputHistogram")
            .field("count", &self.hist.len())
            .field("mean_bps", &self.mean_bps())
            .finish()
    }
}

impl ThroughputHistogram {
    /// `min_wall` guards the division: transfers completing faster than this
    /// are skipped, not recorded as absurd rates.
    pub fn new(min_wall: Duration) -> Self {
        Self {
            hist: Histogram::new_with_bounds(1, THROUGHPUT_HIGH_BPS, THROUGHPUT_SIGFIG)
                .expect("static histogram bounds"),
            min_wall,
        }
    }

    /// Record a completed transfer. Returns whether a sample was taken.
    pub fn record(&mut self, bytes: u64, wall: Duration) -> bool {
        if wall < self.min_wall || wall.is_zero() {
            return false;
        }
        let bps = bytes as f64 / wall.as_secs_f64();
        self.hist.saturating_record(bps as u64);
        true
    }

    pub fn count(&self) -> u64 {
        self.hist.len()
    }

    pub fn mean_bps(&self) -> f64 {
        if self.hist.is_empty() {
            0.0
        } else {
            self.hist.mean()
        }
    }

    /// Rate at quantile `q` in [0, 1], bytes per second.
    pub fn value_at(&self, q: f64) -> f64 {
        if self.hist.is_empty() {
            return 0.0;
        }
        self.hist.value_at_quantile(q) as f64
    }

    pub fn merge_from(&mut self, other: &ThroughputHistogram) {
        let _ = self.hist.add(&other.hist);
    }
}
