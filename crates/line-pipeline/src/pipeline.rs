//! Bounded lossy queue between a line producer and its parser.
//!
//! The producer side must never block: the observed subprocess writes its
//! diagnostic stream into a pipe or socket, and back-pressure from the
//! observer would perturb the client under test. When the queue is full the
//! line is dropped and counted instead.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Default queue capacity between a line source and its parser.
pub const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Default dropped-line ratio above which the pipeline reports degraded.
pub const DEFAULT_DROP_THRESHOLD: f64 = 0.01;

/// Pipeline tuning knobs. Out-of-range values fall back to the defaults
/// instead of erroring.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Queue capacity in lines.
    pub buffer_size: usize,
    /// Dropped-line ratio above which [`Pipeline::is_degraded`] reports true.
    pub drop_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            drop_threshold: DEFAULT_DROP_THRESHOLD,
        }
    }
}

impl PipelineConfig {
    fn validated(mut self) -> Self {
        if self.buffer_size == 0 {
            debug!(fallback = DEFAULT_BUFFER_SIZE, "invalid buffer size");
            self.buffer_size = DEFAULT_BUFFER_SIZE;
        }
        if !self.drop_threshold.is_finite()
            || self.drop_threshold <= 0.0
            || self.drop_threshold > 1.0
        {
            debug!(fallback = DEFAULT_DROP_THRESHOLD, "invalid drop threshold");
            self.drop_threshold = DEFAULT_DROP_THRESHOLD;
        }
        self
    }
}

/// A consumer drained by [`Pipeline::run_parser`].
///
/// Takes `&self` so a parser with interior mutability can outlive the
/// pipeline it is currently attached to: pipelines are re-created on every
/// subprocess restart, parsers are not.
pub trait LineParser: Send + Sync {
    fn parse_line(&self, line: &str);
}

impl<P: LineParser + ?Sized> LineParser for std::sync::Arc<P> {
    fn parse_line(&self, line: &str) {
        (**self).parse_line(line);
    }
}

/// Counter snapshot. `read = dropped + parsed + in-flight` at all times; once
/// the pipeline is closed and drained, in-flight is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineStats {
    pub read: u64,
    pub dropped: u64,
    pub parsed: u64,
}

/// Bounded queue transporting lines from one producer to one parser.
#[derive(Debug)]
pub struct Pipeline {
    tx: Mutex<Option<mpsc::Sender<String>>>,
    rx: Mutex<Option<mpsc::Receiver<String>>>,
    read: AtomicU64,
    dropped: AtomicU64,
    parsed: AtomicU64,
    drop_threshold: f64,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let config = config.validated();
        let (tx, rx) = mpsc::channel(config.buffer_size);
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            read: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            parsed: AtomicU64::new(0),
            drop_threshold: config.drop_threshold,
        }
    }

    /// Non-blocking enqueue. A full or closed queue drops the line; `read`
    /// counts every call either way.
    pub fn feed_line(&self, line: String) {
        self.read.fetch_add(1, Ordering::Relaxed);
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if tx.try_send(line).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drain the queue into `parser` until the channel closes.
    ///
    /// A pipeline has at most one consumer; a second call returns immediately.
    pub async fn run_parser<P: LineParser + ?Sized>(&self, parser: &P) {
        let receiver = self.rx.lock().take();
        let Some(mut rx) = receiver else {
            debug!("pipeline already has a consumer");
            return;
        };
        while let Some(line) = rx.recv().await {
            parser.parse_line(&line);
            self.parsed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Close the queue so the consumer terminates once drained. Idempotent.
    pub fn close_channel(&self) {
        self.tx.lock().take();
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            read: self.read.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            parsed: self.parsed.load(Ordering::Relaxed),
        }
    }

    /// Fraction of read lines that were dropped. Zero before any input.
    pub fn drop_rate(&self) -> f64 {
        let read = self.read.load(Ordering::Relaxed);
        if read == 0 {
            return 0.0;
        }
        self.dropped.load(Ordering::Relaxed) as f64 / read as f64
    }

    /// True when the drop rate exceeds the configured threshold, meaning the
    /// metrics downstream of this pipeline are incomplete.
    pub fn is_degraded(&self) -> bool {
        self.drop_rate() > self.drop_threshold
    }
}
