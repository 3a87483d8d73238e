//! # Swarm Telemetry
//!
//! Turns the best-effort diagnostic output of a third-party transcoder into
//! typed events and bounded-latency statistics.
//!
//! The [`DebugEventParser`] consumes raw diagnostic lines (optionally carrying
//! authoritative wall-clock timestamps), reconstructs segment, manifest, TCP
//! and HTTP lifecycles, and maintains online aggregates a reader can snapshot
//! at any time. [`ClientStats`] is the per-client record those aggregates and
//! the progress stream feed into: atomic counters, ring buffers and sketches
//! safe for concurrent writers and one reader. [`ProgressParser`] handles the
//! transcoder's machine-readable `key=value` progress stream.

mod client_stats;
mod event;
mod lookup;
mod parser;
mod patterns;
mod progress;
mod sketch;
mod timestamp;

pub use client_stats::{
    ClientStats, ClientStatsConfig, ClientStatsSummary, HttpErrorSummary, StatsSink,
};
pub use event::{DebugEvent, DebugEventKind, TcpFailureKind};
pub use lookup::{SegmentSizeLookup, StaticSizeTable};
pub use parser::{DebugEventParser, ParserConfig, ParserStats};
pub use progress::{ProgressParser, ProgressStats};
pub use sketch::{Percentiles, QuantileSketch, RingBuffer, RunningStats, ThroughputHistogram};
pub use timestamp::split_timestamp;
