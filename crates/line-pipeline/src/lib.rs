//! # Line Pipeline
//!
//! Lossy ingestion of line-oriented diagnostic output from an observed
//! subprocess. The crate provides two layers:
//!
//! - [`Pipeline`]: a bounded queue between a line producer and a parser that
//!   never blocks the producer. When the queue is full, lines are dropped and
//!   counted instead of back-pressuring the subprocess under observation.
//! - [`LineSource`]: a uniform contract over the three ways a subprocess can
//!   hand us its output — a stdio pipe ([`PipeReader`]), an inherited file
//!   descriptor ([`FdReader`]) and a Unix-domain socket ([`SocketReader`]) —
//!   with a single-shot readiness signal, idempotent close and byte/line
//!   statistics.

use thiserror::Error;

mod pipe;
mod pipeline;
mod source;

#[cfg(unix)]
mod fd;
#[cfg(unix)]
mod socket;

pub use pipe::PipeReader;
pub use pipeline::{
    DEFAULT_BUFFER_SIZE, DEFAULT_DROP_THRESHOLD, LineParser, Pipeline, PipelineConfig,
    PipelineStats,
};
pub use source::{LineSource, MAX_LINE_LEN, ReadySignal, SourceCloser, SourceStats};

#[cfg(unix)]
pub use fd::FdReader;
#[cfg(unix)]
pub use socket::{DEFAULT_CONNECT_GRACE, MAX_SOCKET_PATH_LEN, SocketReader, SocketReaderConfig};

/// Errors surfaced from line source construction and I/O.
///
/// Construction errors (oversized socket path) are explicit so the caller can
/// fall back to another transport; runtime errors terminate the source but
/// never the observed subprocess.
#[derive(Debug, Error)]
pub enum LineSourceError {
    #[error("socket path is {len} bytes, exceeds the {max} byte limit")]
    PathTooLong { len: usize, max: usize },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}
