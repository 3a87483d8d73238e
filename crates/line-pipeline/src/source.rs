//! Line source contract shared by the pipe, fd and socket readers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::LineSourceError;
use crate::pipeline::Pipeline;

/// Per-line budget. A buffer that grows past this without a newline is
/// flushed as one oversized line so a runaway line cannot grow memory
/// without bound or wedge the source.
pub const MAX_LINE_LEN: usize = 64 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// Byte/line counters for one source lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceStats {
    pub bytes_read: u64,
    pub lines_read: u64,
    pub healthy: bool,
}

/// Uniform producer contract: open an input, emit lines into a [`Pipeline`],
/// signal readiness, clean up.
#[async_trait]
pub trait LineSource: Send {
    /// Read until EOF or [`close`](LineSource::close), feeding each line into
    /// the pipeline. Closes the pipeline queue exactly once on exit so the
    /// downstream parser observes EOF and terminates.
    async fn run(&mut self) -> Result<(), LineSourceError>;

    /// Single-shot readiness signal, observable once the source can accept
    /// or receive data. A supervisor must not launch the subprocess before
    /// observing it.
    fn ready(&self) -> ReadySignal;

    /// Idempotent; unblocks any pending read or accept and releases OS
    /// resources.
    fn close(&self);

    fn stats(&self) -> SourceStats;
}

/// Observer half of a source's readiness signal.
#[derive(Debug, Clone)]
pub struct ReadySignal {
    rx: watch::Receiver<bool>,
}

impl ReadySignal {
    pub fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the source signals readiness. Also returns if the source is
    /// dropped, so callers cannot hang on a dead source.
    pub async fn wait(mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Detached close handle for a source that has been moved into its producer
/// task. Closing through it is equivalent to [`LineSource::close`] and just
/// as idempotent.
#[derive(Debug, Clone)]
pub struct SourceCloser {
    token: CancellationToken,
}

impl SourceCloser {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn close(&self) {
        self.token.cancel();
    }
}

pub(crate) struct ReadyFlag {
    tx: watch::Sender<bool>,
}

impl ReadyFlag {
    pub(crate) fn new() -> (Self, ReadySignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ReadySignal { rx })
    }

    pub(crate) fn mark_ready(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug)]
pub(crate) struct SourceCounters {
    pub bytes_read: AtomicU64,
    pub lines_read: AtomicU64,
    pub failed: AtomicBool,
}

impl SourceCounters {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            bytes_read: AtomicU64::new(0),
            lines_read: AtomicU64::new(0),
            failed: AtomicBool::new(false),
        })
    }

    pub(crate) fn stats(&self) -> SourceStats {
        SourceStats {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            lines_read: self.lines_read.load(Ordering::Relaxed),
            healthy: !self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Incremental newline splitter with the 64 KiB per-line budget.
pub(crate) struct LineScanner {
    pending: Vec<u8>,
    // Bytes already searched for a newline, so each byte is scanned once.
    searched: usize,
}

impl LineScanner {
    pub(crate) fn new() -> Self {
        Self {
            pending: Vec::new(),
            searched: 0,
        }
    }

    pub(crate) fn extend(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Next complete line, if any. Oversized buffers flush at the budget.
    pub(crate) fn next_line(&mut self) -> Option<String> {
        if let Some(i) = memchr::memchr(b'\n', &self.pending[self.searched..]) {
            let end = self.searched + i;
            let line = make_line(&self.pending[..end]);
            self.pending.drain(..=end);
            self.searched = 0;
            return Some(line);
        }
        if self.pending.len() >= MAX_LINE_LEN {
            let line = make_line(&self.pending[..MAX_LINE_LEN]);
            self.pending.drain(..MAX_LINE_LEN);
            self.searched = 0;
            return Some(line);
        }
        self.searched = self.pending.len();
        None
    }

    /// Whatever remains at EOF.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = make_line(&self.pending);
        self.pending.clear();
        self.searched = 0;
        Some(line)
    }
}

fn make_line(bytes: &[u8]) -> String {
    let bytes = match bytes.last() {
        Some(b'\r') => &bytes[..bytes.len() - 1],
        _ => bytes,
    };
    String::from_utf8_lossy(bytes).into_owned()
}

/// Shared read loop: pull chunks from `reader`, split into lines, feed the
/// pipeline. Returns on EOF, cancellation or read error; the caller closes
/// the pipeline queue.
pub(crate) async fn scan_into_pipeline<R>(
    mut reader: R,
    pipeline: &Pipeline,
    counters: &SourceCounters,
    token: &CancellationToken,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut scanner = LineScanner::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = tokio::select! {
            _ = token.cancelled() => break,
            res = reader.read(&mut chunk) => res?,
        };
        if n == 0 {
            break;
        }
        counters.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        scanner.extend(&chunk[..n]);
        while let Some(line) = scanner.next_line() {
            counters.lines_read.fetch_add(1, Ordering::Relaxed);
            pipeline.feed_line(line);
        }
    }
    if let Some(line) = scanner.finish() {
        counters.lines_read.fetch_add(1, Ordering::Relaxed);
        pipeline.feed_line(line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanner_splits_on_newlines() {
        let mut scanner = LineScanner::new();
        scanner.extend(b"one\ntwo\r\nthr");
        assert_eq!(scanner.next_line().as_deref(), Some("one"));
        assert_eq!(scanner.next_line().as_deref(), Some("two"));
        assert_eq!(scanner.next_line(), None);
        scanner.extend(b"ee\n");
        assert_eq!(scanner.next_line().as_deref(), Some("three"));
        assert_eq!(scanner.finish(), None);
    }

    #[test]
    fn scanner_flushes_remainder_at_eof() {
        let mut scanner = LineScanner::new();
        scanner.extend(b"partial");
        assert_eq!(scanner.next_line(), None);
        assert_eq!(scanner.finish().as_deref(), Some("partial"));
    }

    #[test]
    fn scanner_flushes_oversized_lines_at_budget() {
        let mut scanner = LineScanner::new();
        scanner.extend(&vec![b'x'; MAX_LINE_LEN + 10]);
        let line = scanner.next_line().expect("budget flush");
        assert_eq!(line.len(), MAX_LINE_LEN);
        assert_eq!(scanner.next_line(), None);
        scanner.extend(b"\n");
        assert_eq!(scanner.next_line().as_deref(), Some("xxxxxxxxxx"));
    }

    #[tokio::test]
    async fn ready_signal_observes_late_mark() {
        let (flag, signal) = ReadyFlag::new();
        assert!(!signal.is_ready());
        let waiter = tokio::spawn(signal.clone().wait());
        flag.mark_ready();
        waiter.await.unwrap();
        assert!(signal.is_ready());
    }
}
