//! Line source over a Unix-domain socket created at a caller-supplied path.
//!
//! The subprocess is expected to connect within a short grace window; if it
//! does not, the reader marks itself failed-to-connect and exits cleanly so
//! the supervisor can fall back to a pipe on the next launch. One connection
//! per lifetime.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::LineSourceError;
use crate::pipeline::Pipeline;
use crate::source::{
    LineSource, ReadyFlag, ReadySignal, SourceCloser, SourceCounters, SourceStats,
    scan_into_pipeline,
};

/// `sockaddr_un.sun_path` limit on the BSDs; the strictest of the platforms
/// this runs on, so paths are validated against it everywhere.
pub const MAX_SOCKET_PATH_LEN: usize = 104;

/// Grace given to the subprocess to connect to a freshly bound socket.
pub const DEFAULT_CONNECT_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct SocketReaderConfig {
    pub connect_grace: Duration,
}

impl Default for SocketReaderConfig {
    fn default() -> Self {
        Self {
            connect_grace: DEFAULT_CONNECT_GRACE,
        }
    }
}

#[derive(Debug)]
pub struct SocketReader {
    path: PathBuf,
    listener: Option<UnixListener>,
    pipeline: Arc<Pipeline>,
    counters: Arc<SourceCounters>,
    ready: ReadySignal,
    token: CancellationToken,
    failed_to_connect: Arc<AtomicBool>,
    connect_grace: Duration,
}

impl SocketReader {
    /// Bind a listener at `path` with the default connect grace.
    ///
    /// Fails with [`LineSourceError::PathTooLong`] for paths over
    /// [`MAX_SOCKET_PATH_LEN`] bytes so the caller can fall back to a pipe.
    /// A stale socket file at the path is removed first.
    pub fn bind(path: impl Into<PathBuf>, pipeline: Arc<Pipeline>) -> Result<Self, LineSourceError> {
        Self::bind_with(path, pipeline, SocketReaderConfig::default())
    }

    pub fn bind_with(
        path: impl Into<PathBuf>,
        pipeline: Arc<Pipeline>,
        config: SocketReaderConfig,
    ) -> Result<Self, LineSourceError> {
        let path = path.into();
        let len = path.as_os_str().len();
        if len > MAX_SOCKET_PATH_LEN {
            return Err(LineSourceError::PathTooLong {
                len,
                max: MAX_SOCKET_PATH_LEN,
            });
        }
        remove_stale(&path)?;
        let listener = UnixListener::bind(&path)?;

        // The OS backlog holds an early connect, so the source is ready to
        // receive as soon as the listener is bound.
        let (flag, ready) = ReadyFlag::new();
        flag.mark_ready();

        Ok(Self {
            path,
            listener: Some(listener),
            pipeline,
            counters: SourceCounters::new(),
            ready,
            token: CancellationToken::new(),
            failed_to_connect: Arc::new(AtomicBool::new(false)),
            connect_grace: config.connect_grace,
        })
    }

    /// True once the connect grace expired without a connection. Persists so
    /// the supervisor can route future launches through a pipe instead.
    pub fn failed_to_connect(&self) -> bool {
        self.failed_to_connect.load(Ordering::Relaxed)
    }

    /// Shareable handle to the failed-to-connect flag, for consulting after
    /// the reader itself is gone.
    pub fn failed_flag(&self) -> Arc<AtomicBool> {
        self.failed_to_connect.clone()
    }

    /// Close handle that keeps working after the reader has been moved into
    /// its producer task. Closing unblocks a pending accept immediately, the
    /// same as [`LineSource::close`].
    pub fn closer(&self) -> SourceCloser {
        SourceCloser::new(self.token.clone())
    }

    pub fn socket_path(&self) -> &Path {
        &self.path
    }

    fn cleanup(&self) {
        self.pipeline.close_channel();
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %self.path.display(), error = %e, "socket file removal failed");
            }
        }
    }
}

fn remove_stale(path: &Path) -> Result<(), LineSourceError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale socket file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl LineSource for SocketReader {
    async fn run(&mut self) -> Result<(), LineSourceError> {
        let Some(listener) = self.listener.take() else {
            debug!("socket reader already ran");
            return Ok(());
        };

        let accepted = tokio::select! {
            _ = self.token.cancelled() => {
                self.cleanup();
                return Ok(());
            }
            res = tokio::time::timeout(self.connect_grace, listener.accept()) => res,
        };

        let stream = match accepted {
            Ok(Ok((stream, _addr))) => stream,
            Ok(Err(e)) => {
                self.counters.failed.store(true, Ordering::Relaxed);
                self.cleanup();
                return Err(e.into());
            }
            Err(_elapsed) => {
                self.failed_to_connect.store(true, Ordering::Relaxed);
                self.counters.failed.store(true, Ordering::Relaxed);
                warn!(
                    path = %self.path.display(),
                    grace_ms = self.connect_grace.as_millis() as u64,
                    "no connection within grace period, subsequent launches will use a pipe"
                );
                self.cleanup();
                return Ok(());
            }
        };

        // One connection per lifetime.
        drop(listener);

        let result = scan_into_pipeline(stream, &self.pipeline, &self.counters, &self.token).await;
        self.cleanup();
        if let Err(e) = result {
            self.counters.failed.store(true, Ordering::Relaxed);
            return Err(e.into());
        }
        Ok(())
    }

    fn ready(&self) -> ReadySignal {
        self.ready.clone()
    }

    fn close(&self) {
        self.token.cancel();
    }

    fn stats(&self) -> SourceStats {
        self.counters.stats()
    }
}

impl Drop for SocketReader {
    fn drop(&mut self) {
        // Leave no socket file behind even if run() was never awaited.
        let _ = std::fs::remove_file(&self.path);
    }
}
