//! Per-client supervisor: owns one subprocess and its line pipelines,
//! restarting on exit with jittered backoff.
//!
//! State machine: Created → Starting → Running → Backoff → (Starting |
//! Stopped), with Stopped terminal. The diagnostic stream arrives on the
//! child's stderr; the progress stream arrives on a per-client Unix socket
//! when one is configured and healthy, falling back to none after a socket
//! failure. Pipelines and line sources are created fresh for every
//! subprocess lifetime; the parsers and stats record live as long as the
//! client.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use line_pipeline::{
    LineSource, PipeReader, Pipeline, SocketReader, SocketReaderConfig, SourceCloser,
};
use swarm_telemetry::{
    ClientStats, DebugEventParser, ProgressParser, SegmentSizeLookup, StatsSink,
};

use crate::aggregator::ClientHandle;
use crate::backoff::Backoff;
use crate::config::SwarmConfig;
use crate::SupervisorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Created,
    Starting,
    Running,
    Backoff,
    Stopped,
}

/// What the supervisor decided for one subprocess launch; the factory turns
/// it into a concrete command line.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub client_id: u64,
    /// Where the child should write its progress stream, when a socket is in
    /// use for this launch.
    pub progress_socket: Option<std::path::PathBuf>,
}

/// Builds the subprocess command. Argument construction is the caller's
/// domain; the supervisor only dictates stdio (stderr is always piped for
/// the diagnostic stream).
pub trait ProcessFactory: Send + Sync {
    fn command(&self, plan: &LaunchPlan) -> Command;
}

enum LoopEnd {
    Cancelled,
    Exited(std::io::Result<std::process::ExitStatus>),
}

enum RunOutcome {
    Cancelled,
    Exited(std::process::ExitStatus),
}

struct ProgressAttachment {
    producer: JoinHandle<Result<(), line_pipeline::LineSourceError>>,
    consumer: JoinHandle<()>,
    failed: Arc<AtomicBool>,
    // The reader itself lives inside the producer task; this is the only way
    // left to unblock a pending accept without waiting out the grace.
    closer: SourceCloser,
}

fn close_progress(progress: &Option<ProgressAttachment>) {
    if let Some(attachment) = progress {
        attachment.closer.close();
    }
}

pub struct ClientSupervisor {
    id: u64,
    config: SwarmConfig,
    factory: Arc<dyn ProcessFactory>,
    stats: Arc<ClientStats>,
    parser: Arc<DebugEventParser>,
    progress: Arc<ProgressParser>,
    state_tx: watch::Sender<SupervisorState>,
    token: CancellationToken,
    socket_ok: AtomicBool,
    restarts: AtomicU64,
}

impl ClientSupervisor {
    pub fn new(
        id: u64,
        config: SwarmConfig,
        factory: Arc<dyn ProcessFactory>,
        size_lookup: Option<Arc<dyn SegmentSizeLookup>>,
    ) -> Arc<Self> {
        let stats = Arc::new(ClientStats::new(config.client_stats.clone()));
        let sink: Arc<dyn StatsSink> = stats.clone();
        let mut parser = DebugEventParser::new(config.parser.clone()).with_stats_sink(sink);
        if let Some(lookup) = size_lookup {
            parser = parser.with_size_lookup(lookup);
        }
        let progress = Arc::new(ProgressParser::new(stats.clone()));
        let (state_tx, _) = watch::channel(SupervisorState::Created);
        Arc::new(Self {
            id,
            config,
            factory,
            stats,
            parser: Arc::new(parser),
            progress,
            state_tx,
            token: CancellationToken::new(),
            socket_ok: AtomicBool::new(true),
            restarts: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SupervisorState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    /// Subprocess exits observed so far.
    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }

    /// The aggregator's view of this client.
    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            id: self.id,
            stats: self.stats.clone(),
            parser: self.parser.clone(),
        }
    }

    pub fn stats(&self) -> Arc<ClientStats> {
        self.stats.clone()
    }

    pub fn parser(&self) -> Arc<DebugEventParser> {
        self.parser.clone()
    }

    pub fn progress(&self) -> Arc<ProgressParser> {
        self.progress.clone()
    }

    /// Request a stop. Idempotent; the run loop lands in Stopped.
    pub fn stop(&self) {
        self.token.cancel();
    }

    fn set_state(&self, state: SupervisorState) {
        self.state_tx.send_replace(state);
    }

    /// Drive the client until stopped: spawn, observe, back off, restart.
    pub async fn run(self: Arc<Self>) {
        let mut backoff = Backoff::new(self.config.backoff.clone(), self.id, self.config.seed);
        while !self.token.is_cancelled() {
            self.set_state(SupervisorState::Starting);
            let launched_at = Instant::now();
            match self.run_once().await {
                Ok(RunOutcome::Cancelled) => break,
                Ok(RunOutcome::Exited(status)) => {
                    self.restarts.fetch_add(1, Ordering::Relaxed);
                    info!(client = self.id, %status, "subprocess exited");
                    if launched_at.elapsed() >= self.config.stable_run {
                        backoff.reset();
                    }
                }
                Err(e) => {
                    self.restarts.fetch_add(1, Ordering::Relaxed);
                    warn!(client = self.id, error = %e, "subprocess launch failed");
                }
            }
            if self.token.is_cancelled() {
                break;
            }
            self.set_state(SupervisorState::Backoff);
            let delay = backoff.next_delay();
            debug!(
                client = self.id,
                delay_ms = delay.as_millis() as u64,
                attempt = backoff.attempts(),
                "backing off before restart"
            );
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.set_state(SupervisorState::Stopped);
    }

    /// One subprocess lifetime: sources readied, child spawned, pipelines
    /// drained to EOF.
    async fn run_once(&self) -> Result<RunOutcome, SupervisorError> {
        // Fold the previous process's byte counter before anything new runs.
        self.stats.on_process_start();

        let debug_pipeline = Arc::new(Pipeline::new(self.config.pipeline.clone()));
        let debug_consumer = tokio::spawn({
            let pipeline = debug_pipeline.clone();
            let parser = self.parser.clone();
            async move { pipeline.run_parser(&parser).await }
        });

        let mut plan = LaunchPlan {
            client_id: self.id,
            progress_socket: None,
        };
        let progress = self.attach_progress_socket(&mut plan).await;

        let mut command = self.factory.command(&plan);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                debug_pipeline.close_channel();
                let _ = debug_consumer.await;
                close_progress(&progress);
                self.drain_progress(progress).await;
                return Err(SupervisorError::Spawn { source });
            }
        };

        let Some(stderr) = child.stderr.take() else {
            drop(child);
            debug_pipeline.close_channel();
            let _ = debug_consumer.await;
            close_progress(&progress);
            self.drain_progress(progress).await;
            return Err(SupervisorError::MissingStderr);
        };
        let debug_producer = tokio::spawn({
            let mut source = PipeReader::new(stderr, debug_pipeline.clone());
            async move { source.run().await }
        });

        self.set_state(SupervisorState::Running);

        let mut sample = tokio::time::interval(self.config.pipeline_sample_interval);
        sample.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let end = loop {
            tokio::select! {
                _ = self.token.cancelled() => break LoopEnd::Cancelled,
                status = child.wait() => break LoopEnd::Exited(status),
                _ = sample.tick() => {
                    let stats = debug_pipeline.stats();
                    self.stats.record_dropped_lines(stats.read, stats.dropped);
                }
            }
        };

        let outcome = match end {
            LoopEnd::Cancelled => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                // A progress socket may still be inside its connect grace;
                // close it now so shutdown never waits that window out.
                close_progress(&progress);
                RunOutcome::Cancelled
            }
            LoopEnd::Exited(Ok(status)) => RunOutcome::Exited(status),
            LoopEnd::Exited(Err(source)) => {
                let _ = child.start_kill();
                close_progress(&progress);
                self.finish_sources(debug_producer, debug_consumer, &debug_pipeline, progress)
                    .await;
                return Err(SupervisorError::Wait { source });
            }
        };

        self.finish_sources(debug_producer, debug_consumer, &debug_pipeline, progress)
            .await;
        Ok(outcome)
    }

    /// Bind and ready the progress socket before the child launches, so the
    /// child never writes into a void. Any failure flips this client to
    /// pipe-only for all future launches.
    async fn attach_progress_socket(&self, plan: &mut LaunchPlan) -> Option<ProgressAttachment> {
        let dir = self.config.socket_dir.as_ref()?;
        if !self.socket_ok.load(Ordering::Relaxed) {
            return None;
        }
        let path = dir.join(format!("client-{}-progress.sock", self.id));
        let pipeline = Arc::new(Pipeline::new(self.config.pipeline.clone()));
        let mut source = match SocketReader::bind_with(
            &path,
            pipeline.clone(),
            SocketReaderConfig {
                connect_grace: self.config.socket_connect_grace,
            },
        ) {
            Ok(source) => source,
            Err(e) => {
                warn!(
                    client = self.id,
                    error = %e,
                    "progress socket unavailable, using pipe-only transport"
                );
                self.socket_ok.store(false, Ordering::Relaxed);
                return None;
            }
        };

        let ready = source.ready();
        let failed = source.failed_flag();
        let closer = source.closer();
        let producer = tokio::spawn(async move { source.run().await });
        ready.wait().await;

        let consumer = tokio::spawn({
            let progress = self.progress.clone();
            async move { pipeline.run_parser(&progress).await }
        });

        plan.progress_socket = Some(path);
        Some(ProgressAttachment {
            producer,
            consumer,
            failed,
            closer,
        })
    }

    async fn drain_progress(&self, progress: Option<ProgressAttachment>) {
        let Some(attachment) = progress else {
            return;
        };
        let _ = attachment.producer.await;
        let _ = attachment.consumer.await;
        if attachment.failed.load(Ordering::Relaxed) {
            self.socket_ok.store(false, Ordering::Relaxed);
            info!(
                client = self.id,
                "progress socket never connected, future launches use pipe-only transport"
            );
        }
    }

    /// The child is gone: EOF propagates through every source, which closes
    /// each pipeline queue, which terminates each consumer. A normal exit
    /// leaves an unconnected progress socket to wait out its grace so the
    /// failed-to-connect flag can still set and trigger the pipe fallback.
    async fn finish_sources(
        &self,
        debug_producer: JoinHandle<Result<(), line_pipeline::LineSourceError>>,
        debug_consumer: JoinHandle<()>,
        debug_pipeline: &Pipeline,
        progress: Option<ProgressAttachment>,
    ) {
        let _ = debug_producer.await;
        let _ = debug_consumer.await;
        self.drain_progress(progress).await;
        let stats = debug_pipeline.stats();
        self.stats.record_dropped_lines(stats.read, stats.dropped);
    }
}
