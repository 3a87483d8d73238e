//! Fleet configuration.

use std::path::PathBuf;
use std::time::Duration;

use line_pipeline::PipelineConfig;
use swarm_telemetry::{ClientStatsConfig, ParserConfig};

use crate::backoff::BackoffPolicy;

#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Number of concurrent clients.
    pub clients: usize,
    /// Seed mixed into every client's backoff jitter stream.
    pub seed: u64,
    pub backoff: BackoffPolicy,
    pub pipeline: PipelineConfig,
    pub parser: ParserConfig,
    pub client_stats: ClientStatsConfig,
    /// Directory for per-client progress sockets. `None` disables the
    /// progress stream entirely; socket failures fall back per client.
    pub socket_dir: Option<PathBuf>,
    /// Grace given to a subprocess to connect to its progress socket.
    pub socket_connect_grace: Duration,
    /// How often the supervisor samples pipeline health into the client
    /// stats record while the subprocess runs.
    pub pipeline_sample_interval: Duration,
    /// A run at least this long resets the client's backoff attempts.
    pub stable_run: Duration,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            clients: 10,
            seed: 0,
            backoff: BackoffPolicy::default(),
            pipeline: PipelineConfig::default(),
            parser: ParserConfig::default(),
            client_stats: ClientStatsConfig::default(),
            socket_dir: None,
            socket_connect_grace: Duration::from_secs(3),
            pipeline_sample_interval: Duration::from_secs(1),
            stable_run: Duration::from_secs(30),
        }
    }
}
