//! # Swarm Supervisor
//!
//! Owns the fleet: one [`ClientSupervisor`] per client runs the subprocess
//! lifecycle state machine (spawn, observe, restart with jittered exponential
//! backoff), wiring fresh line pipelines to long-lived parsers on every
//! restart. The [`Aggregator`] fans per-client statistics into a single
//! read-only record on its own cadence, computing instantaneous rates by
//! differencing against its previous snapshot.

use thiserror::Error;

mod aggregator;
mod backoff;
mod config;
mod supervisor;

pub use aggregator::{AggregateStats, Aggregator, ClientHandle};
pub use backoff::{Backoff, BackoffPolicy};
pub use config::SwarmConfig;
pub use supervisor::{ClientSupervisor, LaunchPlan, ProcessFactory, SupervisorState};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn subprocess: {source}")]
    Spawn { source: std::io::Error },

    #[error("subprocess has no stderr handle")]
    MissingStderr,

    #[error("subprocess wait failed: {source}")]
    Wait { source: std::io::Error },

    #[error(transparent)]
    Source(#[from] line_pipeline::LineSourceError),
}
