use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "hls-swarm",
    about = "Drive a fleet of HLS clients against an origin and watch what it serves them",
    version
)]
pub struct Args {
    /// Origin playlist URL each client pulls.
    pub url: String,

    /// Number of concurrent clients.
    #[arg(short, long, default_value_t = 10)]
    pub clients: usize,

    /// Transcoder binary used as the HLS client.
    #[arg(long, default_value = "ffmpeg")]
    pub ffmpeg: String,

    /// Directory for per-client progress sockets. Omit to disable the
    /// progress stream (no playback speed / drift telemetry).
    #[arg(long)]
    pub socket_dir: Option<PathBuf>,

    /// Seconds between aggregate report lines.
    #[arg(long, default_value_t = 5)]
    pub interval: u64,

    /// Seed mixed into every client's restart jitter stream.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// File of `filename bytes` pairs mapping segment names to sizes, for
    /// byte and throughput attribution.
    #[arg(long)]
    pub segment_sizes: Option<PathBuf>,

    /// Debug-level logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Errors only.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}
