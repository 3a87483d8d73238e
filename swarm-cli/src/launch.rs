//! Transcoder command construction.

use tokio::process::Command;

use swarm_supervisor::{LaunchPlan, ProcessFactory};

/// Builds the ffmpeg invocation for one client: pull the origin playlist,
/// decode to null, and emit the diagnostic stream on stderr. When the
/// supervisor offers a progress socket, the machine-readable progress stream
/// is pointed at it.
pub struct FfmpegFactory {
    binary: String,
    url: String,
}

impl FfmpegFactory {
    pub fn new(binary: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            url: url.into(),
        }
    }
}

impl ProcessFactory for FfmpegFactory {
    fn command(&self, plan: &LaunchPlan) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-hide_banner")
            .arg("-nostats")
            .args(["-loglevel", "debug"]);
        if let Some(path) = &plan.progress_socket {
            cmd.arg("-progress")
                .arg(format!("unix://{}", path.display()));
        }
        cmd.args(["-i", &self.url]).args(["-f", "null", "-"]);
        cmd
    }
}
