//! End-to-end supervisor lifecycle against real subprocesses.

#![cfg(unix)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::process::Command;

use swarm_supervisor::{
    BackoffPolicy, ClientSupervisor, LaunchPlan, ProcessFactory, SupervisorState, SwarmConfig,
};

struct ScriptFactory {
    script: PathBuf,
    plans: Mutex<Vec<LaunchPlan>>,
}

impl ScriptFactory {
    fn new(script: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            script,
            plans: Mutex::new(Vec::new()),
        })
    }

    fn plans(&self) -> Vec<LaunchPlan> {
        self.plans.lock().unwrap().clone()
    }
}

impl ProcessFactory for ScriptFactory {
    fn command(&self, plan: &LaunchPlan) -> Command {
        self.plans.lock().unwrap().push(plan.clone());
        let mut cmd = Command::new("/bin/sh");
        cmd.arg(&self.script);
        cmd
    }
}

fn write_script(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("client.sh");
    std::fs::write(&path, body).unwrap();
    path
}

fn fast_config() -> SwarmConfig {
    SwarmConfig {
        backoff: BackoffPolicy {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(50),
            multiplier: 1.7,
            jitter: 0.4,
        },
        pipeline_sample_interval: Duration::from_millis(50),
        ..SwarmConfig::default()
    }
}

const EMITTING_CLIENT: &str = r#"cat >&2 <<'EOF'
[tcp @ 0x1] Starting connection attempt to 10.0.0.1 port 80
[tcp @ 0x1] Successfully connected to 10.0.0.1 port 80
[hls @ 0x1] HLS request for url 'http://o/a.ts', offset 0, playlist 0
[hls @ 0x1] HLS request for url 'http://o/b.ts', offset 0, playlist 0
EOF
exit 0
"#;

async fn wait_for<F: Fn() -> bool>(what: &str, condition: F) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

#[tokio::test]
async fn restarts_preserve_parser_state_across_subprocess_lifetimes() {
    let dir = tempfile::tempdir().unwrap();
    let factory = ScriptFactory::new(write_script(&dir, EMITTING_CLIENT));
    let supervisor = ClientSupervisor::new(0, fast_config(), factory, None);

    let runner = tokio::spawn(supervisor.clone().run());

    {
        let supervisor = supervisor.clone();
        wait_for("three subprocess exits", move || supervisor.restarts() >= 3).await;
    }

    supervisor.stop();
    runner.await.unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Stopped);

    // Each run completes one segment (a.ts flushed by b.ts); the parser
    // survives restarts, so completions accumulate across lifetimes, and the
    // cross-run flush of the still-pending segment adds more.
    let parser = supervisor.parser().stats();
    assert!(parser.segment_count >= 3, "got {}", parser.segment_count);
    assert!(parser.tcp_connect_count >= 3);

    let stats = supervisor.stats();
    assert!(stats.process_starts() >= 3);
}

#[tokio::test]
async fn stop_kills_the_child_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    // `exec` so the kill reaches the sleeping process itself, not a shell
    // parent that would leave it holding our stderr pipe open.
    let factory = ScriptFactory::new(write_script(&dir, "exec sleep 600\n"));
    let supervisor = ClientSupervisor::new(1, fast_config(), factory, None);

    let mut states = supervisor.watch_state();
    let runner = tokio::spawn(supervisor.clone().run());

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if *states.borrow_and_update() == SupervisorState::Running {
                break;
            }
            states.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    let stopped_at = std::time::Instant::now();
    supervisor.stop();
    supervisor.stop();
    runner.await.unwrap();

    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    assert!(
        stopped_at.elapsed() < Duration::from_secs(5),
        "stop must not wait out the sleeping child"
    );
}

#[tokio::test]
async fn launch_failure_backs_off_and_retries() {
    let factory = {
        struct Missing;
        impl ProcessFactory for Missing {
            fn command(&self, _plan: &LaunchPlan) -> Command {
                Command::new("/nonexistent/transcoder-binary")
            }
        }
        Arc::new(Missing)
    };
    let supervisor = ClientSupervisor::new(2, fast_config(), factory, None);

    let runner = tokio::spawn(supervisor.clone().run());
    {
        let supervisor = supervisor.clone();
        wait_for("repeated launch attempts", move || supervisor.restarts() >= 2).await;
    }
    supervisor.stop();
    runner.await.unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
}

#[tokio::test]
async fn stop_during_socket_connect_grace_shuts_down_promptly() {
    let dir = tempfile::tempdir().unwrap();
    let sockets = tempfile::tempdir().unwrap();
    // A child that never connects to its progress socket and never exits,
    // with a grace long enough that only an explicit close ends the accept.
    let factory = ScriptFactory::new(write_script(&dir, "exec sleep 600\n"));
    let config = SwarmConfig {
        socket_dir: Some(sockets.path().to_path_buf()),
        socket_connect_grace: Duration::from_secs(30),
        ..fast_config()
    };
    let supervisor = ClientSupervisor::new(4, config, factory, None);

    let mut states = supervisor.watch_state();
    let runner = tokio::spawn(supervisor.clone().run());

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if *states.borrow_and_update() == SupervisorState::Running {
                break;
            }
            states.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    let stopped_at = std::time::Instant::now();
    supervisor.stop();
    runner.await.unwrap();

    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    assert!(
        stopped_at.elapsed() < Duration::from_secs(5),
        "stop must not wait out the socket connect grace, took {:?}",
        stopped_at.elapsed()
    );
}

#[tokio::test]
async fn progress_socket_falls_back_to_pipe_after_connect_grace() {
    let dir = tempfile::tempdir().unwrap();
    let sockets = tempfile::tempdir().unwrap();
    let factory = ScriptFactory::new(write_script(&dir, EMITTING_CLIENT));
    let config = SwarmConfig {
        socket_dir: Some(sockets.path().to_path_buf()),
        socket_connect_grace: Duration::from_millis(100),
        ..fast_config()
    };
    let supervisor = ClientSupervisor::new(3, config, factory.clone(), None);

    let runner = tokio::spawn(supervisor.clone().run());
    {
        let supervisor = supervisor.clone();
        wait_for("two launches", move || supervisor.restarts() >= 2).await;
    }
    supervisor.stop();
    runner.await.unwrap();

    let plans = factory.plans();
    assert!(plans.len() >= 2);
    assert!(
        plans[0].progress_socket.is_some(),
        "first launch offers the socket"
    );
    assert!(
        plans.last().unwrap().progress_socket.is_none(),
        "later launches fall back to pipe-only after the grace expired"
    );
}
