//! Fleet supervisor: spawns infrastructure and agent processes in
//! dependency order, monitors them, restarts per policy with capped
//! exponential backoff, and exposes a local control socket.

pub mod control;
pub mod error;
pub mod manifest;
pub mod process;

use std::collections::HashMap;
use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use tokio::sync::Mutex;
use tokio::time::Instant as TokioInstant;

pub use error::{Error, Result};
pub use manifest::{ChildKind, ChildSpec, Manifest, RestartPolicy};
pub use process::{ChildProc, RunState};

const READY_PROBE_INTERVAL: Duration = Duration::from_secs(1);
const READY_PROBE_TIMEOUT: Duration = Duration::from_secs(60);
const AGENT_STAGGER: Duration = Duration::from_millis(500);
const MONITOR_INTERVAL: Duration = Duration::from_millis(500);

pub struct Supervisor {
    pub manifest: Manifest,
    pub data_dir: PathBuf,
    children: Mutex<HashMap<String, ChildProc>>,
}

impl Supervisor {
    pub fn new(manifest: Manifest, data_dir: PathBuf) -> Self {
        let children = manifest
            .children
            .iter()
            .cloned()
            .map(|spec| {
                let id = spec.id.clone();
                (id, ChildProc::new(spec, data_dir.join("logs")))
            })
            .collect();
        Self {
            manifest,
            data_dir,
            children: Mutex::new(children),
        }
    }

    fn pid_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("pids.json")
    }

    async fn snapshot_pids(&self) {
        let children = self.children.lock().await;
        let pids: HashMap<String, u32> = children
            .iter()
            .filter_map(|(id, c)| c.pid.map(|pid| (id.clone(), pid)))
            .collect();
        if let Err(e) = process::save_pids(&self.pid_snapshot_path(), &pids) {
            warn!("failed to snapshot pids: {e}");
        }
    }

    /// Re-attach to any previously-spawned children that are still alive,
    /// per the on-disk PID snapshot, without respawning them.
    async fn reattach(&self) {
        let saved = process::load_pids(&self.pid_snapshot_path());
        let mut children = self.children.lock().await;
        for (id, pid) in saved {
            if process::pid_alive(pid) {
                if let Some(c) = children.get_mut(&id) {
                    info!("re-attaching to child {id} (pid {pid}), already running");
                    c.adopt(pid);
                }
            }
        }
    }

    async fn spawn_one(&self, id: &str) -> Result<()> {
        let mut children = self.children.lock().await;
        let child = children
            .get_mut(id)
            .ok_or_else(|| Error::UnknownChild(id.to_string()))?;
        child.spawn()?;
        Ok(())
    }

    async fn wait_ready(&self, spec: &ChildSpec) -> Result<()> {
        let Some(port) = spec.ready_port else {
            return Ok(());
        };
        let deadline = TokioInstant::now() + READY_PROBE_TIMEOUT;
        loop {
            let addr: SocketAddr = format!("127.0.0.1:{port}")
                .parse()
                .expect("valid loopback address");
            if TcpStream::connect_timeout(&addr, Duration::from_millis(200)).is_ok() {
                info!("child {} ready on port {port}", spec.id);
                return Ok(());
            }
            if TokioInstant::now() >= deadline {
                return Err(Error::ReadyTimeout(spec.id.clone()));
            }
            tokio::time::sleep(READY_PROBE_INTERVAL).await;
        }
    }

    /// Phase 1: spawn infra, wait for readiness. Phase 2: spawn agents,
    /// staggered.
    pub async fn start_all(&self) -> Result<()> {
        self.reattach().await;

        for spec in self.manifest.infra() {
            let already_running = {
                let children = self.children.lock().await;
                children
                    .get(&spec.id)
                    .map(|c| c.state == RunState::Running)
                    .unwrap_or(false)
            };
            if already_running {
                continue;
            }
            self.spawn_one(&spec.id).await?;
            self.wait_ready(spec).await?;
            {
                let mut children = self.children.lock().await;
                if let Some(c) = children.get_mut(&spec.id) {
                    c.state = RunState::Running;
                }
            }
        }

        for spec in self.manifest.agents() {
            let already_running = {
                let children = self.children.lock().await;
                children
                    .get(&spec.id)
                    .map(|c| c.state == RunState::Running)
                    .unwrap_or(false)
            };
            if already_running {
                continue;
            }
            self.spawn_one(&spec.id).await?;
            {
                let mut children = self.children.lock().await;
                if let Some(c) = children.get_mut(&spec.id) {
                    c.state = RunState::Running;
                }
            }
            tokio::time::sleep(AGENT_STAGGER).await;
        }

        self.snapshot_pids().await;
        Ok(())
    }

    pub async fn start_one(&self, id: &str) -> Result<()> {
        self.spawn_one(id).await?;
        let spec = self
            .manifest
            .find(id)
            .ok_or_else(|| Error::UnknownChild(id.to_string()))?
            .clone();
        self.wait_ready(&spec).await?;
        {
            let mut children = self.children.lock().await;
            if let Some(c) = children.get_mut(id) {
                c.state = RunState::Running;
            }
        }
        self.snapshot_pids().await;
        Ok(())
    }

    pub async fn stop_one(&self, id: &str) -> Result<()> {
        let mut children = self.children.lock().await;
        let child = children
            .get_mut(id)
            .ok_or_else(|| Error::UnknownChild(id.to_string()))?;
        child.stop().await;
        drop(children);
        self.snapshot_pids().await;
        Ok(())
    }

    pub async fn restart_one(&self, id: &str) -> Result<()> {
        self.stop_one(id).await?;
        self.start_one(id).await
    }

    /// Reverse-order cascade: agents descending by id, then infra.
    pub async fn shutdown(&self) {
        let mut agent_ids: Vec<String> = self.manifest.agents().map(|c| c.id.clone()).collect();
        agent_ids.sort_by(|a, b| b.cmp(a));
        for id in agent_ids {
            let _ = self.stop_one(&id).await;
        }
        let mut infra_ids: Vec<String> = self.manifest.infra().map(|c| c.id.clone()).collect();
        infra_ids.sort_by(|a, b| b.cmp(a));
        for id in infra_ids {
            let _ = self.stop_one(&id).await;
        }
    }

    /// 2 Hz poll loop: detect exits, apply restart policy/backoff/throttle.
    pub async fn monitor_loop(&self) {
        loop {
            tokio::time::sleep(MONITOR_INTERVAL).await;
            let exited: Vec<(String, Option<i32>)> = {
                let mut children = self.children.lock().await;
                let mut out = Vec::new();
                for (id, child) in children.iter_mut() {
                    if child.state == RunState::Running || child.state == RunState::Starting {
                        if let Some(code) = child.poll_exit() {
                            warn!("child {id} exited with code {code:?}");
                            out.push((id.clone(), code));
                        }
                    }
                }
                out
            };

            for (id, code) in exited {
                let delay = {
                    let mut children = self.children.lock().await;
                    children.get_mut(&id).and_then(|c| c.restart_decision(code))
                };
                if let Some(delay) = delay {
                    let id2 = id.clone();
                    tokio::time::sleep(delay).await;
                    if let Err(e) = self.spawn_one(&id2).await {
                        warn!("failed to restart {id2}: {e}");
                        continue;
                    }
                    let mut children = self.children.lock().await;
                    if let Some(c) = children.get_mut(&id2) {
                        c.state = RunState::Running;
                    }
                    drop(children);
                    self.snapshot_pids().await;
                }
            }
        }
    }

    pub async fn status(&self) -> Vec<StatusLine> {
        let children = self.children.lock().await;
        self.manifest
            .children
            .iter()
            .map(|spec| {
                let c = children.get(&spec.id);
                StatusLine {
                    id: spec.id.clone(),
                    display_name: spec.display_name.clone(),
                    state: c.map(|c| c.state).unwrap_or(RunState::Stopped),
                    pid: c.and_then(|c| c.pid),
                    uptime: c.and_then(|c| c.uptime()),
                    restart_count: c.map(|c| c.restart_count).unwrap_or(0),
                }
            })
            .collect()
    }
}

pub struct StatusLine {
    pub id: String,
    pub display_name: String,
    pub state: RunState,
    pub pid: Option<u32>,
    pub uptime: Option<Duration>,
    pub restart_count: u32,
}

impl std::fmt::Display for StatusLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            RunState::Stopped => "STOPPED",
            RunState::Starting => "STARTING",
            RunState::Running => "RUNNING",
        };
        write!(
            f,
            "{:<12} {:<20} {:<9} pid={:<8} uptime={:<6} restarts={}",
            self.id,
            self.display_name,
            state,
            self.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            self.uptime
                .map(|d| format!("{}s", d.as_secs()))
                .unwrap_or_else(|| "-".into()),
            self.restart_count,
        )
    }
}

pub fn control_socket_path(project_dir: &Path) -> PathBuf {
    project_dir
        .join("data")
        .join("system-master")
        .join("control.sock")
}
