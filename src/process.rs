//! Child process lifecycle: spawn, monitor, restart with backoff, PID
//! snapshotting and re-attachment.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use log::{info, warn};
use tokio::process::{Child, Command};

use crate::error::Result;
use crate::manifest::{ChildSpec, RestartPolicy};

const RESTART_WINDOW: Duration = Duration::from_secs(300);
const RESTART_THROTTLE: usize = 10;
const BACKOFF_MIN: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(16);
const STABLE_RESET_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Starting,
    Running,
}

/// A running or previously-running child, along with the bookkeeping the
/// monitor loop needs to apply restart policy and backoff.
pub struct ChildProc {
    pub spec: ChildSpec,
    pub state: RunState,
    pub child: Option<Child>,
    pub pid: Option<u32>,
    pub started_at: Option<Instant>,
    pub restart_count: u32,
    pub restart_backoff: Duration,
    restart_times: VecDeque<Instant>,
    log_dir: PathBuf,
}

impl ChildProc {
    pub fn new(spec: ChildSpec, log_dir: PathBuf) -> Self {
        Self {
            spec,
            state: RunState::Stopped,
            child: None,
            pid: None,
            started_at: None,
            restart_count: 0,
            restart_backoff: BACKOFF_MIN,
            restart_times: VecDeque::new(),
            log_dir,
        }
    }

    fn log_files(&self) -> Result<(File, File)> {
        std::fs::create_dir_all(&self.log_dir)?;
        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_dir.join(format!("{}.stdout.log", self.spec.id)))?;
        let stderr = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_dir.join(format!("{}.stderr.log", self.spec.id)))?;
        Ok((stdout, stderr))
    }

    /// Spawn the child in its own process group (Unix) so a single signal
    /// sent to the group reaches any grandchildren it forks.
    pub fn spawn(&mut self) -> Result<()> {
        let mut parts = self.spec.command.split_whitespace();
        let program = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        let (stdout, stderr) = self.log_files()?;

        let mut cmd = Command::new(program);
        cmd.args(&args)
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .env("AGENT_ID", &self.spec.id);
        if let Some(dir) = &self.spec.working_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn()?;
        self.pid = child.id();
        self.child = Some(child);
        self.state = RunState::Starting;
        self.started_at = Some(Instant::now());
        info!(
            "spawned child {} ({}), pid={:?}",
            self.spec.id, self.spec.display_name, self.pid
        );
        Ok(())
    }

    /// Send SIGTERM (or kill the handle on non-Unix), wait up to 10s, then
    /// SIGKILL if it's still alive.
    pub async fn stop(&mut self) {
        let Some(pid) = self.pid else {
            self.state = RunState::Stopped;
            return;
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
        #[cfg(not(unix))]
        {
            if let Some(child) = self.child.as_mut() {
                let _ = child.start_kill();
            }
        }

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(child) = self.child.as_mut() {
                if let Ok(Some(_)) = child.try_wait() {
                    break;
                }
            } else {
                break;
            }
            if Instant::now() >= deadline {
                warn!("child {} did not exit after SIGTERM, killing", self.spec.id);
                #[cfg(unix)]
                {
                    use nix::sys::signal::{self, Signal};
                    use nix::unistd::Pid;
                    let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
                }
                #[cfg(not(unix))]
                {
                    if let Some(child) = self.child.as_mut() {
                        let _ = child.kill().await;
                    }
                }
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        self.state = RunState::Stopped;
        self.child = None;
        self.pid = None;
    }

    /// Poll for exit without blocking. Returns the exit code if the child
    /// has exited since the last call.
    pub fn poll_exit(&mut self) -> Option<Option<i32>> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                self.state = RunState::Stopped;
                self.child = None;
                Some(status.code())
            }
            _ => None,
        }
    }

    /// Adopt an externally-observed PID (one recorded in a prior run's PID
    /// snapshot that is still alive) as RUNNING without respawning it.
    pub fn adopt(&mut self, pid: u32) {
        self.pid = Some(pid);
        self.state = RunState::Running;
        self.started_at = Some(Instant::now());
    }

    /// Decide whether a just-exited child should be restarted, applying the
    /// policy, the 10-per-5-minute throttle, and the doubling backoff.
    /// Returns the delay to wait before respawning, or `None` to stay stopped.
    pub fn restart_decision(&mut self, exit_code: Option<i32>) -> Option<Duration> {
        let should_restart = match self.spec.restart_policy {
            RestartPolicy::Always => true,
            RestartPolicy::OnFailure => exit_code.map(|c| c != 0).unwrap_or(true),
            RestartPolicy::Never => false,
        };
        if !should_restart {
            return None;
        }

        let now = Instant::now();
        while let Some(&front) = self.restart_times.front() {
            if now.duration_since(front) > RESTART_WINDOW {
                self.restart_times.pop_front();
            } else {
                break;
            }
        }
        if self.restart_times.len() >= RESTART_THROTTLE {
            warn!(
                "child {} exceeded {} restarts in the last 5 minutes, staying stopped",
                self.spec.id, RESTART_THROTTLE
            );
            return None;
        }

        if let Some(started) = self.started_at {
            if now.duration_since(started) >= STABLE_RESET_AFTER {
                self.restart_backoff = BACKOFF_MIN;
            }
        }

        let delay = self.restart_backoff;
        self.restart_backoff = (self.restart_backoff * 2).min(BACKOFF_MAX);
        self.restart_times.push_back(now);
        self.restart_count += 1;
        Some(delay)
    }

    pub fn uptime(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }
}

/// Persist the {id -> pid} map so a restarted supervisor can re-attach to
/// still-living children instead of respawning them.
pub fn save_pids(path: &Path, pids: &std::collections::HashMap<String, u32>) -> Result<()> {
    let json = serde_json::to_string_pretty(pids)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(tmp, path)?;
    Ok(())
}

pub fn load_pids(path: &Path) -> std::collections::HashMap<String, u32> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

/// Liveness check for re-attachment: `kill(pid, 0)` on Unix, best-effort
/// elsewhere.
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;
    signal::kill(Pid::from_raw(pid as i32), None as Option<Signal>).is_ok()
}

#[cfg(not(unix))]
pub fn pid_alive(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ChildKind, ChildSpec};

    fn spec(policy: RestartPolicy) -> ChildSpec {
        ChildSpec {
            id: "x".to_string(),
            display_name: "X".to_string(),
            kind: ChildKind::Agent,
            command: "true".to_string(),
            restart_policy: policy,
            ready_port: None,
            working_dir: None,
        }
    }

    #[test]
    fn never_policy_never_restarts() {
        let mut c = ChildProc::new(spec(RestartPolicy::Never), PathBuf::from("/tmp"));
        assert_eq!(c.restart_decision(Some(1)), None);
    }

    #[test]
    fn on_failure_skips_clean_exit() {
        let mut c = ChildProc::new(spec(RestartPolicy::OnFailure), PathBuf::from("/tmp"));
        assert_eq!(c.restart_decision(Some(0)), None);
        assert!(c.restart_decision(Some(1)).is_some());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut c = ChildProc::new(spec(RestartPolicy::Always), PathBuf::from("/tmp"));
        let d1 = c.restart_decision(Some(1)).unwrap();
        let d2 = c.restart_decision(Some(1)).unwrap();
        let d3 = c.restart_decision(Some(1)).unwrap();
        assert_eq!(d1, BACKOFF_MIN);
        assert_eq!(d2, BACKOFF_MIN * 2);
        assert_eq!(d3, BACKOFF_MIN * 4);
    }

    #[test]
    fn restart_storm_stops_after_ten_in_five_minutes() {
        let mut c = ChildProc::new(spec(RestartPolicy::OnFailure), PathBuf::from("/tmp"));
        let mut restarted = 0;
        for _ in 0..15 {
            if c.restart_decision(Some(1)).is_some() {
                restarted += 1;
            }
        }
        assert_eq!(restarted, RESTART_THROTTLE);
        assert_eq!(c.restart_count, RESTART_THROTTLE as u32);
    }
}
