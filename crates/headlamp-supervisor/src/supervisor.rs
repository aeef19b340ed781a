use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::SupervisorError;
use crate::output::{spawn_line_stream, OutputLine, OutputStream};
use headlamp_types::DashboardStatus;

/// Where the dashboard binary lives and which kubeconfig it reads
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub binary_path: PathBuf,
    pub kubeconfig_path: PathBuf,
}

/// The currently owned child and the tasks attached to it
struct RunningChild {
    pid: Option<u32>,
    /// Cancels the output streams and kills the child
    cancel: CancellationToken,
    /// Waits for the child and records its exit
    watcher: JoinHandle<()>,
    streams: Vec<JoinHandle<()>>,
}

/// Owns at most one live dashboard process
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    current: Mutex<Option<RunningChild>>,
    status: Arc<RwLock<DashboardStatus>>,
    output_tx: Option<mpsc::UnboundedSender<OutputLine>>,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            current: Mutex::new(None),
            status: Arc::new(RwLock::new(DashboardStatus::default())),
            output_tx: None,
        }
    }

    /// Also send every output line to `tx`.
    ///
    /// Lines are logged either way; this is for embedders that want to
    /// surface dashboard output themselves. A dropped receiver is ignored.
    pub fn with_output(mut self, tx: mpsc::UnboundedSender<OutputLine>) -> Self {
        self.output_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Snapshot of the dashboard process state
    pub fn status(&self) -> DashboardStatus {
        self.status.read().clone()
    }

    /// Shared handle to the status, for readers outside the supervisor
    pub fn status_handle(&self) -> Arc<RwLock<DashboardStatus>> {
        Arc::clone(&self.status)
    }

    /// Launch the dashboard. Any previous child is terminated and awaited first.
    pub async fn start(&self) -> Result<Option<u32>, SupervisorError> {
        let mut current = self.current.lock().await;

        if let Some(previous) = current.take() {
            info!(pid = ?previous.pid, "Stopping previous Headlamp server");
            Self::terminate(previous).await;
        }

        let replacing = self.status.read().started_at.is_some();

        match self.spawn() {
            Ok(running) => {
                let pid = running.pid;
                {
                    let mut status = self.status.write();
                    status.running = true;
                    status.pid = pid;
                    status.started_at = Some(Utc::now());
                    if replacing {
                        status.restarts += 1;
                    }
                }
                info!(
                    pid = ?pid,
                    binary = %self.config.binary_path.display(),
                    kubeconfig = %self.config.kubeconfig_path.display(),
                    "Headlamp server started"
                );
                *current = Some(running);
                Ok(pid)
            }
            Err(e) => {
                {
                    let mut status = self.status.write();
                    status.running = false;
                    status.pid = None;
                }
                error!(error = %e, "Failed to start Headlamp server");
                Err(e)
            }
        }
    }

    /// Replace the running dashboard, e.g. after the kubeconfig changed
    pub async fn restart(&self) -> Result<Option<u32>, SupervisorError> {
        info!("Restarting Headlamp server");
        self.start().await
    }

    /// Terminate the dashboard and wait for it to exit
    pub async fn stop(&self) {
        let mut current = self.current.lock().await;
        if let Some(running) = current.take() {
            info!(pid = ?running.pid, "Stopping Headlamp server");
            Self::terminate(running).await;
        }
    }

    fn spawn(&self) -> Result<RunningChild, SupervisorError> {
        let mut child = Command::new(&self.config.binary_path)
            .arg("--kubeconfig")
            .arg(&self.config.kubeconfig_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                binary: self.config.binary_path.clone(),
                source,
            })?;

        let pid = child.id();
        let cancel = CancellationToken::new();
        let mut streams = Vec::with_capacity(2);

        if let Some(stdout) = child.stdout.take() {
            streams.push(spawn_line_stream(
                stdout,
                pid,
                OutputStream::Stdout,
                self.output_tx.clone(),
                cancel.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            streams.push(spawn_line_stream(
                stderr,
                pid,
                OutputStream::Stderr,
                self.output_tx.clone(),
                cancel.clone(),
            ));
        }

        let watcher = Self::spawn_watcher(child, pid, cancel.clone(), Arc::clone(&self.status));

        Ok(RunningChild {
            pid,
            cancel,
            watcher,
            streams,
        })
    }

    /// Wait for the child to exit (or kill it on cancellation) and record the exit
    fn spawn_watcher(
        mut child: Child,
        pid: Option<u32>,
        cancel: CancellationToken,
        status: Arc<RwLock<DashboardStatus>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let result = tokio::select! {
                result = child.wait() => result,
                _ = cancel.cancelled() => {
                    if let Err(e) = child.start_kill() {
                        warn!(pid = ?pid, error = %e, "Failed to kill Headlamp server");
                    }
                    child.wait().await
                }
            };

            match result {
                Ok(exit) => {
                    let code = exit.code();
                    info!(pid = ?pid, exit_code = ?code, "Headlamp server process exited with code {:?}", code);
                    let mut status = status.write();
                    // A newer child may already own the status
                    if status.pid == pid {
                        status.running = false;
                        status.last_exit_code = code;
                    }
                }
                Err(e) => {
                    error!(pid = ?pid, error = %e, "Failed to wait for Headlamp server");
                    let mut status = status.write();
                    if status.pid == pid {
                        status.running = false;
                    }
                }
            }
        })
    }

    async fn terminate(running: RunningChild) {
        running.cancel.cancel();
        if let Err(e) = running.watcher.await {
            warn!(pid = ?running.pid, error = %e, "Process watcher task failed");
        }
        for stream in running.streams {
            let _ = stream.await;
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        // Child is killed by kill_on_drop once the watcher goes away
        if let Ok(mut current) = self.current.try_lock() {
            if let Some(running) = current.take() {
                running.cancel.cancel();
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::time::Duration;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    async fn wait_for_exit(supervisor: &ProcessSupervisor) -> DashboardStatus {
        for _ in 0..100 {
            let status = supervisor.status();
            if !status.running {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("dashboard did not exit in time");
    }

    fn is_alive(pid: u32) -> bool {
        std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_forwards_output_and_records_exit() {
        let dir = tempfile::tempdir().unwrap();
        let binary = write_script(
            dir.path(),
            "headlamp-server",
            "echo \"args: $1 $2\"\necho oops 1>&2\nexit 3",
        );
        let kubeconfig = dir.path().join("kubeconfig.yaml");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let supervisor = ProcessSupervisor::new(SupervisorConfig {
            binary_path: binary,
            kubeconfig_path: kubeconfig.clone(),
        })
        .with_output(tx);

        supervisor.start().await.unwrap();
        let status = wait_for_exit(&supervisor).await;
        assert_eq!(status.last_exit_code, Some(3));

        let mut lines = Vec::new();
        while lines.len() < 2 {
            let line = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            lines.push(line);
        }

        let stdout = lines
            .iter()
            .find(|l| l.stream == OutputStream::Stdout)
            .unwrap();
        assert_eq!(
            stdout.line,
            format!("args: --kubeconfig {}", kubeconfig.display())
        );
        let stderr = lines
            .iter()
            .find(|l| l.stream == OutputStream::Stderr)
            .unwrap();
        assert_eq!(stderr.line, "oops");
    }

    #[tokio::test]
    async fn test_invalid_utf8_output_keeps_child_alive() {
        let dir = tempfile::tempdir().unwrap();
        let binary = write_script(
            dir.path(),
            "headlamp-server",
            "printf 'bad \\377 byte\\n'\nsleep 0.5\necho after\nexit 0",
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let supervisor = ProcessSupervisor::new(SupervisorConfig {
            binary_path: binary,
            kubeconfig_path: dir.path().join("kubeconfig.yaml"),
        })
        .with_output(tx);

        supervisor.start().await.unwrap();
        let status = wait_for_exit(&supervisor).await;
        assert_eq!(status.last_exit_code, Some(0));

        let mut lines = Vec::new();
        while lines.len() < 2 {
            let line = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            lines.push(line.line);
        }
        assert_eq!(lines, vec!["bad \u{FFFD} byte", "after"]);
    }

    #[tokio::test]
    async fn test_restart_replaces_child() {
        let dir = tempfile::tempdir().unwrap();
        let binary = write_script(dir.path(), "headlamp-server", "exec sleep 30");
        let supervisor = ProcessSupervisor::new(SupervisorConfig {
            binary_path: binary,
            kubeconfig_path: dir.path().join("kubeconfig.yaml"),
        });

        let first = supervisor.start().await.unwrap().unwrap();
        assert!(is_alive(first));

        let second = supervisor.restart().await.unwrap().unwrap();
        assert_ne!(first, second);
        assert!(!is_alive(first));
        assert!(is_alive(second));

        let status = supervisor.status();
        assert!(status.running);
        assert_eq!(status.pid, Some(second));
        assert_eq!(status.restarts, 1);

        supervisor.stop().await;
        assert!(!is_alive(second));
        assert!(!supervisor.status().running);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(SupervisorConfig {
            binary_path: dir.path().join("does-not-exist"),
            kubeconfig_path: dir.path().join("kubeconfig.yaml"),
        });

        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }));
        assert!(!supervisor.status().running);
    }
}
