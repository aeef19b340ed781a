use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use headlamp_k8s::{to_yaml, write_kubeconfig};
use headlamp_proxy::{ProxyState, router};
use headlamp_supervisor::ProcessSupervisor;

use crate::config::Config;
use crate::frontend;

/// Aggregate clusters, write the kubeconfig and (re)start the dashboard on it
pub async fn refresh_dashboard(config: &Config, supervisor: &ProcessSupervisor) -> Result<()> {
    let document = config
        .aggregator()
        .kubeconfig()
        .await
        .context("Failed to aggregate clusters")?;
    let yaml = to_yaml(&document)?;

    let path = &supervisor.config().kubeconfig_path;
    write_kubeconfig(path, &yaml)
        .await
        .context("Failed to write kubeconfig")?;
    info!(
        path = %path.display(),
        clusters = document.clusters.len(),
        "Kubeconfig written"
    );

    supervisor
        .restart()
        .await
        .context("Failed to start Headlamp server")?;
    Ok(())
}

/// Run the dashboard and the proxy until ctrl-c
pub async fn run(config_path: PathBuf, config: Config) -> Result<()> {
    let supervisor = Arc::new(ProcessSupervisor::new(config.supervisor_config()));

    // A bad first pass leaves the proxy up; the watcher retries on the next edit
    if let Err(e) = refresh_dashboard(&config, &supervisor).await {
        error!(error = %format!("{:#}", e), "Initial dashboard start failed");
    }

    let state = ProxyState::new(config.proxy_config()?)
        .context("Invalid proxy configuration")?
        .with_dashboard_status(supervisor.status_handle());
    let listener = TcpListener::bind(config.proxy.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.proxy.listen))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = router(state).merge(frontend::router(&config)?);
    info!(
        route = %config.frontend.headlamp_route,
        mount_path = %config.proxy.mount_path,
        "Serving dashboard page and proxy"
    );

    let mut server = tokio::spawn(headlamp_proxy::serve(listener, app, shutdown_rx.clone()));

    let watcher = if config.watch.enabled {
        Some(tokio::spawn(watch_config(
            config_path,
            config,
            Arc::clone(&supervisor),
            shutdown_rx,
        )))
    } else {
        None
    };

    let result = tokio::select! {
        joined = &mut server => {
            // Proxy stopped on its own
            joined.context("Proxy task panicked")?.context("Proxy server failed")
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
            server
                .await
                .context("Proxy task panicked")?
                .context("Proxy server failed")
        }
    };

    let _ = shutdown_tx.send(true);
    if let Some(watcher) = watcher {
        let _ = watcher.await;
    }
    supervisor.stop().await;

    result
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

/// Re-aggregate and restart the dashboard when the cluster config changes
async fn watch_config(
    path: PathBuf,
    mut current: Config,
    supervisor: Arc<ProcessSupervisor>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(current.watch_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_modified = modified(&path).await;

    info!(path = %path.display(), "Watching config for cluster changes");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        let now = modified(&path).await;
        if now == last_modified {
            continue;
        }
        last_modified = now;

        let updated = match Config::load_existing(&path).await {
            Ok(Some(config)) => config,
            // Deleted or mid-save; the running dashboard keeps its clusters
            Ok(None) => {
                warn!(path = %path.display(), "Config file is missing, keeping current clusters");
                continue;
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Ignoring invalid config change");
                continue;
            }
        };

        if updated.kubernetes == current.kubernetes {
            continue;
        }
        if updated.headlamp_server != current.headlamp_server {
            warn!("headlamp_server settings changed; they apply after a restart of headlamp-host");
        }

        info!("Cluster configuration changed, reloading dashboard");
        // Keep the supervisor's paths; only the cluster list is reloaded
        let mut next = updated;
        next.headlamp_server = current.headlamp_server.clone();
        if let Err(e) = refresh_dashboard(&next, &supervisor).await {
            error!(error = %format!("{:#}", e), "Dashboard reload failed");
        }
        current = next;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use headlamp_supervisor::SupervisorConfig;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    /// Fake dashboard binary and the kubeconfig path it is pointed at
    fn fake_dashboard(dir: &Path) -> (PathBuf, PathBuf) {
        let binary = dir.join("headlamp-server");
        std::fs::write(&binary, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        (binary, dir.join("kubeconfig.yaml"))
    }

    fn config_toml(binary: &Path, kubeconfig: &Path, clusters: &[&str]) -> String {
        let mut toml = String::from("[[kubernetes.clusterLocatorMethods]]\ntype = \"config\"\n");
        for name in clusters {
            toml.push_str(&format!(
                "\n[[kubernetes.clusterLocatorMethods.clusters]]\nname = \"{0}\"\nurl = \"https://{0}:6443\"\nauthProvider = \"anonymous\"\n",
                name
            ));
        }
        toml.push_str(&format!(
            "\n[headlamp_server]\nbinary_path = \"{}\"\nkubeconfig_path = \"{}\"\n\n[watch]\ninterval_secs = 1\n",
            binary.display(),
            kubeconfig.display()
        ));
        toml
    }

    fn written_clusters(kubeconfig: &Path) -> usize {
        let written = std::fs::read_to_string(kubeconfig).unwrap();
        kube::config::Kubeconfig::from_yaml(&written).unwrap().clusters.len()
    }

    #[tokio::test]
    async fn test_refresh_writes_kubeconfig_and_starts_dashboard() {
        let dir = tempfile::tempdir().unwrap();
        let (binary, kubeconfig) = fake_dashboard(dir.path());

        let config = Config::from_toml(&format!(
            r#"
[[kubernetes.clusterLocatorMethods]]
type = "config"

[[kubernetes.clusterLocatorMethods.clusters]]
name = "a"
url = "https://a:6443"
serviceAccountToken = "tok"

[[kubernetes.clusterLocatorMethods.clusters]]
name = "b"
url = "https://b:6443"
authProvider = "anonymous"

[headlamp_server]
binary_path = "{}"
kubeconfig_path = "{}"
"#,
            binary.display(),
            kubeconfig.display()
        ))
        .unwrap();

        let supervisor = ProcessSupervisor::new(config.supervisor_config());
        assert_eq!(
            supervisor.config(),
            &SupervisorConfig {
                binary_path: binary.clone(),
                kubeconfig_path: kubeconfig.clone(),
            }
        );

        refresh_dashboard(&config, &supervisor).await.unwrap();

        let written = std::fs::read_to_string(&kubeconfig).unwrap();
        let parsed = kube::config::Kubeconfig::from_yaml(&written).unwrap();
        assert_eq!(parsed.clusters.len(), 2);
        assert_eq!(parsed.current_context.as_deref(), Some("a"));
        assert!(supervisor.status().running);

        refresh_dashboard(&config, &supervisor).await.unwrap();
        assert_eq!(supervisor.status().restarts, 1);

        supervisor.stop().await;
    }

    #[tokio::test]
    async fn test_watcher_ignores_deleted_config_and_reloads_when_it_returns() {
        let dir = tempfile::tempdir().unwrap();
        let (binary, kubeconfig) = fake_dashboard(dir.path());
        let config_path = dir.path().join("headlamp-host.toml");
        std::fs::write(&config_path, config_toml(&binary, &kubeconfig, &["a"])).unwrap();

        let config = Config::load(&config_path).await.unwrap();
        let supervisor = Arc::new(ProcessSupervisor::new(config.supervisor_config()));
        refresh_dashboard(&config, &supervisor).await.unwrap();
        assert_eq!(written_clusters(&kubeconfig), 1);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let watcher = tokio::spawn(watch_config(
            config_path.clone(),
            config,
            Arc::clone(&supervisor),
            shutdown_rx,
        ));

        std::fs::remove_file(&config_path).unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(supervisor.status().restarts, 0);
        assert_eq!(written_clusters(&kubeconfig), 1);

        std::fs::write(&config_path, config_toml(&binary, &kubeconfig, &["a", "b"])).unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(supervisor.status().restarts, 1);
        assert_eq!(written_clusters(&kubeconfig), 2);

        shutdown_tx.send(true).unwrap();
        watcher.await.unwrap();
        supervisor.stop().await;
    }
}
