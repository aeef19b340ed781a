use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;
use url::Url;

use headlamp_embed::{DEFAULT_HEADLAMP_ROUTE, DEFAULT_HEALTH_PATH};
use headlamp_k8s::{AuthStrategyMap, ClusterAggregator, ClusterLocatorMethod, CombinedClusterSupplier};
use headlamp_proxy::{DEFAULT_MOUNT_PATH, PathRewrite, ProxyConfig};
use headlamp_supervisor::SupervisorConfig;

// ============================================
// Environment variable names for CLI flags
// ============================================
pub mod env {
    pub const CONFIG: &str = "HEADLAMP_HOST_CONFIG";
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
}

pub const DEFAULT_CONFIG_PATH: &str = "headlamp-host.toml";
const KUBECONFIG_FILE_NAME: &str = "temp_kubeconfig.yaml";

/// Contents of `headlamp-host.toml`
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub kubernetes: KubernetesConfig,
    pub headlamp_server: HeadlampServerConfig,
    pub proxy: ProxySection,
    pub frontend: FrontendConfig,
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct KubernetesConfig {
    pub cluster_locator_methods: Vec<ClusterLocatorMethod>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeadlampServerConfig {
    pub binary_path: PathBuf,
    pub port: u16,
    /// Where the merged kubeconfig is written; `<tmpdir>/temp_kubeconfig.yaml` when unset
    pub kubeconfig_path: Option<PathBuf>,
}

impl Default for HeadlampServerConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("headlamp-server"),
            port: 4466,
            kubeconfig_path: None,
        }
    }
}

impl HeadlampServerConfig {
    pub fn kubeconfig_path(&self) -> PathBuf {
        self.kubeconfig_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(KUBECONFIG_FILE_NAME))
    }

    pub fn local_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProxySection {
    pub listen: SocketAddr,
    /// Upstream; the local Headlamp server when unset
    pub target: Option<String>,
    pub mount_path: String,
    pub path_rewrite: Vec<RewriteRule>,
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 7007)),
            target: None,
            mount_path: DEFAULT_MOUNT_PATH.to_string(),
            path_rewrite: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RewriteRule {
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FrontendConfig {
    /// Origin the dashboard is reachable on from the browser
    pub dashboard_origin: Option<String>,
    /// Origin of the portal itself, used for internal links
    pub portal_origin: String,
    pub health_path: String,
    pub poll_interval_ms: u64,
    pub headlamp_route: String,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            dashboard_origin: None,
            portal_origin: "http://localhost:3000".to_string(),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            poll_interval_ms: 1000,
            headlamp_route: DEFAULT_HEADLAMP_ROUTE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 5,
        }
    }
}

impl Config {
    /// Load the config file. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        match Self::load_existing(path).await? {
            Some(config) => Ok(config),
            None => {
                info!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load the config file, or `None` when it does not exist
    pub async fn load_existing(path: &Path) -> Result<Option<Self>> {
        let exists = tokio::fs::try_exists(path)
            .await
            .with_context(|| format!("Failed to stat config file {}", path.display()))?;
        if !exists {
            return Ok(None);
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
            .map(Some)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            binary_path: self.headlamp_server.binary_path.clone(),
            kubeconfig_path: self.headlamp_server.kubeconfig_path(),
        }
    }

    pub fn proxy_config(&self) -> Result<ProxyConfig> {
        let rewrites = self
            .proxy
            .path_rewrite
            .iter()
            .map(|rule| {
                PathRewrite::new(&rule.pattern, rule.replacement.clone())
                    .with_context(|| format!("Invalid path rewrite pattern '{}'", rule.pattern))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ProxyConfig {
            target: self
                .proxy
                .target
                .clone()
                .unwrap_or_else(|| self.headlamp_server.local_url()),
            mount_path: self.proxy.mount_path.clone(),
            rewrites,
        })
    }

    /// Aggregator over every configured locator method with the built-in strategies
    pub fn aggregator(&self) -> ClusterAggregator {
        let supplier = CombinedClusterSupplier::from_methods(&self.kubernetes.cluster_locator_methods);
        ClusterAggregator::new(Arc::new(supplier), AuthStrategyMap::with_defaults())
    }

    pub fn dashboard_origin(&self) -> Result<Url> {
        let origin = self
            .frontend
            .dashboard_origin
            .clone()
            .unwrap_or_else(|| self.headlamp_server.local_url());
        Url::parse(&origin).with_context(|| format!("Invalid dashboard origin '{}'", origin))
    }

    pub fn portal_origin(&self) -> Result<Url> {
        Url::parse(&self.frontend.portal_origin)
            .with_context(|| format!("Invalid portal origin '{}'", self.frontend.portal_origin))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.frontend.poll_interval_ms.max(1))
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch.interval_secs.max(1))
    }
}
