//! Cluster locator methods and the suppliers that turn them into cluster records

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use kube::config::{AuthInfo, Kubeconfig};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::providers;
use crate::error::AggregatorError;
use headlamp_types::ClusterRecord;

/// Auth metadata keys understood by the built-in strategies
pub mod metadata {
    pub const SERVICE_ACCOUNT_TOKEN: &str = "serviceAccountToken";
    pub const CLIENT_CERTIFICATE_DATA: &str = "clientCertificateData";
    pub const CLIENT_KEY_DATA: &str = "clientKeyData";
}

/// One entry of `kubernetes.clusterLocatorMethods`
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClusterLocatorMethod {
    /// Clusters listed inline in the configuration
    Config {
        #[serde(default)]
        clusters: Vec<ClusterConfig>,
    },
    /// Clusters taken from an existing kubeconfig file
    LocalKubeconfig {
        /// Kubeconfig path; the standard `KUBECONFIG`/`~/.kube/config` lookup when absent
        #[serde(default)]
        path: Option<PathBuf>,
        /// Only these contexts (all contexts when empty)
        #[serde(default)]
        contexts: Vec<String>,
    },
    /// Locator types handled elsewhere (catalog, gke, ...); ignored here
    #[serde(other)]
    Unsupported,
}

/// A cluster declared in the configuration file
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_auth_provider")]
    pub auth_provider: String,
    #[serde(default, alias = "skipTLSVerify")]
    pub skip_tls_verify: bool,
    #[serde(default)]
    pub ca_data: Option<String>,
    #[serde(default)]
    pub ca_file: Option<String>,
    #[serde(default)]
    pub service_account_token: Option<String>,
    #[serde(default)]
    pub client_certificate_data: Option<String>,
    #[serde(default)]
    pub client_key_data: Option<String>,
}

fn default_auth_provider() -> String {
    providers::SERVICE_ACCOUNT.to_string()
}

impl From<&ClusterConfig> for ClusterRecord {
    fn from(cluster: &ClusterConfig) -> Self {
        let mut record = ClusterRecord::new(&cluster.name, &cluster.url, &cluster.auth_provider);
        record.skip_tls_verify = cluster.skip_tls_verify;
        record.ca_data = cluster.ca_data.clone();
        record.ca_file = cluster.ca_file.clone();

        let fields = [
            (metadata::SERVICE_ACCOUNT_TOKEN, &cluster.service_account_token),
            (metadata::CLIENT_CERTIFICATE_DATA, &cluster.client_certificate_data),
            (metadata::CLIENT_KEY_DATA, &cluster.client_key_data),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                record.auth_metadata.insert(key.to_string(), value.clone());
            }
        }

        record
    }
}

/// Source of cluster records
#[async_trait]
pub trait ClusterSupplier: Send + Sync {
    async fn clusters(&self) -> Result<Vec<ClusterRecord>, AggregatorError>;
}

/// Supplies the clusters listed inline in the configuration
pub struct ConfigClusterSupplier {
    clusters: Vec<ClusterConfig>,
}

impl ConfigClusterSupplier {
    pub fn new(clusters: Vec<ClusterConfig>) -> Self {
        Self { clusters }
    }
}

#[async_trait]
impl ClusterSupplier for ConfigClusterSupplier {
    async fn clusters(&self) -> Result<Vec<ClusterRecord>, AggregatorError> {
        Ok(self.clusters.iter().map(ClusterRecord::from).collect())
    }
}

/// Supplies one cluster per context of an existing kubeconfig
pub struct KubeconfigClusterSupplier {
    path: Option<PathBuf>,
    contexts: Vec<String>,
}

impl KubeconfigClusterSupplier {
    pub fn new(path: Option<PathBuf>, contexts: Vec<String>) -> Self {
        Self { path, contexts }
    }

    /// kube reads the file synchronously, so keep it off the async workers
    async fn read(&self) -> Result<Kubeconfig, AggregatorError> {
        let path = self.path.clone();
        let kubeconfig = tokio::task::spawn_blocking(move || match path {
            Some(path) => Kubeconfig::read_from(path),
            None => Kubeconfig::read(),
        })
        .await??;
        Ok(kubeconfig)
    }
}

#[async_trait]
impl ClusterSupplier for KubeconfigClusterSupplier {
    async fn clusters(&self) -> Result<Vec<ClusterRecord>, AggregatorError> {
        let kubeconfig = self.read().await?;
        Ok(records_from_kubeconfig(&kubeconfig, &self.contexts))
    }
}

/// Convert kubeconfig contexts into cluster records, named after the context
pub(crate) fn records_from_kubeconfig(kubeconfig: &Kubeconfig, only: &[String]) -> Vec<ClusterRecord> {
    kubeconfig
        .contexts
        .iter()
        .filter(|ctx| only.is_empty() || only.contains(&ctx.name))
        .filter_map(|ctx| {
            let context = ctx.context.as_ref()?;

            let cluster = kubeconfig
                .clusters
                .iter()
                .find(|c| c.name == context.cluster)
                .and_then(|c| c.cluster.as_ref());
            let Some(cluster) = cluster else {
                warn!(context = %ctx.name, cluster = %context.cluster, "Context references unknown cluster, skipping");
                return None;
            };
            let Some(server) = cluster.server.clone() else {
                warn!(context = %ctx.name, "Cluster has no server URL, skipping");
                return None;
            };

            let auth_info = context.user.as_ref().and_then(|user| {
                kubeconfig
                    .auth_infos
                    .iter()
                    .find(|a| &a.name == user)
                    .and_then(|a| a.auth_info.as_ref())
            });

            let mut record = record_for_user(&ctx.name, server, auth_info);
            record.skip_tls_verify = cluster.insecure_skip_tls_verify.unwrap_or(false);
            record.ca_data = cluster.certificate_authority_data.clone();
            record.ca_file = cluster.certificate_authority.clone();
            Some(record)
        })
        .collect()
}

fn record_for_user(name: &str, server: String, auth_info: Option<&AuthInfo>) -> ClusterRecord {
    let Some(auth) = auth_info else {
        return ClusterRecord::new(name, server, providers::ANONYMOUS);
    };

    if let Some(token) = &auth.token {
        return ClusterRecord::new(name, server, providers::SERVICE_ACCOUNT)
            .with_metadata(metadata::SERVICE_ACCOUNT_TOKEN, token.expose_secret());
    }

    if let (Some(cert), Some(key)) = (&auth.client_certificate_data, &auth.client_key_data) {
        return ClusterRecord::new(name, server, providers::X509_CLIENT_CERTIFICATE)
            .with_metadata(metadata::CLIENT_CERTIFICATE_DATA, cert.as_str())
            .with_metadata(metadata::CLIENT_KEY_DATA, key.expose_secret());
    }

    if auth.exec.is_some() || auth.auth_provider.is_some() {
        debug!(context = %name, "Exec and auth-provider users are not forwarded, using anonymous");
    }
    ClusterRecord::new(name, server, providers::ANONYMOUS)
}

/// Concatenates the records of several suppliers in order
#[derive(Default)]
pub struct CombinedClusterSupplier {
    suppliers: Vec<Arc<dyn ClusterSupplier>>,
}

impl CombinedClusterSupplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, supplier: Arc<dyn ClusterSupplier>) {
        self.suppliers.push(supplier);
    }

    /// Build suppliers for every configured locator method
    pub fn from_methods(methods: &[ClusterLocatorMethod]) -> Self {
        let mut combined = Self::new();
        for method in methods {
            match method {
                ClusterLocatorMethod::Config { clusters } => {
                    combined.push(Arc::new(ConfigClusterSupplier::new(clusters.clone())));
                }
                ClusterLocatorMethod::LocalKubeconfig { path, contexts } => {
                    combined.push(Arc::new(KubeconfigClusterSupplier::new(
                        path.clone(),
                        contexts.clone(),
                    )));
                }
                ClusterLocatorMethod::Unsupported => {
                    warn!("Ignoring unsupported cluster locator method");
                }
            }
        }
        combined
    }
}

#[async_trait]
impl ClusterSupplier for CombinedClusterSupplier {
    async fn clusters(&self) -> Result<Vec<ClusterRecord>, AggregatorError> {
        let mut all = Vec::new();
        for supplier in &self.suppliers {
            all.extend(supplier.clusters().await?);
        }
        Ok(all)
    }
}
