use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::auth::AuthStrategyMap;
use crate::error::AggregatorError;
use crate::kubeconfig::{cluster_to_kubeconfig, combine_kubeconfigs};
use crate::locator::ClusterSupplier;
use headlamp_types::{ClusterDetail, ClusterRecord, Credential, KubeconfigDocument};

/// Builds one kubeconfig covering every cluster the supplier knows about
pub struct ClusterAggregator {
    supplier: Arc<dyn ClusterSupplier>,
    strategies: AuthStrategyMap,
}

impl ClusterAggregator {
    pub fn new(supplier: Arc<dyn ClusterSupplier>, strategies: AuthStrategyMap) -> Self {
        Self {
            supplier,
            strategies,
        }
    }

    /// Fetch all clusters and resolve their credentials.
    ///
    /// Lookups run concurrently; the result keeps the supplier's order.
    pub async fn list_cluster_details(&self) -> Result<Vec<ClusterDetail>, AggregatorError> {
        let records = self.supplier.clusters().await?;
        let details = join_all(records.into_iter().map(|r| self.resolve(r))).await;
        Ok(details)
    }

    /// Resolve one cluster; a failed or missing strategy degrades to an empty credential
    async fn resolve(&self, record: ClusterRecord) -> ClusterDetail {
        let credential = match self.strategies.get(&record.auth_provider) {
            Some(strategy) => match strategy.credential(&record).await {
                Ok(credential) => {
                    debug!(cluster = %record.name, strategy = strategy.name(), "Strategy resolved credential");
                    credential
                }
                Err(e) => {
                    warn!(
                        cluster = %record.name,
                        strategy = strategy.name(),
                        error = %e,
                        "Credential resolution failed, using empty credential"
                    );
                    Credential::Anonymous
                }
            },
            None => {
                warn!(
                    cluster = %record.name,
                    auth_provider = %record.auth_provider,
                    "No auth strategy for provider, using empty credential"
                );
                Credential::Anonymous
            }
        };

        debug!(
            cluster = %record.name,
            credential = credential.kind(),
            "Resolved cluster credential"
        );
        ClusterDetail::from_record(record, credential)
    }

    /// Aggregate all clusters into one kubeconfig document
    pub async fn kubeconfig(&self) -> Result<KubeconfigDocument, AggregatorError> {
        let clusters = self.list_cluster_details().await?;
        let doc = combine_kubeconfigs(clusters.iter().map(cluster_to_kubeconfig));

        info!(
            clusters = doc.clusters.len(),
            current_context = doc.current_context.as_deref().unwrap_or("<none>"),
            "Aggregated kubeconfig"
        );
        Ok(doc)
    }
}
