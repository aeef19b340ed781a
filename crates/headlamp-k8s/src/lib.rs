//! Kubernetes cluster aggregation for headlamp-host
//!
//! This crate discovers clusters from the configured locator methods, resolves a
//! credential for each one through pluggable auth strategies, and merges the
//! result into a single kubeconfig document for the dashboard.

mod aggregator;
mod auth;
mod error;
mod kubeconfig;
mod locator;

pub use aggregator::ClusterAggregator;
pub use auth::{
    providers, AnonymousStrategy, AuthStrategy, AuthStrategyMap, ClientCertificateStrategy,
    ServiceAccountStrategy,
};
pub use error::AggregatorError;
pub use kubeconfig::{cluster_to_kubeconfig, combine_kubeconfigs, to_yaml, write_kubeconfig};
pub use locator::{
    metadata, ClusterConfig, ClusterLocatorMethod, ClusterSupplier, CombinedClusterSupplier,
    ConfigClusterSupplier, KubeconfigClusterSupplier,
};

// Re-export types that are used in our public API
pub use headlamp_types::{ClusterDetail, ClusterRecord, Credential, KubeconfigDocument};
