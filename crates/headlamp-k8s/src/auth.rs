//! Auth strategies: resolve a cluster record into a concrete credential

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AggregatorError;
use crate::locator::metadata;
use headlamp_types::{ClusterRecord, Credential};

/// Auth provider identifiers of the built-in strategies
pub mod providers {
    pub const SERVICE_ACCOUNT: &str = "serviceAccount";
    pub const X509_CLIENT_CERTIFICATE: &str = "x509ClientCertificate";
    pub const ANONYMOUS: &str = "anonymous";
    pub const LOCAL_KUBECTL_PROXY: &str = "localKubectlProxy";
}

#[async_trait]
pub trait AuthStrategy: Send + Sync {
    async fn credential(&self, cluster: &ClusterRecord) -> Result<Credential, AggregatorError>;
    fn name(&self) -> &str;
}

fn required<'a>(cluster: &'a ClusterRecord, key: &str) -> Result<&'a str, AggregatorError> {
    cluster
        .auth_value(key)
        .ok_or_else(|| AggregatorError::MissingAuthMetadata {
            cluster: cluster.name.clone(),
            key: key.to_string(),
        })
}

/// Bearer token taken from the cluster's service account token
pub struct ServiceAccountStrategy;

#[async_trait]
impl AuthStrategy for ServiceAccountStrategy {
    async fn credential(&self, cluster: &ClusterRecord) -> Result<Credential, AggregatorError> {
        let token = required(cluster, metadata::SERVICE_ACCOUNT_TOKEN)?;
        Ok(Credential::BearerToken {
            token: token.to_string(),
        })
    }

    fn name(&self) -> &str {
        providers::SERVICE_ACCOUNT
    }
}

/// Client certificate and key taken from the cluster's auth metadata
pub struct ClientCertificateStrategy;

#[async_trait]
impl AuthStrategy for ClientCertificateStrategy {
    async fn credential(&self, cluster: &ClusterRecord) -> Result<Credential, AggregatorError> {
        let cert = required(cluster, metadata::CLIENT_CERTIFICATE_DATA)?;
        let key = required(cluster, metadata::CLIENT_KEY_DATA)?;
        Ok(Credential::ClientCertificate {
            cert: cert.to_string(),
            key: key.to_string(),
        })
    }

    fn name(&self) -> &str {
        providers::X509_CLIENT_CERTIFICATE
    }
}

/// No credential at all
pub struct AnonymousStrategy;

#[async_trait]
impl AuthStrategy for AnonymousStrategy {
    async fn credential(&self, _cluster: &ClusterRecord) -> Result<Credential, AggregatorError> {
        Ok(Credential::Anonymous)
    }

    fn name(&self) -> &str {
        providers::ANONYMOUS
    }
}

/// Registry of auth strategies keyed by auth provider identifier
#[derive(Clone, Default)]
pub struct AuthStrategyMap {
    strategies: HashMap<String, Arc<dyn AuthStrategy>>,
}

impl AuthStrategyMap {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in strategies
    pub fn with_defaults() -> Self {
        let mut map = Self::new();
        map.insert(providers::SERVICE_ACCOUNT, Arc::new(ServiceAccountStrategy));
        map.insert(
            providers::X509_CLIENT_CERTIFICATE,
            Arc::new(ClientCertificateStrategy),
        );
        map.insert(providers::ANONYMOUS, Arc::new(AnonymousStrategy));
        // kubectl proxy handles auth itself
        map.insert(providers::LOCAL_KUBECTL_PROXY, Arc::new(AnonymousStrategy));
        map
    }

    pub fn insert(&mut self, provider: impl Into<String>, strategy: Arc<dyn AuthStrategy>) {
        self.strategies.insert(provider.into(), strategy);
    }

    pub fn get(&self, provider: &str) -> Option<&Arc<dyn AuthStrategy>> {
        self.strategies.get(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_service_account_strategy() {
        let record = ClusterRecord::new("a", "https://a", providers::SERVICE_ACCOUNT)
            .with_metadata(metadata::SERVICE_ACCOUNT_TOKEN, "tok");
        let cred = ServiceAccountStrategy.credential(&record).await.unwrap();
        assert_eq!(
            cred,
            Credential::BearerToken {
                token: "tok".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_service_account_strategy_missing_token() {
        let record = ClusterRecord::new("a", "https://a", providers::SERVICE_ACCOUNT);
        let err = ServiceAccountStrategy.credential(&record).await.unwrap_err();
        assert!(matches!(
            err,
            AggregatorError::MissingAuthMetadata { ref key, .. } if key == metadata::SERVICE_ACCOUNT_TOKEN
        ));
    }

    #[tokio::test]
    async fn test_client_certificate_strategy_requires_both_parts() {
        let record = ClusterRecord::new("a", "https://a", providers::X509_CLIENT_CERTIFICATE)
            .with_metadata(metadata::CLIENT_CERTIFICATE_DATA, "cert");
        assert!(ClientCertificateStrategy.credential(&record).await.is_err());

        let record = record.with_metadata(metadata::CLIENT_KEY_DATA, "key");
        let cred = ClientCertificateStrategy.credential(&record).await.unwrap();
        assert_eq!(cred.kind(), "x509 client certificate");
    }

    #[test]
    fn test_default_registry() {
        let map = AuthStrategyMap::with_defaults();
        assert!(map.get(providers::SERVICE_ACCOUNT).is_some());
        assert!(map.get(providers::LOCAL_KUBECTL_PROXY).is_some());
        assert!(map.get("google").is_none());
        assert_eq!(
            map.get(providers::ANONYMOUS).map(|s| s.name().to_string()),
            Some(providers::ANONYMOUS.to_string())
        );
    }
}
