//! Shared types for headlamp-host
//!
//! This crate contains data structures used across multiple headlamp-host crates:
//! cluster records coming out of cluster suppliers, resolved cluster details,
//! the kubeconfig document model and the dashboard process status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Cluster Types
// ============================================================================

/// A cluster as reported by a cluster supplier, before its credential is resolved
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterRecord {
    pub name: String,
    pub url: String,
    pub skip_tls_verify: bool,
    pub ca_data: Option<String>,
    pub ca_file: Option<String>,
    /// Identifier of the auth strategy that resolves this cluster's credential
    pub auth_provider: String,
    /// Provider-specific inputs for the auth strategy (tokens, cert data, ...)
    pub auth_metadata: BTreeMap<String, String>,
}

impl ClusterRecord {
    pub fn new(name: impl Into<String>, url: impl Into<String>, auth_provider: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            skip_tls_verify: false,
            ca_data: None,
            ca_file: None,
            auth_provider: auth_provider.into(),
            auth_metadata: BTreeMap::new(),
        }
    }

    /// Attach one auth metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_metadata.insert(key.into(), value.into());
        self
    }

    /// Look up an auth metadata value, treating empty strings as absent
    pub fn auth_value(&self, key: &str) -> Option<&str> {
        self.auth_metadata
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Credential used to reach a cluster
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    BearerToken { token: String },
    ClientCertificate { cert: String, key: String },
    Anonymous,
}

impl Credential {
    /// Human-readable credential kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BearerToken { .. } => "bearer token",
            Self::ClientCertificate { .. } => "x509 client certificate",
            Self::Anonymous => "anonymous",
        }
    }
}

// Secrets never end up in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.kind()).finish()
    }
}

/// A cluster with its resolved credential
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterDetail {
    pub name: String,
    pub url: String,
    pub skip_tls_verify: bool,
    pub credential: Credential,
    pub ca_data: Option<String>,
    pub ca_file: Option<String>,
}

impl ClusterDetail {
    /// Combine a supplier record with its resolved credential
    pub fn from_record(record: ClusterRecord, credential: Credential) -> Self {
        Self {
            name: record.name,
            url: record.url,
            skip_tls_verify: record.skip_tls_verify,
            credential,
            ca_data: record.ca_data.filter(|d| !d.is_empty()),
            ca_file: record.ca_file.filter(|f| !f.is_empty()),
        }
    }
}

// ============================================================================
// Kubeconfig Types
// ============================================================================

pub const KUBECONFIG_API_VERSION: &str = "v1";
pub const KUBECONFIG_KIND: &str = "Config";

/// A kubeconfig document in the standard `kubectl` layout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeconfigDocument {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub users: Vec<NamedUser>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(
        rename = "current-context",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub current_context: Option<String>,
}

impl KubeconfigDocument {
    /// An empty document with no clusters and no current context
    pub fn new() -> Self {
        Self {
            api_version: KUBECONFIG_API_VERSION.to_string(),
            kind: KUBECONFIG_KIND.to_string(),
            clusters: Vec::new(),
            users: Vec::new(),
            contexts: Vec::new(),
            current_context: None,
        }
    }

    /// Find the user entry with the given name
    pub fn user(&self, name: &str) -> Option<&UserEntry> {
        self.users.iter().find(|u| u.name == name).map(|u| &u.user)
    }

    /// Find the cluster entry with the given name
    pub fn cluster(&self, name: &str) -> Option<&ClusterEntry> {
        self.clusters
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.cluster)
    }

    /// Check that every cluster has exactly one user and one context sharing its
    /// name, and that the current context (if any) exists
    pub fn is_consistent(&self) -> bool {
        let per_cluster = self.clusters.iter().all(|c| {
            self.users.iter().filter(|u| u.name == c.name).count() == 1
                && self
                    .contexts
                    .iter()
                    .filter(|ctx| {
                        ctx.name == c.name
                            && ctx.context.cluster == c.name
                            && ctx.context.user == c.name
                    })
                    .count()
                    == 1
        });

        let current_ok = match &self.current_context {
            Some(current) => self.contexts.iter().any(|c| &c.name == current),
            None => true,
        };

        per_cluster
            && current_ok
            && self.users.len() == self.clusters.len()
            && self.contexts.len() == self.clusters.len()
    }
}

impl Default for KubeconfigDocument {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterEntry,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEntry {
    pub server: String,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    pub user: UserEntry,
}

/// User credentials; only the fields of one credential kind are ever set
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key_data: Option<String>,
}

impl UserEntry {
    /// Number of credential fields present
    pub fn field_count(&self) -> usize {
        [
            self.token.is_some(),
            self.client_certificate_data.is_some(),
            self.client_key_data.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextEntry,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub cluster: String,
    pub user: String,
}

// ============================================================================
// Dashboard Process Types
// ============================================================================

/// Snapshot of the supervised dashboard process
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    /// Exit code of the last child that terminated (None if killed by signal)
    pub last_exit_code: Option<i32>,
    /// Number of times the dashboard was replaced after the first start
    pub restarts: u32,
}
