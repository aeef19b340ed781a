//! Rendering cluster details into kubeconfig documents

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::AggregatorError;
use headlamp_types::{
    ClusterDetail, ClusterEntry, ContextEntry, Credential, KubeconfigDocument, NamedCluster,
    NamedContext, NamedUser, UserEntry,
};

/// Build the kubeconfig fragment for a single cluster.
///
/// The cluster, user and context all share the cluster name, and the fragment's
/// current context points at it.
pub fn cluster_to_kubeconfig(cluster: &ClusterDetail) -> KubeconfigDocument {
    let user = match &cluster.credential {
        Credential::BearerToken { token } => UserEntry {
            token: Some(token.clone()),
            ..Default::default()
        },
        Credential::ClientCertificate { cert, key } => UserEntry {
            client_certificate_data: Some(cert.clone()),
            client_key_data: Some(key.clone()),
            ..Default::default()
        },
        Credential::Anonymous => UserEntry::default(),
    };

    let mut doc = KubeconfigDocument::new();
    doc.clusters.push(NamedCluster {
        name: cluster.name.clone(),
        cluster: ClusterEntry {
            server: cluster.url.clone(),
            insecure_skip_tls_verify: cluster.skip_tls_verify,
            certificate_authority_data: cluster.ca_data.clone(),
            certificate_authority: cluster.ca_file.clone(),
        },
    });
    doc.users.push(NamedUser {
        name: cluster.name.clone(),
        user,
    });
    doc.contexts.push(NamedContext {
        name: cluster.name.clone(),
        context: ContextEntry {
            cluster: cluster.name.clone(),
            user: cluster.name.clone(),
        },
    });
    doc.current_context = Some(cluster.name.clone());
    doc
}

/// Merge fragments in order; the current context becomes the first context, if any.
///
/// Names must stay unique across the document, so a fragment reusing a name
/// already merged is dropped and the first occurrence wins.
pub fn combine_kubeconfigs<I>(fragments: I) -> KubeconfigDocument
where
    I: IntoIterator<Item = KubeconfigDocument>,
{
    let mut combined = KubeconfigDocument::new();
    let mut seen: HashSet<String> = HashSet::new();

    for fragment in fragments {
        let duplicate = fragment
            .clusters
            .iter()
            .map(|c| c.name.as_str())
            .chain(fragment.users.iter().map(|u| u.name.as_str()))
            .chain(fragment.contexts.iter().map(|c| c.name.as_str()))
            .find(|name| seen.contains(*name))
            .map(str::to_string);
        if let Some(name) = duplicate {
            warn!(cluster = %name, "Duplicate cluster name, keeping the first definition");
            continue;
        }

        for name in fragment
            .clusters
            .iter()
            .map(|c| &c.name)
            .chain(fragment.users.iter().map(|u| &u.name))
            .chain(fragment.contexts.iter().map(|c| &c.name))
        {
            seen.insert(name.clone());
        }

        combined.clusters.extend(fragment.clusters);
        combined.users.extend(fragment.users);
        combined.contexts.extend(fragment.contexts);
    }

    combined.current_context = combined.contexts.first().map(|c| c.name.clone());
    combined
}

/// Serialize a document as kubeconfig YAML
pub fn to_yaml(doc: &KubeconfigDocument) -> Result<String, AggregatorError> {
    Ok(serde_yaml::to_string(doc)?)
}

/// Write the kubeconfig to `path`, replacing any previous content atomically.
///
/// The content goes to a sibling temp file first and is then renamed over the
/// target, so readers see either the old or the new document.
pub async fn write_kubeconfig(path: &Path, contents: &str) -> Result<(), AggregatorError> {
    let write_err = |source| AggregatorError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "kubeconfig".to_string());
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

    tokio::fs::write(&tmp, contents).await.map_err(write_err)?;

    // Tokens live in this file
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(write_err)?;
    }

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_err(e));
    }

    debug!(path = %path.display(), bytes = contents.len(), "Kubeconfig written");
    Ok(())
}
