use serde::Deserialize;
use url::Url;

use crate::error::LinkError;

/// Portal route the dashboard page is mounted on
pub const DEFAULT_HEADLAMP_ROUTE: &str = "/headlamp";
const DEFAULT_CLUSTER_NAME: &str = "default";

/// Per-cluster dashboard settings from the portal's cluster config
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardParameters {
    /// Link to the dashboard page inside the portal instead of an external URL
    #[serde(default)]
    pub internal: bool,
    pub cluster_name: Option<String>,
    pub headlamp_route: Option<String>,
}

/// A Kubernetes object to link to
#[derive(Clone, Debug)]
pub struct LinkRequest<'a> {
    pub dashboard_url: Option<&'a Url>,
    pub parameters: &'a DashboardParameters,
    pub kind: &'a str,
    pub name: &'a str,
    pub namespace: Option<&'a str>,
}

/// Builds deep links into the dashboard for cluster objects
#[derive(Clone, Debug)]
pub struct HeadlampLinkFormatter {
    portal_origin: Url,
}

impl HeadlampLinkFormatter {
    /// `portal_origin` is only used for internal links; its path is ignored
    pub fn new(portal_origin: Url) -> Self {
        Self { portal_origin }
    }

    pub fn format_cluster_link(&self, request: &LinkRequest<'_>) -> Result<Url, LinkError> {
        let params = request.parameters;
        if request.dashboard_url.is_none() && !params.internal {
            return Err(LinkError::MissingDashboardUrl);
        }

        let cluster = params.cluster_name.as_deref().unwrap_or(DEFAULT_CLUSTER_NAME);
        let to = object_path(cluster, request.kind, request.name, request.namespace)?;

        let mut link = if params.internal {
            let mut base = Url::parse(&self.portal_origin.origin().ascii_serialization())?;
            let route = params
                .headlamp_route
                .as_deref()
                .filter(|r| !r.is_empty())
                .unwrap_or(DEFAULT_HEADLAMP_ROUTE);
            base.set_path(route);
            base
        } else {
            request
                .dashboard_url
                .cloned()
                .ok_or(LinkError::MissingDashboardUrl)?
        };

        set_query_param(&mut link, "to", &to);
        Ok(link)
    }
}

/// Dashboard route for an object, e.g. `/c/prod/pods/web/api-0`
fn object_path(
    cluster: &str,
    kind: &str,
    name: &str,
    namespace: Option<&str>,
) -> Result<String, LinkError> {
    let (section, namespaced) = match kind.to_lowercase().as_str() {
        "namespace" => ("namespaces", false),
        "node" => ("nodes", false),
        "persistentvolume" => ("storage/persistentvolumes", false),
        "persistentvolumeclaim" => ("storage/persistentvolumeclaims", true),
        "pod" => ("pods", true),
        "deployment" => ("deployments", true),
        "replicaset" => ("replicasets", true),
        "statefulset" => ("statefulsets", true),
        "daemonset" => ("daemonsets", true),
        "job" => ("jobs", true),
        "cronjob" => ("cronjobs", true),
        "service" => ("services", true),
        "ingress" => ("ingresses", true),
        "configmap" => ("configmaps", true),
        "secret" => ("secrets", true),
        "serviceaccount" => ("serviceaccounts", true),
        "role" => ("roles", true),
        "rolebinding" => ("rolebindings", true),
        "clusterrole" => ("clusterroles", false),
        "clusterrolebinding" => ("clusterrolebindings", false),
        "storageclass" => ("storage/storageclasses", false),
        "networkpolicy" => ("networkpolicies", true),
        "horizontalpodautoscaler" => ("horizontalpodautoscalers", true),
        "poddisruptionbudget" => ("poddisruptionbudgets", true),
        "customresourcedefinition" => ("customresourcedefinitions", false),
        _ => return Err(LinkError::UnsupportedKind(kind.to_string())),
    };

    if !namespaced {
        return Ok(format!("/c/{}/{}/{}", cluster, section, name));
    }

    match namespace {
        Some(ns) if !ns.is_empty() => Ok(format!("/c/{}/{}/{}/{}", cluster, section, ns, name)),
        _ => Err(LinkError::MissingNamespace {
            kind: kind.to_string(),
            name: name.to_string(),
        }),
    }
}

/// Set `key` to `value`, replacing an existing value in place
fn set_query_param(url: &mut Url, key: &str, value: &str) {
    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    let mut replaced = false;
    pairs.retain_mut(|(k, v)| {
        if k != key {
            return true;
        }
        if replaced {
            return false;
        }
        *v = value.to_string();
        replaced = true;
        true
    });
    if !replaced {
        pairs.push((key.to_string(), value.to_string()));
    }

    url.query_pairs_mut().clear().extend_pairs(pairs);
}
