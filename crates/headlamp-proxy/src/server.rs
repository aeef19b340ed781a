use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderValue, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use parking_lot::RwLock;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::ProxyError;
use crate::rewrite::{rewrite_path, PathRewrite};
use headlamp_types::DashboardStatus;

/// Where the Headlamp server listens
pub const DEFAULT_TARGET: &str = "http://localhost:4466";
/// Portal path the proxy is mounted under
pub const DEFAULT_MOUNT_PATH: &str = "/api/headlamp";

#[derive(Clone, Debug)]
pub struct ProxyConfig {
    pub target: String,
    pub mount_path: String,
    /// Rewrite rules; empty means "strip the mount path"
    pub rewrites: Vec<PathRewrite>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            mount_path: DEFAULT_MOUNT_PATH.to_string(),
            rewrites: Vec::new(),
        }
    }
}

/// Shared state of the proxy handlers
#[derive(Clone)]
pub struct ProxyState {
    client: Client<HttpConnector, Body>,
    /// `scheme://authority` of the upstream
    origin: String,
    authority: HeaderValue,
    /// Upstream base path without trailing slash (usually empty)
    base_path: String,
    mount_path: String,
    rewrites: Arc<Vec<PathRewrite>>,
    dashboard: Option<Arc<RwLock<DashboardStatus>>>,
}

impl ProxyState {
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let target: Uri = config
            .target
            .parse()
            .map_err(|_| ProxyError::InvalidTarget(config.target.clone()))?;

        let (Some(scheme), Some(authority)) = (target.scheme_str(), target.authority()) else {
            return Err(ProxyError::InvalidTarget(config.target));
        };
        if scheme != "http" {
            // Only plain HTTP to the local server is supported
            return Err(ProxyError::InvalidTarget(config.target));
        }

        let authority_header = HeaderValue::from_str(authority.as_str())
            .map_err(|_| ProxyError::InvalidTarget(config.target.clone()))?;

        let mount_path = config.mount_path.trim_end_matches('/').to_string();
        let rewrites = if config.rewrites.is_empty() {
            vec![PathRewrite::strip_prefix(&mount_path)?]
        } else {
            config.rewrites
        };

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(Self {
            client,
            origin: format!("{}://{}", scheme, authority),
            authority: authority_header,
            base_path: target.path().trim_end_matches('/').to_string(),
            mount_path,
            rewrites: Arc::new(rewrites),
            dashboard: None,
        })
    }

    /// Report this dashboard status from the health endpoint
    pub fn with_dashboard_status(mut self, status: Arc<RwLock<DashboardStatus>>) -> Self {
        self.dashboard = Some(status);
        self
    }

    /// Build the upstream URI for an incoming one
    fn upstream_uri(&self, uri: &Uri) -> Result<Uri, ProxyError> {
        let path = rewrite_path(&self.rewrites, uri.path());
        let query = uri.query().map(|q| format!("?{}", q)).unwrap_or_default();
        Ok(format!("{}{}{}{}", self.origin, self.base_path, path, query).parse()?)
    }
}

/// Build the host router: the health endpoint plus a catch-all proxy
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route(&format!("{}/health", state.mount_path), get(health))
        .fallback(proxy)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<ProxyState>) -> impl IntoResponse {
    let dashboard = state.dashboard.as_ref().map(|s| s.read().clone());
    Json(json!({
        "status": "ok",
        "dashboard": dashboard,
    }))
}

async fn proxy(State(state): State<ProxyState>, mut req: Request) -> Result<Response, ProxyError> {
    let upstream = state.upstream_uri(req.uri())?;
    debug!(method = %req.method(), from = %req.uri(), to = %upstream, "Proxying request");

    *req.uri_mut() = upstream;
    req.headers_mut()
        .insert(header::HOST, state.authority.clone());

    let response = state.client.request(req).await?;
    Ok(response.into_response())
}

/// Serve the router until `shutdown` flips
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<(), ProxyError> {
    info!(addr = ?listener.local_addr().ok(), "Proxy listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
            info!("Proxy shutting down");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    /// Upstream that echoes the request URI and Host header
    async fn spawn_echo_upstream() -> String {
        let app = Router::new().fallback(|uri: Uri, headers: HeaderMap| async move {
            let host = headers
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
                .unwrap_or("")
                .to_string();
            format!("{} host={}", uri, host)
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn proxy_router(target: String) -> Router {
        let state = ProxyState::new(ProxyConfig {
            target,
            ..Default::default()
        })
        .unwrap();
        router(state)
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get_request(uri: &str) -> Request {
        axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_forwards_with_prefix_stripped() {
        let target = spawn_echo_upstream().await;
        let authority = target.trim_start_matches("http://").to_string();
        let app = proxy_router(target);

        let response = app
            .oneshot(get_request("/api/headlamp/config?cluster=a"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_string(response).await,
            format!("/config?cluster=a host={}", authority)
        );
    }

    #[tokio::test]
    async fn test_forwards_root_and_unprefixed_paths() {
        let target = spawn_echo_upstream().await;
        let app = proxy_router(target);

        let response = app.clone().oneshot(get_request("/api/headlamp")).await.unwrap();
        assert!(body_string(response).await.starts_with("/ host="));

        let response = app.oneshot(get_request("/static/main.js")).await.unwrap();
        assert!(body_string(response).await.starts_with("/static/main.js "));
    }

    #[tokio::test]
    async fn test_health_is_served_locally() {
        // Nothing listens upstream; health must not be proxied
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let status = Arc::new(RwLock::new(DashboardStatus {
            running: true,
            pid: Some(42),
            ..Default::default()
        }));
        let state = ProxyState::new(ProxyConfig {
            target: format!("http://{}", addr),
            ..Default::default()
        })
        .unwrap()
        .with_dashboard_status(status);

        let response = router(state)
            .oneshot(get_request("/api/headlamp/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["dashboard"]["pid"], 42);
        assert_eq!(body["dashboard"]["running"], true);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let app = proxy_router(format!("http://{}", addr));
        let response = app.oneshot(get_request("/api/headlamp/config")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_rejects_invalid_targets() {
        for target in ["localhost:4466", "https://localhost:4466", "not a uri"] {
            let result = ProxyState::new(ProxyConfig {
                target: target.to_string(),
                ..Default::default()
            });
            assert!(result.is_err(), "target {} should be rejected", target);
        }
    }

    #[test]
    fn test_upstream_uri_keeps_base_path() {
        let state = ProxyState::new(ProxyConfig {
            target: "http://localhost:4466/headlamp/".to_string(),
            ..Default::default()
        })
        .unwrap();

        let uri: Uri = "/api/headlamp/config?x=1".parse().unwrap();
        assert_eq!(
            state.upstream_uri(&uri).unwrap().to_string(),
            "http://localhost:4466/headlamp/config?x=1"
        );
    }
}
