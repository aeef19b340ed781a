use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("invalid proxy target '{0}'")]
    InvalidTarget(String),
    #[error("invalid path rewrite pattern")]
    InvalidRewrite(#[from] regex::Error),
    #[error("invalid upstream uri")]
    InvalidUri(#[from] axum::http::uri::InvalidUri),
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
    #[error("proxy server error")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::InvalidUri(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(status = %status, error = %self, "Proxy request failed");
        (status, self.to_string()).into_response()
    }
}
