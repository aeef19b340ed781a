use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReadinessError {
    #[error("failed to build HTTP client")]
    Client(#[from] reqwest::Error),
    #[error("invalid dashboard url")]
    InvalidUrl(#[from] url::ParseError),
    #[error("dashboard not ready after {attempts} attempts")]
    Timeout { attempts: u32 },
}

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("invalid dashboard url")]
    InvalidUrl(#[from] url::ParseError),
    #[error("dashboard url '{0}' has no origin")]
    OpaqueOrigin(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LinkError {
    #[error("Dashboard URL is required or dashboardInternal must be true")]
    MissingDashboardUrl,
    #[error("Could not find path for kind: {0}")]
    UnsupportedKind(String),
    #[error("{kind} '{name}' needs a namespace")]
    MissingNamespace { kind: String, name: String },
    #[error("invalid dashboard url")]
    InvalidUrl(#[from] url::ParseError),
}
