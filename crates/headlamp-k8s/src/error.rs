use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("unable to read kubeconfig - please verify the configured path")]
    Kubeconfig(#[from] kube::config::KubeconfigError),
    #[error("kubeconfig reader task failed")]
    ReadTask(#[from] tokio::task::JoinError),
    #[error("cluster '{cluster}' is missing auth metadata '{key}'")]
    MissingAuthMetadata { cluster: String, key: String },
    #[error("failed to serialize kubeconfig")]
    Serialize(#[from] serde_yaml::Error),
    #[error("failed to write kubeconfig to {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
