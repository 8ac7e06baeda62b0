use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodePulseError {
    #[error("Kubernetes error: {0}")]
    KubernetesError(String),

    #[error("NodeCheck not found: {0}")]
    CheckNotFound(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Reconcile error: {0}")]
    ReconcileError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<kube::Error> for NodePulseError {
    fn from(e: kube::Error) -> Self {
        NodePulseError::KubernetesError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NodePulseError>;
