//! Controller-specific error types.
//!
//! Only infrastructure failures surface here: resource store trouble,
//! credential store trouble, exhausted status-update retries. Backend and
//! provisioning failures are recorded in host status instead, because they
//! are expected, operator-recoverable conditions rather than engine bugs.

use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the baremetal controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Serialization error while building an API payload
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Status update lost the compare-and-set race too many times
    #[error("status update conflict for {0}: retries exhausted")]
    StatusConflict(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}
