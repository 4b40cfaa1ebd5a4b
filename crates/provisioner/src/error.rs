//! Provisioner errors

use thiserror::Error;

/// Errors a provisioner operation can report inside an [`crate::Outcome`]
///
/// Backends only describe what went wrong; whether a failure is transient
/// or permanent is classified by the controller's state machine, based on
/// the state the failure occurred in.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProvisionerError {
    /// The image descriptor is malformed, independent of hardware state
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// The operation was attempted and failed
    #[error("{0}")]
    Operation(String),
}
