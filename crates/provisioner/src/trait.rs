//! Provisioner capability contract
//!
//! The controller's state machine depends only on this trait, never on a
//! concrete backend. Backends are selected once at host-binding time by
//! the [`crate::ProvisionerFactory`].

use crate::models::{ImageRef, Outcome};

/// Out-of-band operations a hardware-provisioning backend must support
///
/// Every operation must be safe to call repeatedly with identical
/// arguments while in progress. The controller may re-invoke an operation
/// after a crash/restart with no memory of having started it, so a backend
/// must either resume/poll an existing job or safely restart it.
#[async_trait::async_trait]
pub trait Provisioner: Send + Sync {
    /// Confirm the management controller is reachable and the credentials
    /// work; may additionally report freshly discovered identity facts
    async fn validate_management_access(&self) -> Outcome;

    /// Gather hardware inventory; long-running, must be polled
    async fn inspect_hardware(&self) -> Outcome;

    /// Deploy the given image; long-running, must be polled. Reports
    /// [`crate::ProvisionerError::InvalidImage`] when the descriptor is
    /// malformed, independent of hardware state.
    async fn provision(&self, image: &ImageRef) -> Outcome;

    /// Return the host to a clean, unprovisioned state
    async fn deprovision(&self) -> Outcome;

    /// Power the host on; idempotent
    async fn power_on(&self) -> Outcome;

    /// Power the host off; idempotent
    async fn power_off(&self) -> Outcome;

    /// Release any backend-side registration so the host can be forgotten
    async fn delete(&self) -> Outcome;
}
