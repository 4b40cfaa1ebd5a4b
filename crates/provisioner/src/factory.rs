//! Provisioner backend selection
//!
//! Backends form a closed set; the kind is chosen once from configuration
//! at startup and the factory binds a provisioner instance to one host per
//! reconciliation step. The controller only ever sees the
//! [`Provisioner`] trait.

use crate::demo::DemoProvisioner;
use crate::models::{BmcCredentials, HostHandle};
use crate::provisioner_trait::Provisioner;
use std::str::FromStr;

/// Available provisioner backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvisionerKind {
    /// Scripted backend for demos and tests; no real hardware involved
    #[default]
    Demo,
}

impl FromStr for ProvisionerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "demo" => Ok(Self::Demo),
            other => Err(format!("unknown provisioner kind: {other}")),
        }
    }
}

/// Builds provisioner instances bound to (host, credentials)
#[derive(Debug, Clone, Default)]
pub struct ProvisionerFactory {
    kind: ProvisionerKind,
}

impl ProvisionerFactory {
    /// Create a factory for the configured backend kind
    #[must_use]
    pub fn new(kind: ProvisionerKind) -> Self {
        Self { kind }
    }

    /// The backend kind this factory produces
    #[must_use]
    pub fn kind(&self) -> ProvisionerKind {
        self.kind
    }

    /// Bind a provisioner instance to a host for one reconciliation step
    ///
    /// Credentials are moved in and dropped with the instance; they are
    /// never retained across steps.
    #[must_use]
    pub fn provisioner_for(
        &self,
        host: HostHandle,
        credentials: BmcCredentials,
    ) -> Box<dyn Provisioner> {
        match self.kind {
            ProvisionerKind::Demo => {
                // The demo backend has no controller to authenticate to.
                let _ = credentials;
                Box::new(DemoProvisioner::new(host))
            }
        }
    }
}
