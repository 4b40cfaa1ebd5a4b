//! Data types shared across provisioner backends

use crate::error::ProvisionerError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Identity a provisioner instance is bound to for the duration of one
/// reconciliation step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostHandle {
    /// Resource name of the host
    pub name: String,
    /// Resource namespace of the host
    pub namespace: String,
    /// Management controller address from the host spec
    pub bmc_address: String,
}

/// Resolved management controller credentials
///
/// Created on demand per reconciliation attempt and never persisted by the
/// controller. The `Debug` impl redacts the password so credentials can
/// never leak through logging.
#[derive(Clone, PartialEq, Eq)]
pub struct BmcCredentials {
    /// BMC login user
    pub username: String,
    /// BMC login password
    pub password: String,
}

impl fmt::Debug for BmcCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BmcCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Image descriptor handed to [`crate::Provisioner::provision`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Where the image can be downloaded from
    pub url: String,
    /// Checksum used to verify the image after download
    pub checksum: String,
}

impl ImageRef {
    /// Check the descriptor is well-formed before any backend dispatch
    ///
    /// Returns the reason the descriptor is unusable, or `None` when it is
    /// fine.
    #[must_use]
    pub fn validation_error(&self) -> Option<String> {
        if self.url.trim().is_empty() {
            return Some("image URL is empty".to_string());
        }
        if self.checksum.trim().is_empty() {
            return Some("image checksum is empty".to_string());
        }
        None
    }
}

/// Opaque hardware facts a backend reports during inspection
pub type HardwareDetails = BTreeMap<String, serde_json::Value>;

/// Result of invoking a capability operation
///
/// `complete = false` with no error means "still in progress, check again
/// after `retry_after`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Whether the operation reached a terminal result
    pub complete: bool,
    /// When the caller should poll again; `None` leaves the schedule to
    /// the caller's default backoff
    pub retry_after: Option<Duration>,
    /// Failure of this attempt, if any
    pub error: Option<ProvisionerError>,
    /// Facts discovered by this operation (registration identity facts or
    /// inspection inventory)
    pub hardware: Option<HardwareDetails>,
}

impl Outcome {
    /// The operation finished successfully
    #[must_use]
    pub fn done() -> Self {
        Self {
            complete: true,
            retry_after: None,
            error: None,
            hardware: None,
        }
    }

    /// The operation finished and discovered hardware facts
    #[must_use]
    pub fn done_with_hardware(hardware: HardwareDetails) -> Self {
        Self {
            complete: true,
            retry_after: None,
            error: None,
            hardware: Some(hardware),
        }
    }

    /// The operation is still running; poll again after `retry_after`
    #[must_use]
    pub fn in_progress(retry_after: Duration) -> Self {
        Self {
            complete: false,
            retry_after: Some(retry_after),
            error: None,
            hardware: None,
        }
    }

    /// This attempt failed
    #[must_use]
    pub fn failed(error: ProvisionerError) -> Self {
        Self {
            complete: false,
            retry_after: None,
            error: Some(error),
            hardware: None,
        }
    }
}
