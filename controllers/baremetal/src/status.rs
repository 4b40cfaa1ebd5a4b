//! Host status persistence
//!
//! Writes the engine's status updates back through the status subresource.
//! Updates are compare-and-set: the write carries the object's
//! `resourceVersion`, so a concurrent edit makes the apiserver reject it
//! with a conflict, and the reporter re-reads and retries a bounded number
//! of times before surfacing an infrastructure error.

use crate::error::ControllerError;
use crds::{BareMetalHost, BareMetalHostStatus};
use kube::api::PostParams;
use kube::Api;
use tracing::{debug, warn};

/// How many conflict retries before the step is abandoned and requeued
const MAX_CONFLICT_RETRIES: usize = 3;

/// Persists status changes for BareMetalHost resources.
#[derive(Clone)]
pub struct StatusReporter {
    host_api: Api<BareMetalHost>,
}

impl StatusReporter {
    /// Create a reporter backed by the given host API
    #[must_use]
    pub fn new(host_api: Api<BareMetalHost>) -> Self {
        Self { host_api }
    }

    /// Apply `status` to the named host, retrying version conflicts
    ///
    /// Skips the write entirely when the host already carries an
    /// equivalent status, so settled hosts generate no API traffic.
    pub async fn apply(
        &self,
        host: &BareMetalHost,
        mut status: BareMetalHostStatus,
    ) -> Result<(), ControllerError> {
        let name = host
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::InvalidConfig("host missing name".to_string()))?;

        if !status_needs_update(host.status.as_ref(), &status) {
            debug!("host {} status already current, skipping update", name);
            return Ok(());
        }
        status.last_updated = Some(chrono::Utc::now());

        let mut current = host.clone();
        let mut attempt = 0;
        loop {
            current.status = Some(status.clone());
            let payload = serde_json::to_vec(&current)?;
            match self
                .host_api
                .replace_status(name, &PostParams::default(), payload)
                .await
            {
                Ok(_) => {
                    debug!("updated status for host {}", name);
                    return Ok(());
                }
                Err(kube::Error::Api(ae)) if ae.code == 409 && attempt < MAX_CONFLICT_RETRIES => {
                    attempt += 1;
                    warn!(
                        "status update conflict for host {} (attempt {}), re-reading",
                        name, attempt
                    );
                    // Only this controller writes status and steps are
                    // serialized per host, so the desired status is still
                    // valid after a conflict; the re-read only refreshes
                    // resourceVersion. The conflicting spec/metadata edit
                    // produces its own watch event and gets a fresh step.
                    current = self.host_api.get(name).await?;
                }
                Err(kube::Error::Api(ae)) if ae.code == 409 => {
                    return Err(ControllerError::StatusConflict(name.to_string()));
                }
                Err(e) => return Err(ControllerError::Kube(e)),
            }
        }
    }
}

/// Whether `desired` differs from what the host currently reports
///
/// `lastUpdated` is deliberately excluded from the comparison; writing a
/// fresh timestamp for an otherwise identical status would trigger a new
/// watch event and loop the reconciler.
#[must_use]
pub fn status_needs_update(
    current: Option<&BareMetalHostStatus>,
    desired: &BareMetalHostStatus,
) -> bool {
    let Some(current) = current else {
        return true;
    };
    current.operational_status != desired.operational_status
        || current.provisioning.state != desired.provisioning.state
        || current.provisioning.image != desired.provisioning.image
        || current.error_message != desired.error_message
        || current.hardware != desired.hardware
        || current.powered_on != desired.powered_on
        || current.observed_generation != desired.observed_generation
}
