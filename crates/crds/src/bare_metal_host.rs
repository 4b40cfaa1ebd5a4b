//! BareMetalHost CRD
//!
//! Declarative record of a physical machine managed through its BMC.
//! The spec is owned by whoever registers the host; the status is owned
//! exclusively by the baremetal controller.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque hardware facts gathered during inspection.
///
/// The controller records these verbatim and never interprets them; the
/// shape is whatever the provisioner backend reports.
pub type HardwareDetails = BTreeMap<String, serde_json::Value>;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.microscaler.io",
    version = "v1alpha1",
    kind = "BareMetalHost",
    namespaced,
    status = "BareMetalHostStatus",
    shortname = "bmh"
)]
#[serde(rename_all = "camelCase")]
pub struct BareMetalHostSpec {
    /// Out-of-band management controller access
    pub bmc: BmcDetails,

    /// Desired power state; provisioning only starts for online hosts
    #[serde(default)]
    pub online: bool,

    /// Image to deploy once the host is ready; absent means leave the host
    /// unprovisioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BmcDetails {
    /// Address of the management controller (e.g. `ipmi://10.0.0.5`)
    pub address: String,

    /// Name of the Secret holding `username`/`password` for the BMC
    pub credentials_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// Where the image can be downloaded from
    pub url: String,

    /// Checksum used to verify the image after download
    pub checksum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BareMetalHostStatus {
    /// Coarse health summary, derived from the provisioning state
    #[serde(default)]
    pub operational_status: OperationalStatus,

    /// Detailed provisioning phase
    #[serde(default)]
    pub provisioning: ProvisioningStatus,

    /// Explanation of the most recent failure; empty unless the host is in
    /// an error state
    #[serde(default)]
    pub error_message: String,

    /// Hardware inventory recorded during inspection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware: Option<HardwareDetails>,

    /// Last observed power state of the host
    #[serde(default)]
    pub powered_on: bool,

    /// Spec generation the controller last acted on; lags
    /// `metadata.generation` while a backend operation is in flight
    #[serde(default)]
    pub observed_generation: i64,

    /// When the controller last changed this status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningStatus {
    /// Current lifecycle state
    #[serde(default)]
    pub state: ProvisioningState,

    /// Image the current (or last completed) provisioning run was
    /// dispatched with; spec edits made mid-run are only honoured after
    /// the run reaches a terminal outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,
}

/// Coarse operational health of a host
///
/// Serializes as PascalCase ("Discovered", "OK", etc.) but deserializes
/// lowercase aliases as well for backward compatibility with existing CRs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum OperationalStatus {
    /// Host record exists but the controller has not acted on it yet
    #[default]
    #[serde(alias = "uninitialized")]
    Uninitialized,

    /// Management access works but the host is not fully inspected
    #[serde(alias = "discovered")]
    Discovered,

    /// Host is healthy
    #[serde(rename = "OK", alias = "ok")]
    Ok,

    /// Host is held in an error state pending operator correction
    #[serde(alias = "error")]
    Error,
}

/// Lifecycle state of a host
///
/// This is a closed set; unknown strings are rejected when status is
/// deserialized rather than carried around as free text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ProvisioningState {
    /// Validating management access and registering with the backend
    #[default]
    #[serde(alias = "registering")]
    Registering,

    /// Hardware inventory collection in progress
    #[serde(alias = "inspecting")]
    Inspecting,

    /// Inspected and available for provisioning
    #[serde(alias = "ready")]
    Ready,

    /// Image deployment in progress
    #[serde(alias = "provisioning")]
    Provisioning,

    /// Image deployed; steady state for an online host
    #[serde(alias = "provisioned")]
    Provisioned,

    /// Returning the host to a clean, unprovisioned state
    #[serde(alias = "deprovisioning")]
    Deprovisioning,

    /// Powering off and deregistering before the resource is removed
    #[serde(alias = "deleting")]
    Deleting,

    /// Management access or backend registration failed
    #[serde(alias = "registrationError")]
    RegistrationError,

    /// The spec's image descriptor is malformed; held until the spec is
    /// edited
    #[serde(alias = "validationError")]
    ValidationError,

    /// The backend failed mid-deployment
    #[serde(alias = "provisioningError")]
    ProvisioningError,
}

impl ProvisioningState {
    /// Whether this is one of the error rest states
    #[must_use]
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Self::RegistrationError | Self::ValidationError | Self::ProvisioningError
        )
    }

    /// The state an error variant re-enters once the operator edits the
    /// spec; `None` for non-error states
    #[must_use]
    pub fn error_origin(self) -> Option<Self> {
        match self {
            Self::RegistrationError => Some(Self::Registering),
            Self::ValidationError => Some(Self::Ready),
            Self::ProvisioningError => Some(Self::Provisioning),
            _ => None,
        }
    }

    /// Operational status a host in this state reports
    #[must_use]
    pub fn operational_status(self) -> OperationalStatus {
        match self {
            Self::Registering | Self::Inspecting => OperationalStatus::Discovered,
            Self::Ready
            | Self::Provisioning
            | Self::Provisioned
            | Self::Deprovisioning
            | Self::Deleting => OperationalStatus::Ok,
            Self::RegistrationError | Self::ValidationError | Self::ProvisioningError => {
                OperationalStatus::Error
            }
        }
    }
}

impl BareMetalHost {
    /// Current provisioning state, defaulting to `Registering` for a host
    /// the controller has never touched
    #[must_use]
    pub fn provisioning_state(&self) -> ProvisioningState {
        self.status
            .as_ref()
            .map(|s| s.provisioning.state)
            .unwrap_or_default()
    }

    /// Whether the host is held in an error state
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.provisioning_state().is_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisioning_state_round_trip() {
        let states = [
            ProvisioningState::Registering,
            ProvisioningState::Inspecting,
            ProvisioningState::Ready,
            ProvisioningState::Provisioning,
            ProvisioningState::Provisioned,
            ProvisioningState::Deprovisioning,
            ProvisioningState::Deleting,
            ProvisioningState::RegistrationError,
            ProvisioningState::ValidationError,
            ProvisioningState::ProvisioningError,
        ];
        for state in states {
            let json = serde_json::to_string(&state).unwrap();
            let back: ProvisioningState = serde_json::from_str(&json).unwrap();
            assert_eq!(state, back);
        }
    }

    #[test]
    fn unknown_provisioning_state_rejected() {
        let result = serde_json::from_str::<ProvisioningState>("\"Exploded\"");
        assert!(result.is_err());
    }

    #[test]
    fn operational_status_ok_serializes_uppercase() {
        let json = serde_json::to_string(&OperationalStatus::Ok).unwrap();
        assert_eq!(json, "\"OK\"");
    }

    #[test]
    fn status_round_trip_preserves_hardware_details() {
        let mut hardware = HardwareDetails::new();
        hardware.insert("cpus".to_string(), serde_json::json!(64));
        hardware.insert(
            "nics".to_string(),
            serde_json::json!([{"name": "eth0", "mac": "aa:bb:cc:dd:ee:ff"}]),
        );
        let status = BareMetalHostStatus {
            operational_status: OperationalStatus::Ok,
            provisioning: ProvisioningStatus {
                state: ProvisioningState::Provisioned,
                image: Some(Image {
                    url: "http://images/focal.qcow2".to_string(),
                    checksum: "sha256:abc123".to_string(),
                }),
            },
            error_message: String::new(),
            hardware: Some(hardware.clone()),
            powered_on: true,
            observed_generation: 3,
            last_updated: None,
        };

        let json = serde_json::to_string(&status).unwrap();
        let back: BareMetalHostStatus = serde_json::from_str(&json).unwrap();

        assert_eq!(back.hardware, Some(hardware));
        assert_eq!(back.provisioning.state, ProvisioningState::Provisioned);
        assert_eq!(back.observed_generation, 3);
        assert!(back.powered_on);
    }

    #[test]
    fn error_origin_maps_back_to_failing_state() {
        assert_eq!(
            ProvisioningState::RegistrationError.error_origin(),
            Some(ProvisioningState::Registering)
        );
        assert_eq!(
            ProvisioningState::ValidationError.error_origin(),
            Some(ProvisioningState::Ready)
        );
        assert_eq!(
            ProvisioningState::ProvisioningError.error_origin(),
            Some(ProvisioningState::Provisioning)
        );
        assert_eq!(ProvisioningState::Ready.error_origin(), None);
    }
}
