//! Demo provisioner backend
//!
//! A deterministic backend that maps a host's name to a scripted outcome
//! sequence so every state machine path can be exercised without real
//! hardware. Hosts with names outside the scripted set succeed at every
//! operation.
//!
//! The name-to-behaviour mapping is a test and demo convenience, not a
//! production contract.

use crate::error::ProvisionerError;
use crate::models::{HardwareDetails, HostHandle, ImageRef, Outcome};
use crate::provisioner_trait::Provisioner;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Host that always fails management access validation
pub const REGISTRATION_ERROR_HOST: &str = "demo-registration-error";
/// Host whose registration never completes
pub const REGISTERING_HOST: &str = "demo-registering";
/// Host whose inspection never completes
pub const INSPECTING_HOST: &str = "demo-inspecting";
/// Success-path host name for walking to the ready rest state; takes the
/// default arm, like any unscripted name
pub const READY_HOST: &str = "demo-ready";
/// Host whose image deployment never completes
pub const PROVISIONING_HOST: &str = "demo-provisioning";
/// Success-path host name for the full provisioning walk; takes the
/// default arm, like any unscripted name
pub const PROVISIONED_HOST: &str = "demo-provisioned";
/// Host whose image deployment fails with an invalid-image error
pub const VALIDATION_ERROR_HOST: &str = "demo-validation-error";

/// How long the demo backend asks callers to wait before polling again
const DEMO_RETRY_AFTER: Duration = Duration::from_secs(10);

/// Record of every operation invoked on a [`DemoProvisioner`]
///
/// Shared between clones so tests can hand a provisioner to the controller
/// and later assert exactly which backend calls were made.
#[derive(Debug, Default, Clone)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl CallLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, op: &'static str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(op);
        }
    }

    /// Names of the operations invoked so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// How many times `op` has been invoked
    #[must_use]
    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| **c == op).count()
    }
}

/// Scripted provisioner for demos and state machine tests
#[derive(Debug, Clone)]
pub struct DemoProvisioner {
    host: HostHandle,
    log: CallLog,
}

impl DemoProvisioner {
    /// Bind a demo provisioner to a host
    #[must_use]
    pub fn new(host: HostHandle) -> Self {
        Self {
            host,
            log: CallLog::new(),
        }
    }

    /// Bind a demo provisioner that records operations into `log`
    #[must_use]
    pub fn with_call_log(host: HostHandle, log: CallLog) -> Self {
        Self { host, log }
    }

    /// The shared call log for this provisioner
    #[must_use]
    pub fn call_log(&self) -> CallLog {
        self.log.clone()
    }

    fn demo_hardware() -> HardwareDetails {
        let mut hardware = HardwareDetails::new();
        hardware.insert("manufacturer".to_string(), serde_json::json!("DemoWorks"));
        hardware.insert("model".to_string(), serde_json::json!("DW-1000"));
        hardware.insert("cpus".to_string(), serde_json::json!(8));
        hardware.insert("ramGib".to_string(), serde_json::json!(32));
        hardware
    }
}

#[async_trait::async_trait]
impl Provisioner for DemoProvisioner {
    async fn validate_management_access(&self) -> Outcome {
        self.log.record("validate_management_access");
        debug!(
            "demo: validate management access for {}/{}",
            self.host.namespace, self.host.name
        );
        match self.host.name.as_str() {
            REGISTRATION_ERROR_HOST => Outcome::failed(ProvisionerError::Operation(format!(
                "failed to register host {}: management controller at {} rejected the credentials",
                self.host.name, self.host.bmc_address
            ))),
            REGISTERING_HOST => Outcome::in_progress(DEMO_RETRY_AFTER),
            _ => Outcome::done(),
        }
    }

    async fn inspect_hardware(&self) -> Outcome {
        self.log.record("inspect_hardware");
        debug!(
            "demo: inspect hardware for {}/{}",
            self.host.namespace, self.host.name
        );
        match self.host.name.as_str() {
            INSPECTING_HOST => Outcome::in_progress(DEMO_RETRY_AFTER),
            _ => Outcome::done_with_hardware(Self::demo_hardware()),
        }
    }

    async fn provision(&self, image: &ImageRef) -> Outcome {
        self.log.record("provision");
        debug!(
            "demo: provision {}/{} with image {}",
            self.host.namespace, self.host.name, image.url
        );
        match self.host.name.as_str() {
            VALIDATION_ERROR_HOST => Outcome::failed(ProvisionerError::InvalidImage(format!(
                "image {} could not be validated",
                image.url
            ))),
            PROVISIONING_HOST => Outcome::in_progress(DEMO_RETRY_AFTER),
            _ => Outcome::done(),
        }
    }

    async fn deprovision(&self) -> Outcome {
        self.log.record("deprovision");
        debug!(
            "demo: deprovision {}/{}",
            self.host.namespace, self.host.name
        );
        Outcome::done()
    }

    async fn power_on(&self) -> Outcome {
        self.log.record("power_on");
        debug!("demo: power on {}/{}", self.host.namespace, self.host.name);
        Outcome::done()
    }

    async fn power_off(&self) -> Outcome {
        self.log.record("power_off");
        debug!("demo: power off {}/{}", self.host.namespace, self.host.name);
        Outcome::done()
    }

    async fn delete(&self) -> Outcome {
        self.log.record("delete");
        debug!("demo: delete {}/{}", self.host.namespace, self.host.name);
        Outcome::done()
    }
}
