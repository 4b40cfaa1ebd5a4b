//! Main controller implementation.
//!
//! This module contains the `Controller` struct that orchestrates
//! reconciliation and resource watching for the bare-metal host
//! controller.
//!
//! The controller manages one CRD type:
//! - BareMetalHost: drives a physical host through its provisioning
//!   lifecycle via the configured backend

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use crds::BareMetalHost;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use provisioner::{ProvisionerFactory, ProvisionerKind};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for bare-metal host management.
pub struct Controller {
    host_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(
        provisioner_kind: ProvisionerKind,
        namespace: Option<String>,
    ) -> Result<Self, ControllerError> {
        info!("Initializing BareMetalHost Controller");

        let kube_client = Client::try_default()
            .await
            .map_err(ControllerError::Kube)?;

        let ns = namespace.as_deref().unwrap_or("default");
        let host_api: Api<BareMetalHost> = Api::namespaced(kube_client.clone(), ns);
        // Credential Secrets are resolved from the same namespace as the
        // hosts that reference them.
        let secret_api: Api<Secret> = Api::namespaced(kube_client, ns);

        let factory = ProvisionerFactory::new(provisioner_kind);
        let reconciler = Arc::new(Reconciler::new(factory, host_api.clone(), secret_api));

        let watcher_instance = Arc::new(Watcher::new(reconciler, host_api));

        let host_watcher = {
            let watcher = watcher_instance;
            tokio::spawn(async move { watcher.watch_bare_metal_hosts().await })
        };

        Ok(Self { host_watcher })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("BareMetalHost Controller running");

        // The watcher should run forever; its exit is an error condition.
        let result = &mut self.host_watcher;
        result
            .await
            .map_err(|e| ControllerError::Watch(format!("BareMetalHost watcher panicked: {}", e)))?
            .map_err(|e| ControllerError::Watch(format!("BareMetalHost watcher error: {}", e)))?;

        Ok(())
    }
}
