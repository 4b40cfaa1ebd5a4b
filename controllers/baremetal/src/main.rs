//! BareMetalHost Controller
//!
//! Controller for managing the BareMetalHost CRD:
//! - registers hosts with their management controller (BMC)
//! - inspects hardware and records the inventory in status
//! - deploys and removes OS images to match the declared spec
//! - reconciles power state and cleans up on deletion
//!
//! The provisioning backend is selected at startup; the scripted demo
//! backend runs the full lifecycle without real hardware.

mod backoff;
mod controller;
mod credentials;
mod error;
mod reconciler;
mod state_machine;
mod status;
mod watcher;

use crate::error::ControllerError;
use controller::Controller;
use provisioner::ProvisionerKind;
use std::env;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting BareMetalHost Controller");

    // Load configuration from environment variables
    let provisioner_kind: ProvisionerKind = env::var("PROVISIONER")
        .unwrap_or_else(|_| "demo".to_string())
        .parse()
        .map_err(ControllerError::InvalidConfig)?;
    let namespace = env::var("WATCH_NAMESPACE").ok();

    info!("Configuration:");
    info!("  Provisioner: {:?}", provisioner_kind);
    info!(
        "  Namespace: {}",
        namespace.as_deref().unwrap_or("default")
    );

    let controller = Controller::new(provisioner_kind, namespace).await?;
    controller.run().await?;

    Ok(())
}
