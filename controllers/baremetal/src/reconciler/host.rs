//! BareMetalHost reconciler
//!
//! One invocation drives exactly one state-machine step: resolve
//! credentials, bind a provisioner, plan and invoke a single backend
//! operation, fold the outcome into status, and hand the dispatcher a
//! scheduling directive. It never loops to completion and never blocks on
//! a slow backend operation.

use super::Reconciler;
use crate::error::ControllerError;
use crate::state_machine::{self, Directive, PlannedOperation, StepContext, Transition};
use crate::status::status_needs_update;
use crds::{BareMetalHost, BareMetalHostStatus, Image, ProvisioningState, ProvisioningStatus};
use kube::api::{Patch, PatchParams};
use kube_runtime::controller::Action;
use provisioner::{HostHandle, ImageRef, Outcome, Provisioner};
use tracing::{debug, info, warn};

/// Finalizer guarding backend deregistration before resource removal
pub const HOST_FINALIZER: &str = "metal.microscaler.io/baremetalhost";

fn image_ref(image: &Image) -> ImageRef {
    ImageRef {
        url: image.url.clone(),
        checksum: image.checksum.clone(),
    }
}

impl Reconciler {
    /// Reconcile one BareMetalHost.
    ///
    /// Backend and provisioning failures are folded into host status and
    /// never returned as errors; an `Err` here always means the
    /// surrounding infrastructure (apiserver, secret store) misbehaved.
    pub async fn reconcile_bare_metal_host(
        &self,
        host: &BareMetalHost,
    ) -> Result<Action, ControllerError> {
        let name = host
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::InvalidConfig("host missing name".to_string()))?;
        let namespace = host.metadata.namespace.as_deref().unwrap_or("default");
        let resource_key = format!("{}/{}", namespace, name);

        let marked_for_deletion = host.metadata.deletion_timestamp.is_some();
        let has_finalizer = host
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|v| v == HOST_FINALIZER));

        if marked_for_deletion && !has_finalizer {
            // Nothing left to clean up; the resource store will drop it.
            return Ok(Action::await_change());
        }
        if !marked_for_deletion && !has_finalizer {
            debug!("adding finalizer to host {}", resource_key);
            self.add_finalizer(name, host).await?;
            return Ok(Action::requeue(std::time::Duration::ZERO));
        }

        let status = host.status.clone().unwrap_or_default();
        let spec_generation = host.metadata.generation.unwrap_or(0);
        let ctx = StepContext {
            state: status.provisioning.state,
            error_message: &status.error_message,
            online: host.spec.online,
            image: host.spec.image.as_ref(),
            active_image: status.provisioning.image.as_ref(),
            powered_on: status.powered_on,
            marked_for_deletion,
            spec_generation,
            observed_generation: status.observed_generation,
        };

        info!(
            "reconciling host {} (state: {:?}, online: {}, deleting: {})",
            resource_key, ctx.state, ctx.online, marked_for_deletion
        );

        // Credential failures are an operator problem, not an engine one:
        // record a registration error and retry on the backoff schedule,
        // without ever touching the backend.
        let credentials = match self
            .credentials
            .resolve(&host.spec.bmc.credentials_name)
            .await?
        {
            Ok(credentials) => credentials,
            Err(cred_err) => {
                if marked_for_deletion {
                    // Deletion cannot proceed without management access;
                    // hold the host until the secret reappears or an
                    // external force-removal intervenes.
                    warn!(
                        "cannot resolve credentials for deleting host {}: {}",
                        resource_key, cred_err
                    );
                    return Ok(Action::requeue(self.next_error_backoff(&resource_key)));
                }
                let transition = Transition {
                    state: ProvisioningState::RegistrationError,
                    error_message: cred_err.to_string(),
                    dispatched_image: status.provisioning.image.clone(),
                    powered_on: status.powered_on,
                    hardware: None,
                    advance_generation: true,
                    directive: Directive::Backoff,
                };
                return self
                    .finish_step(host, &resource_key, &status, spec_generation, transition)
                    .await;
            }
        };

        let handle = HostHandle {
            name: name.to_string(),
            namespace: namespace.to_string(),
            bmc_address: host.spec.bmc.address.clone(),
        };
        let prov = self.factory.provisioner_for(handle, credentials);

        let op = state_machine::plan(&ctx);
        let outcome = invoke(prov.as_ref(), op, &ctx).await;
        let transition = state_machine::apply(&ctx, op, outcome.as_ref());

        debug!(
            "host {}: op {:?} -> state {:?} ({:?})",
            resource_key, op, transition.state, transition.directive
        );

        self.finish_step(host, &resource_key, &status, spec_generation, transition)
            .await
    }

    /// Persist a transition and turn its directive into a dispatcher action
    async fn finish_step(
        &self,
        host: &BareMetalHost,
        resource_key: &str,
        current: &BareMetalHostStatus,
        spec_generation: i64,
        transition: Transition,
    ) -> Result<Action, ControllerError> {
        if transition.directive == Directive::Remove {
            let name = host.metadata.name.as_deref().unwrap_or_default();
            info!("host {} deleted from backend, releasing finalizer", resource_key);
            self.remove_finalizer(name, host).await?;
            self.clear_error_backoff(resource_key);
            return Ok(Action::await_change());
        }

        let next_status = BareMetalHostStatus {
            operational_status: transition.state.operational_status(),
            provisioning: ProvisioningStatus {
                state: transition.state,
                image: transition.dispatched_image,
            },
            error_message: transition.error_message,
            hardware: transition.hardware.or_else(|| current.hardware.clone()),
            powered_on: transition.powered_on,
            observed_generation: if transition.advance_generation {
                spec_generation
            } else {
                current.observed_generation
            },
            last_updated: current.last_updated,
        };

        if status_needs_update(host.status.as_ref(), &next_status) {
            self.status.apply(host, next_status).await?;
        }

        match transition.directive {
            Directive::RequeueAfter(delay) => {
                self.reset_error_backoff(resource_key);
                Ok(Action::requeue(delay))
            }
            Directive::Backoff => {
                let delay = self.next_error_backoff(resource_key);
                info!(
                    "host {} failing (attempt {}), retrying in {:?}",
                    resource_key,
                    self.error_count(resource_key),
                    delay
                );
                Ok(Action::requeue(delay))
            }
            Directive::Settle => {
                if !transition.state.is_error() {
                    self.reset_error_backoff(resource_key);
                }
                Ok(Action::await_change())
            }
            Directive::Remove => unreachable!("handled above"),
        }
    }

    async fn add_finalizer(&self, name: &str, host: &BareMetalHost) -> Result<(), ControllerError> {
        let mut finalizers = host.metadata.finalizers.clone().unwrap_or_default();
        finalizers.push(HOST_FINALIZER.to_string());
        let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
        self.host_api
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn remove_finalizer(
        &self,
        name: &str,
        host: &BareMetalHost,
    ) -> Result<(), ControllerError> {
        let finalizers: Vec<String> = host
            .metadata
            .finalizers
            .clone()
            .unwrap_or_default()
            .into_iter()
            .filter(|v| v != HOST_FINALIZER)
            .collect();
        let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
        self.host_api
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// Invoke the planned operation against the bound provisioner
///
/// Returns `None` exactly when the plan made no backend call, so the
/// state machine can tell "no call" apart from "call with no outcome".
pub(crate) async fn invoke(
    prov: &dyn Provisioner,
    op: PlannedOperation,
    ctx: &StepContext<'_>,
) -> Option<Outcome> {
    match op {
        PlannedOperation::ValidateManagementAccess => Some(prov.validate_management_access().await),
        PlannedOperation::InspectHardware => Some(prov.inspect_hardware().await),
        PlannedOperation::Provision => {
            // Poll with the descriptor the run was dispatched with; a spec
            // edit mid-run stays queued until this run terminates.
            let image = ctx.active_image.or(ctx.image)?;
            Some(prov.provision(&image_ref(image)).await)
        }
        PlannedOperation::Deprovision => Some(prov.deprovision().await),
        PlannedOperation::PowerOn => Some(prov.power_on().await),
        PlannedOperation::PowerOff => Some(prov.power_off().await),
        PlannedOperation::Delete => Some(prov.delete().await),
        PlannedOperation::None => None,
    }
}
