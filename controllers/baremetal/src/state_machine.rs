//! Provisioning state machine
//!
//! Pure decision logic for one reconciliation step. [`plan`] maps the
//! observed facts to the single provisioner operation the step should
//! invoke (if any); [`apply`] maps the operation's outcome back to the
//! next state, the status changes to record, and a scheduling directive.
//!
//! Neither function performs I/O, which is what keeps the transition table
//! testable without an apiserver or a backend.

use crds::{Image, ProvisioningState};
use provisioner::{HardwareDetails, ImageRef, Outcome, ProvisionerError};
use std::time::Duration;

/// Fallback poll interval when an in-progress outcome does not name one
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Facts the engine observed going into one step
#[derive(Debug, Clone)]
pub struct StepContext<'a> {
    /// Current lifecycle state (default for a never-seen host)
    pub state: ProvisioningState,
    /// Error message currently recorded in status
    pub error_message: &'a str,
    /// Desired power state from the spec
    pub online: bool,
    /// Image descriptor from the spec
    pub image: Option<&'a Image>,
    /// Image the in-flight/last provisioning run was dispatched with
    pub active_image: Option<&'a Image>,
    /// Last observed power state
    pub powered_on: bool,
    /// The resource carries a deletion timestamp
    pub marked_for_deletion: bool,
    /// `metadata.generation` of the spec
    pub spec_generation: i64,
    /// Generation the controller last acted on
    pub observed_generation: i64,
}

impl StepContext<'_> {
    fn spec_edited(&self) -> bool {
        self.spec_generation != self.observed_generation
    }
}

/// The single backend operation one step invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedOperation {
    /// Confirm BMC reachability and credentials
    ValidateManagementAccess,
    /// Poll hardware inventory collection
    InspectHardware,
    /// Poll image deployment
    Provision,
    /// Poll image removal
    Deprovision,
    /// Ensure the host is powered on
    PowerOn,
    /// Ensure the host is powered off
    PowerOff,
    /// Deregister the host from the backend
    Delete,
    /// No backend call this step
    None,
}

/// How the engine should schedule the next step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Re-deliver after the given delay (zero = immediately)
    RequeueAfter(Duration),
    /// Re-deliver on the per-host error backoff schedule
    Backoff,
    /// Nothing to do until the resource changes
    Settle,
    /// Deletion finished; the resource may be removed
    Remove,
}

/// Status changes and scheduling decision produced by one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Next lifecycle state
    pub state: ProvisioningState,
    /// Error explanation; empty exactly when `state` is not an error state
    pub error_message: String,
    /// Value `status.provisioning.image` should have after this step
    pub dispatched_image: Option<Image>,
    /// Value `status.poweredOn` should have after this step
    pub powered_on: bool,
    /// Freshly discovered hardware facts to record, if any
    pub hardware: Option<HardwareDetails>,
    /// Whether `status.observedGeneration` catches up to the spec; held
    /// back while a backend operation is still in flight so spec edits
    /// stay queued until the operation reaches a terminal outcome
    pub advance_generation: bool,
    /// Scheduling decision for the engine
    pub directive: Directive,
}

impl Transition {
    /// Carry-over transition: nothing changes, host is settled
    fn carry(ctx: &StepContext<'_>, error_message: String) -> Self {
        Self {
            state: ctx.state,
            error_message,
            dispatched_image: ctx.active_image.cloned(),
            powered_on: ctx.powered_on,
            hardware: None,
            advance_generation: true,
            directive: Directive::Settle,
        }
    }
}

fn poll_delay(outcome: &Outcome) -> Duration {
    outcome.retry_after.unwrap_or(DEFAULT_POLL_INTERVAL)
}

fn image_validation_error(image: &Image) -> Option<String> {
    ImageRef {
        url: image.url.clone(),
        checksum: image.checksum.clone(),
    }
    .validation_error()
}

/// Decide which backend operation this step should invoke
///
/// Descriptor validation happens before dispatch: a malformed image never
/// causes a backend call, so `Ready` plans no operation when an image is
/// present and lets [`apply`] classify it.
pub fn plan(ctx: &StepContext<'_>) -> PlannedOperation {
    if ctx.marked_for_deletion {
        // Deletion pre-empts everything: power down, then deregister.
        return if ctx.powered_on {
            PlannedOperation::PowerOff
        } else {
            PlannedOperation::Delete
        };
    }

    match ctx.state {
        ProvisioningState::Registering | ProvisioningState::RegistrationError => {
            // Registration failures are retried automatically, so the
            // error state re-validates on every (backed-off) step.
            PlannedOperation::ValidateManagementAccess
        }
        ProvisioningState::Inspecting => PlannedOperation::InspectHardware,
        ProvisioningState::Ready => {
            if ctx.online && ctx.image.is_none() && !ctx.powered_on {
                PlannedOperation::PowerOn
            } else {
                PlannedOperation::None
            }
        }
        ProvisioningState::Provisioning => PlannedOperation::Provision,
        ProvisioningState::Provisioned => {
            if ctx.online && !ctx.powered_on {
                PlannedOperation::PowerOn
            } else {
                PlannedOperation::None
            }
        }
        ProvisioningState::Deprovisioning => PlannedOperation::Deprovision,
        ProvisioningState::Deleting => {
            if ctx.powered_on {
                PlannedOperation::PowerOff
            } else {
                PlannedOperation::Delete
            }
        }
        ProvisioningState::ValidationError | ProvisioningState::ProvisioningError => {
            PlannedOperation::None
        }
    }
}

/// Fold an operation's outcome into the next state and status changes
///
/// `outcome` is `None` exactly when [`plan`] returned
/// [`PlannedOperation::None`].
pub fn apply(
    ctx: &StepContext<'_>,
    op: PlannedOperation,
    outcome: Option<&Outcome>,
) -> Transition {
    if ctx.marked_for_deletion {
        return apply_deleting(ctx, op, outcome);
    }

    match ctx.state {
        ProvisioningState::Registering | ProvisioningState::RegistrationError => {
            apply_registering(ctx, outcome)
        }
        ProvisioningState::Inspecting => apply_inspecting(ctx, outcome),
        ProvisioningState::Ready => apply_ready(ctx, op, outcome),
        ProvisioningState::Provisioning => apply_provisioning(ctx, outcome),
        ProvisioningState::Provisioned => apply_provisioned(ctx, op, outcome),
        ProvisioningState::Deprovisioning => apply_deprovisioning(ctx, outcome),
        ProvisioningState::Deleting => apply_deleting(ctx, op, outcome),
        ProvisioningState::ValidationError | ProvisioningState::ProvisioningError => {
            apply_held_error(ctx)
        }
    }
}

fn apply_deleting(
    ctx: &StepContext<'_>,
    op: PlannedOperation,
    outcome: Option<&Outcome>,
) -> Transition {
    let mut next = Transition::carry(ctx, String::new());
    next.state = ProvisioningState::Deleting;

    let Some(outcome) = outcome else {
        // Deletion always plans an operation; nothing to fold otherwise.
        next.directive = Directive::RequeueAfter(Duration::ZERO);
        return next;
    };

    if outcome.error.is_some() {
        // No error rest state exists during deletion; keep retrying the
        // same step on the backoff schedule.
        next.directive = Directive::Backoff;
        return next;
    }
    if !outcome.complete {
        next.advance_generation = false;
        next.directive = Directive::RequeueAfter(poll_delay(outcome));
        return next;
    }

    match op {
        PlannedOperation::PowerOff => {
            next.powered_on = false;
            next.directive = Directive::RequeueAfter(Duration::ZERO);
        }
        PlannedOperation::Delete => {
            next.directive = Directive::Remove;
        }
        _ => {
            next.directive = Directive::RequeueAfter(Duration::ZERO);
        }
    }
    next
}

fn apply_registering(ctx: &StepContext<'_>, outcome: Option<&Outcome>) -> Transition {
    let Some(outcome) = outcome else {
        return Transition::carry(ctx, String::new());
    };

    if let Some(error) = &outcome.error {
        let mut next = Transition::carry(ctx, error.to_string());
        next.state = ProvisioningState::RegistrationError;
        next.directive = Directive::Backoff;
        return next;
    }
    if !outcome.complete {
        // A retry that is merely slow drops back to Registering; the
        // error only returns if the attempt actually fails.
        let mut next = Transition::carry(ctx, String::new());
        next.state = ProvisioningState::Registering;
        next.advance_generation = false;
        next.directive = Directive::RequeueAfter(poll_delay(outcome));
        return next;
    }

    let mut next = Transition::carry(ctx, String::new());
    next.state = ProvisioningState::Inspecting;
    next.hardware = outcome.hardware.clone();
    next.directive = Directive::RequeueAfter(Duration::ZERO);
    next
}

fn apply_inspecting(ctx: &StepContext<'_>, outcome: Option<&Outcome>) -> Transition {
    let Some(outcome) = outcome else {
        return Transition::carry(ctx, String::new());
    };

    if let Some(error) = &outcome.error {
        // Permanent inspection failures are registration-class: the
        // management controller or its credentials are the usual culprit.
        let mut next = Transition::carry(ctx, error.to_string());
        next.state = ProvisioningState::RegistrationError;
        next.directive = Directive::Backoff;
        return next;
    }
    if !outcome.complete {
        let mut next = Transition::carry(ctx, String::new());
        next.advance_generation = false;
        next.directive = Directive::RequeueAfter(poll_delay(outcome));
        return next;
    }

    let mut next = Transition::carry(ctx, String::new());
    next.state = ProvisioningState::Ready;
    next.hardware = outcome.hardware.clone();
    next.directive = Directive::RequeueAfter(Duration::ZERO);
    next
}

fn apply_ready(
    ctx: &StepContext<'_>,
    op: PlannedOperation,
    outcome: Option<&Outcome>,
) -> Transition {
    if op == PlannedOperation::PowerOn {
        return apply_power_on(ctx, outcome);
    }

    if ctx.online {
        if let Some(image) = ctx.image {
            if let Some(reason) = image_validation_error(image) {
                let mut next = Transition::carry(ctx, reason);
                next.state = ProvisioningState::ValidationError;
                return next;
            }
            // Announce the transition one step before the first Provision
            // call so the state sequence is never skipped, and capture the
            // descriptor this run will use.
            let mut next = Transition::carry(ctx, String::new());
            next.state = ProvisioningState::Provisioning;
            next.dispatched_image = Some(image.clone());
            next.directive = Directive::RequeueAfter(Duration::ZERO);
            return next;
        }
    }

    Transition::carry(ctx, String::new())
}

fn apply_provisioning(ctx: &StepContext<'_>, outcome: Option<&Outcome>) -> Transition {
    let Some(outcome) = outcome else {
        return Transition::carry(ctx, String::new());
    };

    if let Some(error) = &outcome.error {
        let mut next = Transition::carry(ctx, error.to_string());
        next.state = match error {
            ProvisionerError::InvalidImage(_) => ProvisioningState::ValidationError,
            ProvisionerError::Operation(_) => ProvisioningState::ProvisioningError,
        };
        return next;
    }
    if !outcome.complete {
        let mut next = Transition::carry(ctx, String::new());
        next.advance_generation = false;
        next.directive = Directive::RequeueAfter(poll_delay(outcome));
        return next;
    }

    let mut next = Transition::carry(ctx, String::new());
    next.state = ProvisioningState::Provisioned;
    next.directive = Directive::RequeueAfter(Duration::ZERO);
    next
}

fn apply_provisioned(
    ctx: &StepContext<'_>,
    op: PlannedOperation,
    outcome: Option<&Outcome>,
) -> Transition {
    if op == PlannedOperation::PowerOn {
        return apply_power_on(ctx, outcome);
    }

    // Going offline tears the deployment down, and so does an image edit
    // queued during the last run (changed or removed descriptor): the host
    // re-walks Ready -> Provisioning with the current spec.
    if !ctx.online || ctx.image != ctx.active_image {
        let mut next = Transition::carry(ctx, String::new());
        next.state = ProvisioningState::Deprovisioning;
        next.directive = Directive::RequeueAfter(Duration::ZERO);
        return next;
    }

    Transition::carry(ctx, String::new())
}

fn apply_deprovisioning(ctx: &StepContext<'_>, outcome: Option<&Outcome>) -> Transition {
    let Some(outcome) = outcome else {
        return Transition::carry(ctx, String::new());
    };

    if let Some(error) = &outcome.error {
        let mut next = Transition::carry(ctx, error.to_string());
        next.state = ProvisioningState::ProvisioningError;
        return next;
    }
    if !outcome.complete {
        let mut next = Transition::carry(ctx, String::new());
        next.advance_generation = false;
        next.directive = Directive::RequeueAfter(poll_delay(outcome));
        return next;
    }

    let mut next = Transition::carry(ctx, String::new());
    next.state = ProvisioningState::Ready;
    next.powered_on = false;
    next.dispatched_image = None;
    next.directive = Directive::RequeueAfter(Duration::ZERO);
    next
}

fn apply_power_on(ctx: &StepContext<'_>, outcome: Option<&Outcome>) -> Transition {
    let Some(outcome) = outcome else {
        return Transition::carry(ctx, String::new());
    };

    if let Some(error) = &outcome.error {
        // Power control failures point at the management controller.
        let mut next = Transition::carry(ctx, error.to_string());
        next.state = ProvisioningState::RegistrationError;
        next.directive = Directive::Backoff;
        return next;
    }
    if !outcome.complete {
        let mut next = Transition::carry(ctx, String::new());
        next.advance_generation = false;
        next.directive = Directive::RequeueAfter(poll_delay(outcome));
        return next;
    }

    let mut next = Transition::carry(ctx, String::new());
    next.powered_on = true;
    next
}

fn apply_held_error(ctx: &StepContext<'_>) -> Transition {
    if ctx.spec_edited() {
        // A spec edit is the operator's retry lever: re-enter the state
        // the error occurred in and clear the stale message.
        if let Some(origin) = ctx.state.error_origin() {
            let mut next = Transition::carry(ctx, String::new());
            next.state = origin;
            next.directive = Directive::RequeueAfter(Duration::ZERO);
            return next;
        }
    }

    // Held until the spec changes; keep reporting the same failure.
    Transition::carry(ctx, ctx.error_message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::Image;

    fn image(url: &str, checksum: &str) -> Image {
        Image {
            url: url.to_string(),
            checksum: checksum.to_string(),
        }
    }

    fn ctx(state: ProvisioningState) -> StepContext<'static> {
        StepContext {
            state,
            error_message: "",
            online: false,
            image: None,
            active_image: None,
            powered_on: false,
            marked_for_deletion: false,
            spec_generation: 1,
            observed_generation: 1,
        }
    }

    #[test]
    fn registering_success_moves_to_inspecting() {
        let ctx = ctx(ProvisioningState::Registering);
        assert_eq!(plan(&ctx), PlannedOperation::ValidateManagementAccess);

        let next = apply(
            &ctx,
            PlannedOperation::ValidateManagementAccess,
            Some(&Outcome::done()),
        );
        assert_eq!(next.state, ProvisioningState::Inspecting);
        assert!(next.error_message.is_empty());
        assert_eq!(next.directive, Directive::RequeueAfter(Duration::ZERO));
    }

    #[test]
    fn registering_failure_enters_registration_error() {
        let ctx = ctx(ProvisioningState::Registering);
        let outcome = Outcome::failed(ProvisionerError::Operation("bmc unreachable".to_string()));
        let next = apply(&ctx, PlannedOperation::ValidateManagementAccess, Some(&outcome));
        assert_eq!(next.state, ProvisioningState::RegistrationError);
        assert_eq!(next.error_message, "bmc unreachable");
        assert_eq!(next.directive, Directive::Backoff);
    }

    #[test]
    fn registration_error_retries_validation() {
        let ctx = ctx(ProvisioningState::RegistrationError);
        assert_eq!(plan(&ctx), PlannedOperation::ValidateManagementAccess);

        let next = apply(
            &ctx,
            PlannedOperation::ValidateManagementAccess,
            Some(&Outcome::done()),
        );
        assert_eq!(next.state, ProvisioningState::Inspecting);
        assert!(next.error_message.is_empty());
    }

    #[test]
    fn in_progress_outcome_never_changes_state() {
        let outcome = Outcome::in_progress(Duration::from_secs(30));
        for (state, op) in [
            (ProvisioningState::Registering, PlannedOperation::ValidateManagementAccess),
            (ProvisioningState::Inspecting, PlannedOperation::InspectHardware),
            (ProvisioningState::Provisioning, PlannedOperation::Provision),
            (ProvisioningState::Deprovisioning, PlannedOperation::Deprovision),
        ] {
            let ctx = ctx(state);
            let next = apply(&ctx, op, Some(&outcome));
            assert_eq!(next.state, state, "{state:?} changed on in-progress outcome");
            assert!(!next.advance_generation);
            assert_eq!(
                next.directive,
                Directive::RequeueAfter(Duration::from_secs(30))
            );
        }
    }

    #[test]
    fn in_progress_without_retry_hint_uses_default_poll_interval() {
        let mut outcome = Outcome::in_progress(Duration::ZERO);
        outcome.retry_after = None;
        let ctx = ctx(ProvisioningState::Inspecting);
        let next = apply(&ctx, PlannedOperation::InspectHardware, Some(&outcome));
        assert_eq!(
            next.directive,
            Directive::RequeueAfter(DEFAULT_POLL_INTERVAL)
        );
    }

    #[test]
    fn inspection_records_hardware_facts() {
        let mut hardware = HardwareDetails::new();
        hardware.insert("cpus".to_string(), serde_json::json!(8));
        let outcome = Outcome::done_with_hardware(hardware.clone());

        let ctx = ctx(ProvisioningState::Inspecting);
        let next = apply(&ctx, PlannedOperation::InspectHardware, Some(&outcome));
        assert_eq!(next.state, ProvisioningState::Ready);
        assert_eq!(next.hardware, Some(hardware));
    }

    #[test]
    fn inspection_failure_is_registration_class() {
        let ctx = ctx(ProvisioningState::Inspecting);
        let outcome = Outcome::failed(ProvisionerError::Operation("ipmi timeout".to_string()));
        let next = apply(&ctx, PlannedOperation::InspectHardware, Some(&outcome));
        assert_eq!(next.state, ProvisioningState::RegistrationError);
        assert!(!next.error_message.is_empty());
    }

    #[test]
    fn ready_offline_is_a_no_op() {
        let mut ctx = ctx(ProvisioningState::Ready);
        ctx.online = false;
        assert_eq!(plan(&ctx), PlannedOperation::None);
        let next = apply(&ctx, PlannedOperation::None, None);
        assert_eq!(next.state, ProvisioningState::Ready);
        assert_eq!(next.directive, Directive::Settle);
    }

    #[test]
    fn ready_online_with_valid_image_enters_provisioning_without_backend_call() {
        let img = image("http://images/focal.qcow2", "sha256:abc");
        let mut ctx = ctx(ProvisioningState::Ready);
        ctx.online = true;
        ctx.image = Some(&img);

        assert_eq!(plan(&ctx), PlannedOperation::None);
        let next = apply(&ctx, PlannedOperation::None, None);
        assert_eq!(next.state, ProvisioningState::Provisioning);
        assert_eq!(next.dispatched_image, Some(img));
        assert_eq!(next.directive, Directive::RequeueAfter(Duration::ZERO));
    }

    #[test]
    fn ready_online_with_empty_url_is_a_validation_error() {
        let img = image("", "x");
        let mut ctx = ctx(ProvisioningState::Ready);
        ctx.online = true;
        ctx.image = Some(&img);

        // The descriptor never reaches the backend.
        assert_eq!(plan(&ctx), PlannedOperation::None);
        let next = apply(&ctx, PlannedOperation::None, None);
        assert_eq!(next.state, ProvisioningState::ValidationError);
        assert!(!next.error_message.is_empty());
        assert_eq!(next.directive, Directive::Settle);
    }

    #[test]
    fn ready_online_without_image_powers_on() {
        let mut ctx = ctx(ProvisioningState::Ready);
        ctx.online = true;
        assert_eq!(plan(&ctx), PlannedOperation::PowerOn);

        let next = apply(&ctx, PlannedOperation::PowerOn, Some(&Outcome::done()));
        assert_eq!(next.state, ProvisioningState::Ready);
        assert!(next.powered_on);
    }

    #[test]
    fn provisioning_completion_reaches_provisioned() {
        let ctx = ctx(ProvisioningState::Provisioning);
        let next = apply(&ctx, PlannedOperation::Provision, Some(&Outcome::done()));
        assert_eq!(next.state, ProvisioningState::Provisioned);
    }

    #[test]
    fn provisioning_operation_failure_enters_provisioning_error() {
        let ctx = ctx(ProvisioningState::Provisioning);
        let outcome = Outcome::failed(ProvisionerError::Operation("write failed".to_string()));
        let next = apply(&ctx, PlannedOperation::Provision, Some(&outcome));
        assert_eq!(next.state, ProvisioningState::ProvisioningError);
        assert_eq!(next.error_message, "write failed");
    }

    #[test]
    fn provisioning_invalid_image_enters_validation_error() {
        let ctx = ctx(ProvisioningState::Provisioning);
        let outcome = Outcome::failed(ProvisionerError::InvalidImage("bad checksum".to_string()));
        let next = apply(&ctx, PlannedOperation::Provision, Some(&outcome));
        assert_eq!(next.state, ProvisioningState::ValidationError);
    }

    #[test]
    fn provisioned_going_offline_enters_deprovisioning() {
        let mut ctx = ctx(ProvisioningState::Provisioned);
        ctx.online = false;
        ctx.powered_on = true;
        assert_eq!(plan(&ctx), PlannedOperation::None);
        let next = apply(&ctx, PlannedOperation::None, None);
        assert_eq!(next.state, ProvisioningState::Deprovisioning);
    }

    #[test]
    fn provisioned_with_edited_image_enters_deprovisioning() {
        let old = image("http://images/focal.qcow2", "sha256:abc");
        let new = image("http://images/jammy.qcow2", "sha256:def");
        let mut ctx = ctx(ProvisioningState::Provisioned);
        ctx.online = true;
        ctx.powered_on = true;
        ctx.image = Some(&new);
        ctx.active_image = Some(&old);

        assert_eq!(plan(&ctx), PlannedOperation::None);
        let next = apply(&ctx, PlannedOperation::None, None);
        assert_eq!(next.state, ProvisioningState::Deprovisioning);
        assert!(next.error_message.is_empty());
        assert_eq!(next.directive, Directive::RequeueAfter(Duration::ZERO));
    }

    #[test]
    fn provisioned_with_removed_image_enters_deprovisioning() {
        let old = image("http://images/focal.qcow2", "sha256:abc");
        let mut ctx = ctx(ProvisioningState::Provisioned);
        ctx.online = true;
        ctx.powered_on = true;
        ctx.active_image = Some(&old);

        let next = apply(&ctx, PlannedOperation::None, None);
        assert_eq!(next.state, ProvisioningState::Deprovisioning);
    }

    #[test]
    fn provisioned_online_powered_on_is_settled() {
        let mut ctx = ctx(ProvisioningState::Provisioned);
        ctx.online = true;
        ctx.powered_on = true;
        assert_eq!(plan(&ctx), PlannedOperation::None);
        let next = apply(&ctx, PlannedOperation::None, None);
        assert_eq!(next.state, ProvisioningState::Provisioned);
        assert_eq!(next.directive, Directive::Settle);
    }

    #[test]
    fn deprovisioning_completion_returns_to_ready_and_clears_image() {
        let img = image("http://images/focal.qcow2", "sha256:abc");
        let mut ctx = ctx(ProvisioningState::Deprovisioning);
        ctx.active_image = Some(&img);
        ctx.powered_on = true;

        let next = apply(&ctx, PlannedOperation::Deprovision, Some(&Outcome::done()));
        assert_eq!(next.state, ProvisioningState::Ready);
        assert_eq!(next.dispatched_image, None);
        assert!(!next.powered_on);
    }

    #[test]
    fn deletion_preempts_any_state() {
        for state in [
            ProvisioningState::Registering,
            ProvisioningState::Ready,
            ProvisioningState::Provisioning,
            ProvisioningState::Provisioned,
            ProvisioningState::RegistrationError,
        ] {
            let mut ctx = ctx(state);
            ctx.marked_for_deletion = true;
            ctx.powered_on = true;
            assert_eq!(plan(&ctx), PlannedOperation::PowerOff, "from {state:?}");

            let next = apply(&ctx, PlannedOperation::PowerOff, Some(&Outcome::done()));
            assert_eq!(next.state, ProvisioningState::Deleting);
            assert!(!next.powered_on);
            assert_eq!(next.directive, Directive::RequeueAfter(Duration::ZERO));
        }
    }

    #[test]
    fn deletion_power_off_then_delete_then_remove() {
        let mut c = ctx(ProvisioningState::Provisioned);
        c.marked_for_deletion = true;
        c.powered_on = true;

        let after_power_off = apply(&c, PlannedOperation::PowerOff, Some(&Outcome::done()));
        assert!(!after_power_off.powered_on);

        let mut c2 = ctx(ProvisioningState::Deleting);
        c2.marked_for_deletion = true;
        c2.powered_on = false;
        assert_eq!(plan(&c2), PlannedOperation::Delete);

        let after_delete = apply(&c2, PlannedOperation::Delete, Some(&Outcome::done()));
        assert_eq!(after_delete.directive, Directive::Remove);
    }

    #[test]
    fn validation_error_is_held_until_spec_edit() {
        let mut c = ctx(ProvisioningState::ValidationError);
        c.error_message = "image URL is empty";
        assert_eq!(plan(&c), PlannedOperation::None);
        let next = apply(&c, PlannedOperation::None, None);
        assert_eq!(next.state, ProvisioningState::ValidationError);
        assert_eq!(next.error_message, "image URL is empty");
        assert_eq!(next.directive, Directive::Settle);
    }

    #[test]
    fn spec_edit_reenters_originating_state() {
        for (error_state, origin) in [
            (ProvisioningState::ValidationError, ProvisioningState::Ready),
            (
                ProvisioningState::ProvisioningError,
                ProvisioningState::Provisioning,
            ),
        ] {
            let mut c = ctx(error_state);
            c.spec_generation = 2;
            c.observed_generation = 1;
            let next = apply(&c, PlannedOperation::None, None);
            assert_eq!(next.state, origin);
            assert!(next.error_message.is_empty());
            assert_eq!(next.directive, Directive::RequeueAfter(Duration::ZERO));
        }
    }

    #[test]
    fn error_message_empty_iff_error_state() {
        // Walk a sample of transitions and check the invariant on each.
        let cases: Vec<Transition> = vec![
            apply(
                &ctx(ProvisioningState::Registering),
                PlannedOperation::ValidateManagementAccess,
                Some(&Outcome::done()),
            ),
            apply(
                &ctx(ProvisioningState::Registering),
                PlannedOperation::ValidateManagementAccess,
                Some(&Outcome::failed(ProvisionerError::Operation(
                    "nope".to_string(),
                ))),
            ),
            apply(
                &ctx(ProvisioningState::Inspecting),
                PlannedOperation::InspectHardware,
                Some(&Outcome::done()),
            ),
            apply(
                &ctx(ProvisioningState::Provisioning),
                PlannedOperation::Provision,
                Some(&Outcome::failed(ProvisionerError::InvalidImage(
                    "bad".to_string(),
                ))),
            ),
        ];
        for t in cases {
            assert_eq!(
                t.state.is_error(),
                !t.error_message.is_empty(),
                "invariant broken for {:?}",
                t.state
            );
        }
    }
}
