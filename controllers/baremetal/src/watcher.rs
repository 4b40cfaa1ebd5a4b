//! Kubernetes resource watchers.
//!
//! Watches BareMetalHost resources for changes and triggers reconciliation
//! using kube_runtime::Controller.
//!
//! The watcher uses a generic `watch_resource()` helper that properly
//! handles the reconcile loop with automatic reconnection and retry logic.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::BareMetalHost;
use futures::StreamExt;
use kube::Api;
use kube_runtime::{
    controller::{Action, Config as ControllerConfig},
    watcher, Controller,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Generic watcher helper that uses kube_runtime::Controller properly.
///
/// - Controller handles automatic reconnection
/// - Retries and backoff are managed through the error policy
/// - Watching continues indefinitely (no one-shot behavior)
/// - All events (Apply, Delete, etc.) are processed
///
/// The reconcile_fn returns the scheduling `Action` the reconciler decided
/// on, so requeue delays flow straight from the state machine's directive.
async fn watch_resource<K, F>(
    api: Api<K>,
    reconciler: Arc<Reconciler>,
    reconcile_fn: F,
    resource_name: &str,
) -> Result<(), ControllerError>
where
    K: kube::Resource + Clone + Send + Sync + 'static + std::fmt::Debug + serde::de::DeserializeOwned,
    K::DynamicType: Default + std::cmp::Eq + std::hash::Hash + Clone + std::fmt::Debug + Unpin,
    F: Fn(Arc<Reconciler>, Arc<K>) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Action, ControllerError>> + Send>> + Send + Sync + Clone + 'static,
{
    info!("Starting {} watcher", resource_name);

    // Error policy: requeue with a flat delay on infrastructure errors;
    // provisioning failures never reach here (they are folded into status).
    let error_policy = |obj: Arc<K>, error: &ControllerError, _ctx: Arc<Reconciler>| {
        error!("Reconciliation error for {} {:?}: {}", resource_name, obj, error);
        Action::requeue(Duration::from_secs(60))
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let reconcile_fn = reconcile_fn.clone();
        let resource_name = resource_name.to_string();
        async move {
            debug!("Reconciling {} {:?}", resource_name, obj);

            match reconcile_fn(ctx, obj).await {
                Ok(action) => Ok(action),
                Err(e) => {
                    error!("Reconciliation failed for {}: {}", resource_name, e);
                    Err(e)
                }
            }
        }
    };

    // Debounce batches bursts of watch events (a spec edit immediately
    // followed by our own status write) into one reconciliation; the
    // concurrency cap bounds simultaneous BMC sessions.
    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(5))
        .concurrency(3);

    Controller::new(api, watcher::Config::default())
        .with_config(controller_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("Controller error for {}: {}", resource_name, e);
            }
        })
        .await;

    Ok(())
}

/// Watches BareMetalHost resources for changes.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    host_api: Api<BareMetalHost>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(reconciler: Arc<Reconciler>, host_api: Api<BareMetalHost>) -> Self {
        Self {
            reconciler,
            host_api,
        }
    }

    /// Starts watching BareMetalHost resources.
    pub async fn watch_bare_metal_hosts(&self) -> Result<(), ControllerError> {
        watch_resource(
            self.host_api.clone(),
            self.reconciler.clone(),
            |reconciler, resource| {
                Box::pin(async move { reconciler.reconcile_bare_metal_host(&resource).await })
            },
            "BareMetalHost",
        )
        .await
    }
}
