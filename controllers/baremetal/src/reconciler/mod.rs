//! Reconciliation logic for the BareMetalHost CRD.
//!
//! The `Reconciler` owns the collaborators one step needs: the host API,
//! the credential resolver, the status reporter, and the provisioner
//! factory. The decision logic itself lives in `crate::state_machine`;
//! this module is the glue that loads facts, invokes the backend, and
//! persists the result.

pub mod host;

use crate::backoff::FibonacciBackoff;
use crate::credentials::CredentialResolver;
use crate::status::StatusReporter;
use crds::BareMetalHost;
use k8s_openapi::api::core::v1::Secret;
use kube::Api;
use provisioner::ProvisionerFactory;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

/// Error backoff floor in seconds
const BACKOFF_MIN_SECONDS: u64 = 10;
/// Error backoff ceiling in seconds
const BACKOFF_MAX_SECONDS: u64 = 600;

/// Backoff state for a host
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(BACKOFF_MIN_SECONDS, BACKOFF_MAX_SECONDS),
            error_count: 0,
        }
    }
}

/// Per-host error backoff schedules (namespace/name -> BackoffState)
///
/// Entries are dropped when a host's finalizer is released, so the map
/// tracks only hosts that still exist.
#[derive(Debug, Default)]
struct BackoffTracker {
    states: Mutex<HashMap<String, BackoffState>>,
}

impl BackoffTracker {
    /// Next delay for a host, advancing its schedule
    fn next_delay(&self, resource_key: &str) -> Duration {
        match self.states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(BackoffState::new);
                state.error_count += 1;
                state.backoff.next_backoff()
            }
            Err(e) => {
                warn!("failed to lock backoff states: {}, using default backoff", e);
                Duration::from_secs(60)
            }
        }
    }

    /// Reset a host's schedule after a healthy step
    fn reset(&self, resource_key: &str) {
        if let Ok(mut states) = self.states.lock() {
            if let Some(state) = states.get_mut(resource_key) {
                state.error_count = 0;
                state.backoff.reset();
            }
        }
    }

    /// Drop a host's entry once the resource is gone
    fn clear(&self, resource_key: &str) {
        if let Ok(mut states) = self.states.lock() {
            states.remove(resource_key);
        }
    }

    /// Consecutive error count recorded for a host
    fn error_count(&self, resource_key: &str) -> u32 {
        self.states
            .lock()
            .ok()
            .and_then(|states| states.get(resource_key).map(|s| s.error_count))
            .unwrap_or(0)
    }

    #[cfg(test)]
    fn tracked_hosts(&self) -> usize {
        self.states.lock().map(|s| s.len()).unwrap_or(0)
    }
}

/// Reconciles BareMetalHost resources.
pub struct Reconciler {
    pub(crate) factory: ProvisionerFactory,
    pub(crate) host_api: Api<BareMetalHost>,
    pub(crate) credentials: CredentialResolver,
    pub(crate) status: StatusReporter,
    backoff: BackoffTracker,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    #[must_use]
    pub fn new(
        factory: ProvisionerFactory,
        host_api: Api<BareMetalHost>,
        secret_api: Api<Secret>,
    ) -> Self {
        Self {
            factory,
            credentials: CredentialResolver::new(secret_api),
            status: StatusReporter::new(host_api.clone()),
            host_api,
            backoff: BackoffTracker::default(),
        }
    }

    /// Next error backoff delay for a host, advancing its schedule
    pub(crate) fn next_error_backoff(&self, resource_key: &str) -> Duration {
        self.backoff.next_delay(resource_key)
    }

    /// Reset a host's backoff schedule after a healthy step
    pub(crate) fn reset_error_backoff(&self, resource_key: &str) {
        self.backoff.reset(resource_key);
    }

    /// Forget a host's backoff state entirely (the resource is gone)
    pub(crate) fn clear_error_backoff(&self, resource_key: &str) {
        self.backoff.clear(resource_key);
    }

    /// Consecutive error count recorded for a host
    pub(crate) fn error_count(&self, resource_key: &str) -> u32 {
        self.backoff.error_count(resource_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_advances_and_resets_per_host() {
        let tracker = BackoffTracker::default();
        assert_eq!(tracker.next_delay("default/a"), Duration::from_secs(10));
        assert_eq!(tracker.next_delay("default/a"), Duration::from_secs(10));
        assert_eq!(tracker.next_delay("default/a"), Duration::from_secs(20));
        assert_eq!(tracker.error_count("default/a"), 3);

        // Schedules are independent per host.
        assert_eq!(tracker.next_delay("default/b"), Duration::from_secs(10));

        tracker.reset("default/a");
        assert_eq!(tracker.error_count("default/a"), 0);
        assert_eq!(tracker.next_delay("default/a"), Duration::from_secs(10));
    }

    #[test]
    fn clearing_a_host_drops_its_entry() {
        let tracker = BackoffTracker::default();
        tracker.next_delay("default/a");
        tracker.next_delay("default/b");
        assert_eq!(tracker.tracked_hosts(), 2);

        tracker.clear("default/a");
        assert_eq!(tracker.tracked_hosts(), 1);

        // A re-created host starts a fresh schedule at the floor.
        assert_eq!(tracker.next_delay("default/a"), Duration::from_secs(10));
    }
}
