//! Hardware Provisioning Capability
//!
//! The abstraction the baremetal controller drives to perform slow,
//! host-specific out-of-band operations: validating management access,
//! inspecting hardware, deploying an image, power control, and backend
//! deregistration.
//!
//! Every operation is non-blocking-complete: it returns promptly with an
//! [`Outcome`] saying whether the operation finished, needs more time, or
//! failed. Long-running work is modelled as repeated short polls, never as
//! a blocking call held across a worker.
//!
//! # Example
//!
//! ```no_run
//! use provisioner::{HostHandle, BmcCredentials, ProvisionerFactory, ProvisionerKind};
//!
//! # async fn example() {
//! let factory = ProvisionerFactory::new(ProvisionerKind::Demo);
//! let handle = HostHandle {
//!     name: "node-0".to_string(),
//!     namespace: "default".to_string(),
//!     bmc_address: "ipmi://10.0.0.5".to_string(),
//! };
//! let creds = BmcCredentials {
//!     username: "admin".to_string(),
//!     password: "secret".to_string(),
//! };
//!
//! let prov = factory.provisioner_for(handle, creds);
//! let outcome = prov.validate_management_access().await;
//! assert!(outcome.complete);
//! # }
//! ```

pub mod demo;
pub mod error;
pub mod factory;
pub mod models;
#[path = "trait.rs"]
pub mod provisioner_trait;

pub use demo::DemoProvisioner;
pub use error::ProvisionerError;
pub use factory::{ProvisionerFactory, ProvisionerKind};
pub use models::*;
pub use provisioner_trait::Provisioner;
