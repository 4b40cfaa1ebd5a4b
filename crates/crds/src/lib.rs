//! MetalOps CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the bare-metal controllers.

pub mod bare_metal_host;

pub use bare_metal_host::*;
