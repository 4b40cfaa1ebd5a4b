//! Renders the CRD manifests to stdout as YAML.
//!
//! Usage: `cargo run --bin crdgen > config/crds.yaml`

use crds::BareMetalHost;
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&BareMetalHost::crd())?);
    Ok(())
}
