//! # Cluster
//!
//! Echo instances running in a Kubernetes cluster.
//!
//! - `accessor`: cluster operations (apply, service lookup, endpoint readiness)
//! - `environment`: accessor and echo client factory shared by instances
//! - `init`: batch initialization of instance workloads
//! - `instance`: a deployed echo service
//! - `manifest`: where deployment manifests come from

pub mod accessor;
pub mod environment;
pub mod init;
pub mod instance;
pub mod manifest;

pub use accessor::{ready_addresses, ClusterAccessor, KubeAccessor};
pub use environment::Environment;
pub use init::ensure_initialized;
pub use instance::EchoInstance;
pub use manifest::{ManifestRenderer, StaticManifest};
