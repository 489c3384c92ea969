//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use echo_harness::prelude::*;
//! ```

// Echo model
pub use crate::echo::{
    CallOptions, EchoClient, EchoClientFactory, EchoConfig, Instance, ParsedResponse,
    ParsedResponses, Port, Protocol, ResourceId, Workload,
};

// Cluster side
pub use crate::cluster::{
    ensure_initialized, ClusterAccessor, EchoInstance, Environment, KubeAccessor,
    ManifestRenderer, StaticManifest,
};

// Config and errors
pub use crate::config::HarnessConfig;
pub use crate::error::{AggregateError, HarnessError};
