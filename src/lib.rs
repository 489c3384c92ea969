//! Echo Harness Library
//!
//! Deploys echo test services into a Kubernetes cluster, waits for their
//! pods to become ready and issues test calls through them.
//!
//! ## Quick Start
//!
//! ```rust
//! use echo_harness::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod backoff;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod echo;
pub mod error;
pub mod observability;
pub mod prelude;
