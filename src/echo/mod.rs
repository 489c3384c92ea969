//! # Echo
//!
//! Environment-independent model of an echo service under test.
//!
//! - `config`: service configuration, port defaults and container ports
//! - `call`: call options and parsed responses
//! - `client`: echo RPC client interface
//! - `workload`: one pod backing an instance

pub mod call;
pub mod client;
pub mod config;
pub mod workload;

use crate::error::HarnessError;
use async_trait::async_trait;
use std::fmt;
use uuid::Uuid;

pub use call::{CallOptions, ParsedResponse, ParsedResponses};
pub use client::{EchoClient, EchoClientFactory};
pub use config::{container_ports, ContainerPort, EchoConfig, Port, Protocol};
pub use workload::Workload;

/// Identity of a deployed echo instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(Uuid);

impl ResourceId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "echo-{}", self.0)
    }
}

/// A deployed echo service that tests can inspect and call through
#[async_trait]
pub trait Instance: Send + Sync {
    fn id(&self) -> ResourceId;

    fn config(&self) -> &EchoConfig;

    /// Address other workloads use to reach the service; empty for headless
    /// services
    fn address(&self) -> &str;

    /// Pods backing the service, waiting for them if necessary
    async fn workloads(&self) -> Result<Vec<Workload>, HarnessError>;

    /// Send a call from this instance
    async fn call(&self, opts: CallOptions) -> Result<ParsedResponses, HarnessError>;

    /// Tear down the workloads; the instance can be initialized again later
    async fn close(&self) -> Result<(), HarnessError>;
}
