//! # Environment
//!
//! What an echo instance needs from the world around it.

use crate::cluster::accessor::{ClusterAccessor, KubeAccessor};
use crate::config::HarnessConfig;
use crate::echo::client::EchoClientFactory;
use kube::Client;
use std::fmt;
use std::sync::Arc;

/// Shared handle to the cluster and the echo client factory
#[derive(Clone)]
pub struct Environment {
    accessor: Arc<dyn ClusterAccessor>,
    clients: Option<Arc<dyn EchoClientFactory>>,
    config: HarnessConfig,
}

impl Environment {
    pub fn new(accessor: Arc<dyn ClusterAccessor>, config: HarnessConfig) -> Self {
        Self {
            accessor,
            clients: None,
            config,
        }
    }

    /// Environment talking to a real cluster
    #[must_use]
    pub fn kube(client: Client, config: HarnessConfig) -> Self {
        let accessor = Arc::new(KubeAccessor::new(client, config.clone()));
        Self::new(accessor, config)
    }

    /// Attach echo clients to discovered workloads
    ///
    /// Without a factory, workloads only record pod addresses and calls fail.
    #[must_use]
    pub fn with_clients(mut self, clients: Arc<dyn EchoClientFactory>) -> Self {
        self.clients = Some(clients);
        self
    }

    #[must_use]
    pub fn accessor(&self) -> &Arc<dyn ClusterAccessor> {
        &self.accessor
    }

    #[must_use]
    pub fn clients(&self) -> Option<&Arc<dyn EchoClientFactory>> {
        self.clients.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("config", &self.config)
            .field("has_clients", &self.clients.is_some())
            .finish_non_exhaustive()
    }
}
