//! # Workload
//!
//! One pod backing an echo instance.

use crate::echo::call::{CallOptions, ParsedResponses};
use crate::echo::client::{EchoClient, EchoClientFactory};
use crate::error::HarnessError;
use k8s_openapi::api::core::v1::EndpointAddress;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A discovered pod endpoint
///
/// Owned by its instance. Clones share the same echo client.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pod_name: String,
    address: String,
    grpc_port: u16,
    #[serde(skip)]
    client: Option<Arc<dyn EchoClient>>,
}

impl Workload {
    /// Build a workload for `address`, connecting an echo client when a
    /// factory is configured
    pub async fn connect(
        address: &EndpointAddress,
        grpc_port: u16,
        clients: Option<&Arc<dyn EchoClientFactory>>,
    ) -> Result<Self, HarnessError> {
        let pod_name = pod_name(address);
        let client = match clients {
            Some(factory) => Some(factory.connect(address, grpc_port).await?),
            None => None,
        };
        debug!(
            pod = %pod_name,
            ip = %address.ip,
            grpc_port,
            has_client = client.is_some(),
            "Workload connected"
        );
        Ok(Self {
            pod_name,
            address: address.ip.clone(),
            grpc_port,
            client,
        })
    }

    #[must_use]
    pub fn pod_name(&self) -> &str {
        &self.pod_name
    }

    /// Pod IP
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn grpc_port(&self) -> u16 {
        self.grpc_port
    }

    pub async fn call(&self, opts: &CallOptions) -> Result<ParsedResponses, HarnessError> {
        match &self.client {
            Some(client) => client.call(opts).await,
            None => Err(HarnessError::NoEchoClient {
                pod: self.pod_name.clone(),
            }),
        }
    }

    pub async fn close(&self) -> Result<(), HarnessError> {
        match &self.client {
            Some(client) => client.close().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workload")
            .field("pod_name", &self.pod_name)
            .field("address", &self.address)
            .field("grpc_port", &self.grpc_port)
            .field("has_client", &self.client.is_some())
            .finish()
    }
}

/// Pod name from the endpoint's target reference, falling back to the IP
fn pod_name(address: &EndpointAddress) -> String {
    address
        .target_ref
        .as_ref()
        .and_then(|r| r.name.clone())
        .or_else(|| address.hostname.clone())
        .unwrap_or_else(|| address.ip.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ObjectReference;

    fn address(ip: &str, pod: Option<&str>) -> EndpointAddress {
        EndpointAddress {
            ip: ip.to_string(),
            target_ref: pod.map(|name| ObjectReference {
                kind: Some("Pod".to_string()),
                name: Some(name.to_string()),
                ..ObjectReference::default()
            }),
            ..EndpointAddress::default()
        }
    }

    #[tokio::test]
    async fn test_connect_without_factory_has_no_client() {
        let workload = Workload::connect(&address("10.0.0.7", Some("a-v1-abc")), 7070, None)
            .await
            .unwrap();

        assert_eq!(workload.pod_name(), "a-v1-abc");
        assert_eq!(workload.address(), "10.0.0.7");
        assert_eq!(workload.grpc_port(), 7070);
        assert!(workload.close().await.is_ok());
    }

    #[test]
    fn test_pod_name_falls_back_to_ip() {
        assert_eq!(pod_name(&address("10.0.0.9", None)), "10.0.0.9");
    }
}
