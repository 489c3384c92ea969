//! # Cluster Accessor
//!
//! The three cluster operations echo instances need: apply a manifest, look
//! up a Service, and wait for a Service's endpoints to become ready.
//!
//! [`KubeAccessor`] implements them over a `kube::Client`. Tests substitute
//! their own implementation of [`ClusterAccessor`].

use crate::backoff::FibonacciBackoff;
use crate::config::HarnessConfig;
use crate::error::HarnessError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{EndpointAddress, Endpoints, Service};
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::core::GroupVersion;
use kube::discovery::{self, Scope};
use kube::Client;
use serde::Deserialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Cluster operations used by echo instances
#[async_trait]
pub trait ClusterAccessor: Send + Sync {
    /// Apply every object of a (multi-document) YAML manifest
    async fn apply_contents(&self, namespace: &str, manifest: &str) -> Result<(), HarnessError>;

    /// Look up a Service
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, HarnessError>;

    /// Block until the Service has at least one ready endpoint address
    ///
    /// Retries internally and fails only once its own timeout expires.
    async fn wait_until_endpoints_ready(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Endpoints, HarnessError>;
}

/// Ready addresses across all subsets, in subset order
#[must_use]
pub fn ready_addresses(endpoints: &Endpoints) -> Vec<EndpointAddress> {
    endpoints
        .subsets
        .iter()
        .flatten()
        .flat_map(|subset| subset.addresses.iter().flatten().cloned())
        .collect()
}

/// Split a manifest into objects, skipping empty documents
pub fn parse_manifest(manifest: &str) -> Result<Vec<DynamicObject>, HarnessError> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(manifest) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        let object: DynamicObject = serde_yaml::from_value(value)?;
        if object.types.is_none() {
            return Err(HarnessError::Manifest(
                "document is missing apiVersion or kind".to_string(),
            ));
        }
        if object.metadata.name.is_none() {
            return Err(HarnessError::Manifest(
                "document is missing metadata.name".to_string(),
            ));
        }
        objects.push(object);
    }
    Ok(objects)
}

/// [`ClusterAccessor`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeAccessor {
    client: Client,
    config: HarnessConfig,
}

impl std::fmt::Debug for KubeAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeAccessor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl KubeAccessor {
    #[must_use]
    pub fn new(client: Client, config: HarnessConfig) -> Self {
        Self { client, config }
    }

    async fn apply_object(
        &self,
        namespace: &str,
        mut object: DynamicObject,
    ) -> Result<(), HarnessError> {
        let types = object
            .types
            .clone()
            .ok_or_else(|| HarnessError::Manifest("document is missing apiVersion or kind".to_string()))?;
        let name = object
            .metadata
            .name
            .clone()
            .ok_or_else(|| HarnessError::Manifest("document is missing metadata.name".to_string()))?;
        let gvk = types
            .api_version
            .parse::<GroupVersion>()
            .map_err(|e| HarnessError::Manifest(format!("bad apiVersion '{}': {e}", types.api_version)))?
            .with_kind(&types.kind);

        let (resource, capabilities) = discovery::pinned_kind(&self.client, &gvk).await?;
        let api: Api<DynamicObject> = if matches!(capabilities.scope, Scope::Namespaced) {
            object.metadata.namespace = Some(namespace.to_string());
            Api::namespaced_with(self.client.clone(), namespace, &resource)
        } else {
            Api::all_with(self.client.clone(), &resource)
        };

        api.patch(
            &name,
            &PatchParams::apply(&self.config.field_manager).force(),
            &Patch::Apply(&object),
        )
        .await
        .map_err(|source| HarnessError::Deploy {
            namespace: namespace.to_string(),
            kind: types.kind.clone(),
            name: name.clone(),
            source,
        })?;

        info!(
            kind = %types.kind,
            name = %name,
            namespace = %namespace,
            "Applied manifest object"
        );
        Ok(())
    }
}

#[async_trait]
impl ClusterAccessor for KubeAccessor {
    async fn apply_contents(&self, namespace: &str, manifest: &str) -> Result<(), HarnessError> {
        for object in parse_manifest(manifest)? {
            self.apply_object(namespace, object).await?;
        }
        Ok(())
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, HarnessError> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        services
            .get_opt(name)
            .await?
            .ok_or_else(|| HarnessError::ServiceNotFound {
                namespace: namespace.to_string(),
                service: name.to_string(),
            })
    }

    async fn wait_until_endpoints_ready(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Endpoints, HarnessError> {
        let endpoints: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
        let timeout = self.config.readiness_timeout();
        let deadline = Instant::now() + timeout;
        let mut backoff = FibonacciBackoff::new(self.config.poll_start(), self.config.poll_max());

        loop {
            let observation = match endpoints.get_opt(name).await {
                Ok(Some(ep)) => {
                    let ready = ready_addresses(&ep).len();
                    if ready > 0 {
                        info!(
                            service = %name,
                            namespace = %namespace,
                            ready,
                            "Service endpoints are ready"
                        );
                        return Ok(ep);
                    }
                    "endpoints have no ready addresses".to_string()
                }
                Ok(None) => "endpoints not found".to_string(),
                Err(e) => {
                    warn!(
                        service = %name,
                        namespace = %namespace,
                        error = %e,
                        "Failed to read endpoints, will retry"
                    );
                    format!("API error: {e}")
                }
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(HarnessError::EndpointsTimeout {
                    namespace: namespace.to_string(),
                    service: name.to_string(),
                    timeout_secs: timeout.as_secs(),
                    last_observation: observation,
                });
            }

            let delay = backoff.next_delay().min(deadline - now);
            debug!(
                service = %name,
                namespace = %namespace,
                observation = %observation,
                delay_ms = delay.as_millis(),
                "Endpoints not ready yet"
            );
            sleep(delay).await;
        }
    }
}
