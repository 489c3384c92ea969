//! Common test utilities for echo harness integration tests
//!
//! Provides an in-memory cluster accessor and echo client factory so the
//! initialization logic can be exercised without a cluster.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use echo_harness::cluster::accessor::parse_manifest;
use echo_harness::observability::logging::init_tracing;
use echo_harness::prelude::*;
use k8s_openapi::api::core::v1::{
    EndpointAddress, EndpointSubset, Endpoints, ObjectReference, Service, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAMESPACE: &str = "echo";

#[derive(Clone, Default)]
struct MockService {
    cluster_ip: Option<String>,
    subnet: u8,
    pods: usize,
    delay: Duration,
    /// Discovery attempts that fail before the service reports its pods
    failures_remaining: usize,
    /// Discovery panics instead of answering
    panics: bool,
    discoveries: usize,
}

/// In-memory stand-in for a cluster
#[derive(Default)]
pub struct MockAccessor {
    services: Mutex<HashMap<String, MockService>>,
    applied: Mutex<Vec<(String, String)>>,
}

impl MockAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service with a ClusterIP and `pods` ready pods
    pub fn with_service(self, name: &str, pods: usize) -> Self {
        let ip = {
            let services = self.lock();
            format!("10.96.0.{}", services.len() + 10)
        };
        self.insert(name, Some(ip), pods)
    }

    pub fn with_headless_service(self, name: &str, pods: usize) -> Self {
        self.insert(name, Some("None".to_string()), pods)
    }

    /// Register a service whose ClusterIP is not set
    pub fn with_unaddressed_service(self, name: &str, pods: usize) -> Self {
        self.insert(name, None, pods)
    }

    pub fn with_delay(self, name: &str, delay: Duration) -> Self {
        self.update(name, |svc| svc.delay = delay);
        self
    }

    /// Fail the next `times` discoveries of the service
    pub fn with_failures(self, name: &str, times: usize) -> Self {
        self.update(name, |svc| svc.failures_remaining = times);
        self
    }

    pub fn with_panic(self, name: &str) -> Self {
        self.update(name, |svc| svc.panics = true);
        self
    }

    pub fn set_pods(&self, name: &str, pods: usize) {
        self.update(name, |svc| svc.pods = pods);
    }

    pub fn discovery_calls(&self, name: &str) -> usize {
        self.lock().get(name).map_or(0, |svc| svc.discoveries)
    }

    /// Manifests applied so far, as `(namespace, manifest)`
    pub fn applied(&self) -> Vec<(String, String)> {
        self.applied.lock().unwrap().clone()
    }

    fn insert(self, name: &str, cluster_ip: Option<String>, pods: usize) -> Self {
        {
            let mut services = self.lock();
            let subnet = u8::try_from(services.len() + 1).unwrap();
            services.insert(
                name.to_string(),
                MockService {
                    cluster_ip,
                    subnet,
                    pods,
                    ..MockService::default()
                },
            );
        }
        self
    }

    fn update(&self, name: &str, f: impl FnOnce(&mut MockService)) {
        let mut services = self.lock();
        let svc = services.get_mut(name).expect("service not registered");
        f(svc);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, MockService>> {
        self.services.lock().unwrap()
    }
}

#[async_trait]
impl ClusterAccessor for MockAccessor {
    async fn apply_contents(&self, namespace: &str, manifest: &str) -> Result<(), HarnessError> {
        parse_manifest(manifest)?;
        self.applied
            .lock()
            .unwrap()
            .push((namespace.to_string(), manifest.to_string()));
        Ok(())
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, HarnessError> {
        let svc = self
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| HarnessError::ServiceNotFound {
                namespace: namespace.to_string(),
                service: name.to_string(),
            })?;
        Ok(Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(ServiceSpec {
                cluster_ip: svc.cluster_ip,
                ..ServiceSpec::default()
            }),
            ..Service::default()
        })
    }

    async fn wait_until_endpoints_ready(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Endpoints, HarnessError> {
        let (delay, fail, svc) = {
            let mut services = self.lock();
            let svc = services
                .get_mut(name)
                .ok_or_else(|| HarnessError::ServiceNotFound {
                    namespace: namespace.to_string(),
                    service: name.to_string(),
                })?;
            svc.discoveries += 1;
            let fail = svc.failures_remaining > 0;
            if fail {
                svc.failures_remaining -= 1;
            }
            (svc.delay, fail, svc.clone())
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        assert!(!svc.panics, "endpoint watch for {name} crashed");
        if fail {
            return Err(HarnessError::EndpointsTimeout {
                namespace: namespace.to_string(),
                service: name.to_string(),
                timeout_secs: 1,
                last_observation: "no ready addresses".to_string(),
            });
        }
        Ok(endpoints(name, svc.subnet, svc.pods))
    }
}

/// Endpoints with `pods` ready addresses in `10.1.<subnet>.0/24`
pub fn endpoints(service: &str, subnet: u8, pods: usize) -> Endpoints {
    let addresses = (0..pods)
        .map(|i| EndpointAddress {
            ip: format!("10.1.{subnet}.{}", i + 1),
            target_ref: Some(ObjectReference {
                kind: Some("Pod".to_string()),
                name: Some(format!("{service}-v1-{i}")),
                ..ObjectReference::default()
            }),
            ..EndpointAddress::default()
        })
        .collect();
    Endpoints {
        metadata: ObjectMeta {
            name: Some(service.to_string()),
            ..ObjectMeta::default()
        },
        subsets: Some(vec![EndpointSubset {
            addresses: Some(addresses),
            ..EndpointSubset::default()
        }]),
    }
}

/// Echo client factory that records connects and closes
#[derive(Default)]
pub struct MockClients {
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
    fail_connect_to: Mutex<Option<String>>,
    close_error: bool,
    call_error: Option<String>,
}

impl MockClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to connect to the pod with this IP
    pub fn failing_connect_to(self, ip: &str) -> Self {
        *self.fail_connect_to.lock().unwrap() = Some(ip.to_string());
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.close_error = true;
        self
    }

    pub fn failing_calls(mut self, message: &str) -> Self {
        self.call_error = Some(message.to_string());
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EchoClientFactory for MockClients {
    async fn connect(
        &self,
        address: &EndpointAddress,
        _grpc_port: u16,
    ) -> Result<Arc<dyn EchoClient>, HarnessError> {
        if self.fail_connect_to.lock().unwrap().as_deref() == Some(address.ip.as_str()) {
            return Err(HarnessError::Client(format!(
                "connection to {} refused",
                address.ip
            )));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockClient {
            hostname: address
                .target_ref
                .as_ref()
                .and_then(|r| r.name.clone())
                .unwrap_or_default(),
            closes: Arc::clone(&self.closes),
            close_error: self.close_error,
            call_error: self.call_error.clone(),
        }))
    }
}

struct MockClient {
    hostname: String,
    closes: Arc<AtomicUsize>,
    close_error: bool,
    call_error: Option<String>,
}

#[async_trait]
impl EchoClient for MockClient {
    async fn call(&self, opts: &CallOptions) -> Result<ParsedResponses, HarnessError> {
        if let Some(message) = &self.call_error {
            return Err(HarnessError::Client(message.clone()));
        }
        let responses = (0..opts.count.max(1))
            .map(|i| ParsedResponse {
                id: i.to_string(),
                version: "v1".to_string(),
                code: "200".to_string(),
                hostname: self.hostname.clone(),
                url: format!("/{}", opts.path),
                ..ParsedResponse::default()
            })
            .collect::<Vec<_>>();
        Ok(ParsedResponses::from(responses))
    }

    async fn close(&self) -> Result<(), HarnessError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.close_error {
            return Err(HarnessError::Client(format!(
                "failed to close client of {}",
                self.hostname
            )));
        }
        Ok(())
    }
}

/// Environment backed by the mocks
pub fn environment(accessor: &Arc<MockAccessor>, clients: &Arc<MockClients>) -> Environment {
    init_tracing("warn");
    let accessor = Arc::clone(accessor) as Arc<dyn ClusterAccessor>;
    let clients = Arc::clone(clients) as Arc<dyn EchoClientFactory>;
    Environment::new(accessor, HarnessConfig::default()).with_clients(clients)
}

/// Attach to each named service in [`NAMESPACE`]
pub async fn attach_all(env: &Environment, services: &[&str]) -> Vec<EchoInstance> {
    let mut instances = Vec::new();
    for service in services {
        instances.push(
            EchoInstance::attach(env, EchoConfig::new(NAMESPACE, *service))
                .await
                .expect("attach should succeed"),
        );
    }
    instances
}
