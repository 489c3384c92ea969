//! # Echo Instance
//!
//! An echo service deployed into (or found in) a cluster.
//!
//! Workloads are discovered lazily. Each instance moves through
//! `Uninitialized -> Initializing -> Ready`; [`EchoInstance::close`] returns
//! it to `Uninitialized`. The state lives behind the instance's own mutex,
//! which is never held across an `.await`.

use crate::cluster::environment::Environment;
use crate::cluster::init::ensure_initialized;
use crate::cluster::manifest::ManifestRenderer;
use crate::echo::{CallOptions, EchoConfig, Instance, ParsedResponses, ResourceId, Workload};
use crate::error::{AggregateError, HarnessError};
use crate::observability::metrics;
use async_trait::async_trait;
use futures::future::join_all;
use k8s_openapi::api::core::v1::Service;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// ClusterIP value Kubernetes reports for headless services
const CLUSTER_IP_NONE: &str = "None";

pub(crate) enum InitState {
    Uninitialized,
    Initializing,
    Ready(Vec<Workload>),
}

/// Outcome of trying to start initialization of one instance
pub(crate) enum Claim<'a> {
    /// Already initialized
    Ready,
    /// This caller now owns initialization
    Claimed(InitClaim<'a>),
    /// Another caller is initializing; resolves when it finishes
    InFlight(Notified<'a>),
}

/// Exclusive right to initialize one instance
///
/// Dropping the claim without committing puts the instance back to
/// `Uninitialized` and wakes everyone waiting on it.
pub(crate) struct InitClaim<'a> {
    instance: &'a EchoInstance,
    committed: bool,
}

impl InitClaim<'_> {
    pub(crate) fn instance(&self) -> &EchoInstance {
        self.instance
    }

    pub(crate) fn commit(mut self, workloads: Vec<Workload>) {
        let count = workloads.len();
        self.instance.set_state(InitState::Ready(workloads));
        self.committed = true;
        metrics::add_active_workloads(count);
        debug!(
            service = %self.instance.inner.cfg.service,
            namespace = %self.instance.inner.cfg.namespace,
            workloads = count,
            "Echo instance ready"
        );
    }
}

impl Drop for InitClaim<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.instance.set_state(InitState::Uninitialized);
        }
    }
}

struct Inner {
    id: ResourceId,
    cfg: EchoConfig,
    cluster_ip: String,
    grpc_port: u16,
    env: Environment,
    state: Mutex<InitState>,
    state_changed: Notify,
}

/// Handle to a deployed echo service
///
/// Cheap to clone; clones share identity and workloads.
#[derive(Clone)]
pub struct EchoInstance {
    inner: Arc<Inner>,
}

impl EchoInstance {
    /// Render, apply and look up a new echo service
    pub async fn deploy(
        env: &Environment,
        mut cfg: EchoConfig,
        renderer: &dyn ManifestRenderer,
    ) -> Result<Self, HarnessError> {
        cfg.fill_in_defaults(&env.config().domain)?;
        let grpc_port = command_port(&cfg)?;

        let manifest = renderer.render(&cfg)?;
        env.accessor()
            .apply_contents(&cfg.namespace, &manifest)
            .await?;

        let instance = Self::from_service(env, cfg, grpc_port).await?;
        info!(
            id = %instance.inner.id,
            service = %instance.inner.cfg.service,
            namespace = %instance.inner.cfg.namespace,
            cluster_ip = %instance.inner.cluster_ip,
            "Deployed echo instance"
        );
        Ok(instance)
    }

    /// Track an echo service that is already deployed
    pub async fn attach(env: &Environment, mut cfg: EchoConfig) -> Result<Self, HarnessError> {
        cfg.fill_in_defaults(&env.config().domain)?;
        let grpc_port = command_port(&cfg)?;
        Self::from_service(env, cfg, grpc_port).await
    }

    async fn from_service(
        env: &Environment,
        cfg: EchoConfig,
        grpc_port: u16,
    ) -> Result<Self, HarnessError> {
        let service = env
            .accessor()
            .get_service(&cfg.namespace, &cfg.service)
            .await?;
        let cluster_ip = resolve_cluster_ip(&service, &cfg)?;

        Ok(Self {
            inner: Arc::new(Inner {
                id: ResourceId::new(),
                cfg,
                cluster_ip,
                grpc_port,
                env: env.clone(),
                state: Mutex::new(InitState::Uninitialized),
                state_changed: Notify::new(),
            }),
        })
    }

    /// Port the echo client connects to on each pod
    #[must_use]
    pub fn grpc_port(&self) -> u16 {
        self.inner.grpc_port
    }

    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.inner.env
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        matches!(*self.lock_state(), InitState::Ready(_))
    }

    /// Initialize this instance and the outbound instances it will call,
    /// as a single batch
    pub async fn wait_until_ready(&self, outbound: &[EchoInstance]) -> Result<(), HarnessError> {
        let mut batch = Vec::with_capacity(outbound.len() + 1);
        batch.push(self.clone());
        batch.extend(outbound.iter().cloned());
        ensure_initialized(&batch).await
    }

    /// Same handle, same underlying instance
    #[must_use]
    pub fn ptr_eq(&self, other: &EchoInstance) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn claim(&self) -> Claim<'_> {
        let mut state = self.lock_state();
        match *state {
            InitState::Ready(_) => Claim::Ready,
            InitState::Initializing => Claim::InFlight(self.inner.state_changed.notified()),
            InitState::Uninitialized => {
                *state = InitState::Initializing;
                Claim::Claimed(InitClaim {
                    instance: self,
                    committed: false,
                })
            }
        }
    }

    fn set_state(&self, next: InitState) {
        *self.lock_state() = next;
        self.inner.state_changed.notify_waiters();
    }

    fn lock_state(&self) -> MutexGuard<'_, InitState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn ready_workloads(&self) -> Result<Vec<Workload>, HarnessError> {
        match &*self.lock_state() {
            InitState::Ready(workloads) => Ok(workloads.clone()),
            _ => Err(HarnessError::NotReady {
                namespace: self.inner.cfg.namespace.clone(),
                service: self.inner.cfg.service.clone(),
            }),
        }
    }
}

#[async_trait]
impl Instance for EchoInstance {
    fn id(&self) -> ResourceId {
        self.inner.id
    }

    fn config(&self) -> &EchoConfig {
        &self.inner.cfg
    }

    fn address(&self) -> &str {
        &self.inner.cluster_ip
    }

    async fn workloads(&self) -> Result<Vec<Workload>, HarnessError> {
        self.wait_until_ready(&[]).await?;
        self.ready_workloads()
    }

    async fn call(&self, opts: CallOptions) -> Result<ParsedResponses, HarnessError> {
        let workloads = self.workloads().await?;
        let Some(workload) = workloads.first() else {
            return Err(HarnessError::NotReady {
                namespace: self.inner.cfg.namespace.clone(),
                service: self.inner.cfg.service.clone(),
            });
        };

        workload.call(&opts).await.map_err(|err| match &opts.port {
            Some(port) => HarnessError::Call {
                source_service: self.inner.cfg.service.clone(),
                protocol: port.protocol.as_str().to_lowercase(),
                target: opts.target.config().service.clone(),
                port: port.service_port,
                path: opts.path.clone(),
                source: Box::new(err),
            },
            None => err,
        })
    }

    async fn close(&self) -> Result<(), HarnessError> {
        let workloads = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, InitState::Uninitialized) {
                InitState::Ready(workloads) => workloads,
                InitState::Initializing => {
                    // Leave an in-flight initialization to its owner.
                    *state = InitState::Initializing;
                    warn!(
                        service = %self.inner.cfg.service,
                        namespace = %self.inner.cfg.namespace,
                        "Close called while echo instance is initializing; nothing to close"
                    );
                    return Ok(());
                }
                InitState::Uninitialized => return Ok(()),
            }
        };
        metrics::remove_active_workloads(workloads.len());

        let results = join_all(workloads.iter().map(Workload::close)).await;
        let mut errors = AggregateError::new();
        for (workload, result) in workloads.iter().zip(results) {
            if let Err(e) = result {
                warn!(
                    pod = %workload.pod_name(),
                    error = %e,
                    "Failed to close workload"
                );
                errors.push(e);
            }
        }
        info!(
            service = %self.inner.cfg.service,
            namespace = %self.inner.cfg.namespace,
            workloads = workloads.len(),
            "Closed echo instance"
        );
        errors.into_result()
    }
}

impl fmt::Debug for EchoInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EchoInstance")
            .field("id", &self.inner.id)
            .field("namespace", &self.inner.cfg.namespace)
            .field("service", &self.inner.cfg.service)
            .field("cluster_ip", &self.inner.cluster_ip)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

/// Instance port of the gRPC command port
fn command_port(cfg: &EchoConfig) -> Result<u16, HarnessError> {
    cfg.grpc_port()
        .map(|p| p.instance_port)
        .ok_or_else(|| HarnessError::Config("unable to find GRPC command port".to_string()))
}

/// ClusterIP to record for the service
///
/// Headless services have none and are stored with an empty address; any
/// other service must have a real one.
fn resolve_cluster_ip(service: &Service, cfg: &EchoConfig) -> Result<String, HarnessError> {
    let cluster_ip = service
        .spec
        .as_ref()
        .and_then(|spec| spec.cluster_ip.clone())
        .unwrap_or_default();

    if cluster_ip.is_empty() || cluster_ip == CLUSTER_IP_NONE {
        if !cfg.headless {
            return Err(HarnessError::InvalidClusterIp {
                cluster_ip,
                namespace: cfg.namespace.clone(),
                service: cfg.service.clone(),
            });
        }
        return Ok(String::new());
    }
    Ok(cluster_ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ServiceSpec;

    fn service_with_ip(ip: Option<&str>) -> Service {
        Service {
            spec: Some(ServiceSpec {
                cluster_ip: ip.map(str::to_string),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        }
    }

    #[test]
    fn test_cluster_ip_kept_for_regular_service() {
        let cfg = EchoConfig::new("apps", "a");
        assert_eq!(
            resolve_cluster_ip(&service_with_ip(Some("10.96.0.12")), &cfg).unwrap(),
            "10.96.0.12"
        );
    }

    #[test]
    fn test_missing_cluster_ip_rejected_for_regular_service() {
        let cfg = EchoConfig::new("apps", "a");
        for ip in [None, Some(""), Some("None")] {
            let err = resolve_cluster_ip(&service_with_ip(ip), &cfg).unwrap_err();
            assert!(
                err.to_string()
                    .contains("for non-headless service apps/a"),
                "got: {err}"
            );
        }
    }

    #[test]
    fn test_headless_service_has_empty_address() {
        let mut cfg = EchoConfig::new("apps", "a");
        cfg.headless = true;
        assert_eq!(
            resolve_cluster_ip(&service_with_ip(Some("None")), &cfg).unwrap(),
            ""
        );
    }

    #[test]
    fn test_command_port_requires_grpc() {
        let cfg = EchoConfig::new("apps", "a");
        let err = command_port(&cfg).unwrap_err();
        assert_eq!(err.to_string(), "invalid echo config: unable to find GRPC command port");
    }
}
