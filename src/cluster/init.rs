//! # Batch Initialization
//!
//! Discovers the workloads of many echo instances at once.
//!
//! Discovery runs as one task per uninitialized instance and every task runs
//! to completion, so a failing run reports all broken services together. The
//! batch commits only if every discovery succeeded: one failure leaves every
//! instance of the batch uninitialized.
//!
//! A call never discovers while another caller is initializing one of its
//! instances. It releases its own claims, waits for that caller, and starts
//! over, so each call commits either all of its instances or none of them.

use crate::cluster::accessor::ready_addresses;
use crate::cluster::instance::{Claim, EchoInstance, InitClaim};
use crate::echo::{Instance, Workload};
use crate::error::{AggregateError, HarnessError};
use crate::observability::metrics;
use futures::future::join_all;
use k8s_openapi::api::core::v1::EndpointAddress;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Make sure every instance has its workloads
///
/// Instances that are already initialized are skipped. Instances that
/// another caller is initializing are waited for, and picked up by this call
/// if that attempt fails. On error this call has committed no instance.
pub async fn ensure_initialized(instances: &[EchoInstance]) -> Result<(), HarnessError> {
    loop {
        let mut claimed: Vec<InitClaim<'_>> = Vec::new();
        let mut in_flight = None;
        for instance in instances {
            if claimed.iter().any(|c| c.instance().ptr_eq(instance)) {
                continue;
            }
            match instance.claim() {
                Claim::Ready => {}
                Claim::Claimed(claim) => claimed.push(claim),
                Claim::InFlight(done) => {
                    in_flight = Some((instance, done));
                    break;
                }
            }
        }

        match in_flight {
            None if claimed.is_empty() => return Ok(()),
            None => return initialize_batch(claimed).await,
            Some((instance, done)) => {
                // Released claims revert to Uninitialized and wake their waiters.
                drop(claimed);
                debug!(
                    service = %instance.config().service,
                    namespace = %instance.config().namespace,
                    "Waiting for echo instance initialized by another caller"
                );
                done.await;
            }
        }
    }
}

/// Discover, connect and commit the claimed instances together
async fn initialize_batch(claimed: Vec<InitClaim<'_>>) -> Result<(), HarnessError> {
    let started = Instant::now();
    let discovered = discover_all(&claimed).await;
    metrics::observe_batch_duration(started.elapsed().as_secs_f64());

    let addresses = match discovered {
        Ok(addresses) => addresses,
        Err(errors) => {
            metrics::increment_discovery_errors(errors.len());
            warn!(
                instances = claimed.len(),
                failed = errors.len(),
                "Endpoint discovery failed; no instance in the batch was initialized"
            );
            // Dropping the claims resets every instance of the batch.
            return Err(errors.into());
        }
    };

    let workloads = match connect_all(&claimed, &addresses).await {
        Ok(workloads) => workloads,
        Err(e) => {
            warn!(
                error = %e,
                "Failed to connect workloads; no instance in the batch was initialized"
            );
            return Err(e);
        }
    };

    let count = claimed.len();
    for (claim, workloads) in claimed.into_iter().zip(workloads) {
        claim.commit(workloads);
    }
    info!(
        instances = count,
        elapsed_ms = started.elapsed().as_millis(),
        "Initialized echo instances"
    );
    Ok(())
}

/// Wait for ready endpoints of every claimed instance in parallel
///
/// Returns the ready addresses in claim order, or every failure.
async fn discover_all(
    claimed: &[InitClaim<'_>],
) -> Result<Vec<Vec<EndpointAddress>>, AggregateError> {
    let mut tasks = JoinSet::new();
    let mut task_index = HashMap::with_capacity(claimed.len());
    for (index, claim) in claimed.iter().enumerate() {
        let instance = claim.instance();
        let accessor = Arc::clone(instance.environment().accessor());
        let cfg = instance.config().clone();

        metrics::increment_discoveries();
        let handle = tasks.spawn(async move {
            let result = match accessor
                .wait_until_endpoints_ready(&cfg.namespace, &cfg.service)
                .await
            {
                Ok(endpoints) => {
                    let addresses = ready_addresses(&endpoints);
                    if addresses.is_empty() {
                        Err(HarnessError::NoPods {
                            namespace: cfg.namespace.clone(),
                            service: cfg.service.clone(),
                            version: cfg.version.clone(),
                        })
                    } else {
                        debug!(
                            service = %cfg.service,
                            namespace = %cfg.namespace,
                            pods = addresses.len(),
                            "Discovered endpoints"
                        );
                        Ok(addresses)
                    }
                }
                Err(e) => Err(e),
            };
            (index, result)
        });
        task_index.insert(handle.id(), index);
    }

    let mut results: Vec<Option<Result<Vec<EndpointAddress>, HarnessError>>> =
        (0..claimed.len()).map(|_| None).collect();
    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((_, (index, result))) => results[index] = Some(result),
            Err(e) => {
                warn!(error = %e, "Endpoint discovery task did not complete");
                if let Some(&index) = task_index.get(&e.id()) {
                    let cfg = claimed[index].instance().config();
                    results[index] = Some(Err(HarnessError::DiscoveryAborted {
                        namespace: cfg.namespace.clone(),
                        service: cfg.service.clone(),
                        message: e.to_string(),
                    }));
                }
            }
        }
    }

    let mut addresses = Vec::with_capacity(claimed.len());
    let mut errors = AggregateError::new();
    for (claim, result) in claimed.iter().zip(results) {
        match result {
            Some(Ok(found)) => addresses.push(found),
            Some(Err(e)) => errors.push(e),
            None => {
                let cfg = claim.instance().config();
                errors.push(HarnessError::DiscoveryAborted {
                    namespace: cfg.namespace.clone(),
                    service: cfg.service.clone(),
                    message: "worker task reported no result".to_string(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(addresses)
    } else {
        Err(errors)
    }
}

/// Build the workloads of every claimed instance before any commit
///
/// On failure the workloads built so far are closed.
async fn connect_all(
    claimed: &[InitClaim<'_>],
    addresses: &[Vec<EndpointAddress>],
) -> Result<Vec<Vec<Workload>>, HarnessError> {
    let mut built: Vec<Vec<Workload>> = Vec::with_capacity(claimed.len());
    for (claim, found) in claimed.iter().zip(addresses) {
        let instance = claim.instance();
        let mut workloads = Vec::with_capacity(found.len());
        for address in found {
            match Workload::connect(
                address,
                instance.grpc_port(),
                instance.environment().clients(),
            )
            .await
            {
                Ok(workload) => workloads.push(workload),
                Err(e) => {
                    built.push(workloads);
                    close_all(&built).await;
                    return Err(e);
                }
            }
        }
        built.push(workloads);
    }
    Ok(built)
}

async fn close_all(built: &[Vec<Workload>]) {
    let workloads: Vec<&Workload> = built.iter().flatten().collect();
    let results = join_all(workloads.iter().map(|w| w.close())).await;
    for (workload, result) in workloads.iter().zip(results) {
        if let Err(e) = result {
            warn!(
                pod = %workload.pod_name(),
                error = %e,
                "Failed to close workload of an aborted batch"
            );
        }
    }
}
