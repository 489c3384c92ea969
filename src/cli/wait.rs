//! # Wait Command
//!
//! Attaches to deployed echo services and initializes them as one batch, so
//! every service that has no ready pods is reported together.

use crate::output::InstanceReport;
use anyhow::{Context, Result};
use echo_harness::prelude::{EchoConfig, EchoInstance, Environment, ensure_initialized};

pub async fn wait_command(
    env: &Environment,
    namespace: &str,
    services: &[String],
) -> Result<Vec<InstanceReport>> {
    let mut instances = Vec::with_capacity(services.len());
    for service in services {
        let instance = EchoInstance::attach(env, EchoConfig::new(namespace, service.as_str()))
            .await
            .with_context(|| format!("Failed to attach to service {namespace}/{service}"))?;
        instances.push(instance);
    }

    ensure_initialized(&instances)
        .await
        .context("Echo services did not become ready")?;

    let mut reports = Vec::with_capacity(instances.len());
    for instance in &instances {
        reports.push(InstanceReport::collect(instance).await?);
    }
    Ok(reports)
}
