//! # Deploy Command
//!
//! Applies a rendered echo manifest and waits for the pods behind it.

use crate::output::InstanceReport;
use anyhow::{Context, Result};
use echo_harness::prelude::{EchoConfig, EchoInstance, Environment, Port, StaticManifest};
use std::path::PathBuf;
use tracing::info;

pub struct DeployArgs {
    pub namespace: String,
    pub service: Option<String>,
    pub version: Option<String>,
    pub headless: bool,
    pub ports: Vec<Port>,
    pub manifest: PathBuf,
}

pub async fn deploy_command(env: &Environment, args: DeployArgs) -> Result<Vec<InstanceReport>> {
    let contents = std::fs::read_to_string(&args.manifest)
        .with_context(|| format!("Failed to read manifest {}", args.manifest.display()))?;

    let mut cfg = EchoConfig::new(args.namespace, args.service.unwrap_or_default());
    cfg.version = args.version.unwrap_or_default();
    cfg.headless = args.headless;
    cfg.ports = args.ports;

    let instance = EchoInstance::deploy(env, cfg, &StaticManifest::new(contents))
        .await
        .context("Failed to deploy echo service")?;
    info!(instance = ?instance, "Waiting for echo workloads");
    instance
        .wait_until_ready(&[])
        .await
        .context("Echo service did not become ready")?;

    Ok(vec![InstanceReport::collect(&instance).await?])
}
