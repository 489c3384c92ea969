//! # Output
//!
//! Text and JSON rendering of initialized echo instances.

use crate::OutputFormat;
use anyhow::{Context, Result};
use echo_harness::prelude::{EchoInstance, Instance, Workload};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceReport {
    pub id: String,
    pub namespace: String,
    pub service: String,
    pub version: String,
    pub cluster_ip: String,
    pub workloads: Vec<Workload>,
}

impl InstanceReport {
    pub async fn collect(instance: &EchoInstance) -> Result<Self> {
        let cfg = instance.config();
        let workloads = instance
            .workloads()
            .await
            .with_context(|| format!("Failed to read workloads of {}/{}", cfg.namespace, cfg.service))?;
        Ok(Self {
            id: instance.id().to_string(),
            namespace: cfg.namespace.clone(),
            service: cfg.service.clone(),
            version: cfg.version.clone(),
            cluster_ip: instance.address().to_string(),
            workloads,
        })
    }
}

pub fn print_reports(reports: &[InstanceReport], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(reports).context("Failed to serialize output")?;
            println!("{json}");
        }
        OutputFormat::Text => {
            for report in reports {
                let address = if report.cluster_ip.is_empty() {
                    "headless"
                } else {
                    report.cluster_ip.as_str()
                };
                println!(
                    "{}/{} ({}) {}",
                    report.namespace, report.service, report.version, address
                );
                println!("  {:<40} {:<16} {:<6}", "POD", "IP", "GRPC");
                for workload in &report.workloads {
                    println!(
                        "  {:<40} {:<16} {:<6}",
                        workload.pod_name(),
                        workload.address(),
                        workload.grpc_port()
                    );
                }
            }
        }
    }
    Ok(())
}
