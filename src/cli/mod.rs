//! # echoctl
//!
//! Command-line front end for the echo harness.
//!
//! ## Usage
//!
//! ```bash
//! # Deploy an echo service from a rendered manifest and wait for its pods
//! echoctl deploy --namespace echo-1 --service a --manifest a.yaml \
//!     --port http:HTTP:80:8090 --port grpc:GRPC
//!
//! # Discover several already deployed services as one batch
//! echoctl wait --namespace echo-1 a b c
//!
//! # Machine readable output
//! echoctl wait --namespace echo-1 a --output json
//! ```

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use echo_harness::config::HarnessConfig;
use echo_harness::echo::{Port, Protocol};
use echo_harness::observability::{logging, metrics};
use echo_harness::prelude::Environment;
use kube::Client;
use std::path::PathBuf;
use tracing::{debug, info};

mod deploy;
mod output;
mod wait;

/// Echo workload harness CLI
#[derive(Parser)]
#[command(name = "echoctl")]
#[command(
    about = "Deploy echo test services and wait for their workloads",
    long_about = None,
    after_help = "\
Port format:
  NAME:PROTOCOL[:SERVICE_PORT[:INSTANCE_PORT]]
  Protocols: HTTP, HTTP2, HTTPS, GRPC, TCP. Omitted ports are assigned.

Examples:
  echoctl deploy -n echo-1 --service a -f a.yaml --port http:HTTP:80
  echoctl wait -n echo-1 a b
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace of the echo services
    #[arg(short, long, global = true, default_value = "default")]
    namespace: String,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Print the harness metrics in Prometheus text format when done
    #[arg(long, global = true)]
    print_metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply an echo service manifest and wait until its pods are ready
    Deploy {
        /// Service name (default: echo)
        #[arg(long)]
        service: Option<String>,

        /// Version label of the pods (default: v1)
        #[arg(long)]
        version: Option<String>,

        /// The service has no ClusterIP
        #[arg(long)]
        headless: bool,

        /// Port exposed by the service, repeatable
        #[arg(
            long = "port",
            value_name = "NAME:PROTOCOL[:SERVICE_PORT[:INSTANCE_PORT]]",
            value_parser = parse_port
        )]
        ports: Vec<Port>,

        /// Rendered manifest to apply
        #[arg(short = 'f', long, value_name = "FILE")]
        manifest: PathBuf,
    },
    /// Attach to deployed echo services and initialize them together
    Wait {
        /// Service names
        #[arg(value_name = "SERVICE", required = true)]
        services: Vec<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    // rustls needs a process-wide provider before the kube client is built
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    let cli = Cli::parse();

    let config = HarnessConfig::from_env();
    logging::init_tracing(&config.log_level);
    metrics::register_metrics().context("Failed to register metrics")?;
    debug!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("BUILD_GIT_HASH"),
        built = env!("BUILD_TIMESTAMP"),
        "echoctl starting"
    );

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;
    let env = Environment::kube(client, config);

    let reports = match cli.command {
        Commands::Deploy {
            service,
            version,
            headless,
            ports,
            manifest,
        } => {
            deploy::deploy_command(
                &env,
                deploy::DeployArgs {
                    namespace: cli.namespace,
                    service,
                    version,
                    headless,
                    ports,
                    manifest,
                },
            )
            .await?
        }
        Commands::Wait { services } => {
            wait::wait_command(&env, &cli.namespace, &services).await?
        }
    };

    output::print_reports(&reports, cli.output)?;
    if cli.print_metrics {
        print!("{}", metrics::gather_text()?);
    }
    info!(instances = reports.len(), "Done");
    Ok(())
}

/// Parse `NAME:PROTOCOL[:SERVICE_PORT[:INSTANCE_PORT]]`
fn parse_port(value: &str) -> Result<Port> {
    let mut parts = value.split(':');
    let name = parts
        .next()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| anyhow!("port '{value}' has no name"))?;
    let protocol: Protocol = parts
        .next()
        .ok_or_else(|| anyhow!("port '{value}' has no protocol"))?
        .parse()?;

    let mut port = Port::new(name, protocol);
    if let Some(service_port) = parts.next() {
        port.service_port = service_port
            .parse()
            .with_context(|| format!("invalid service port in '{value}'"))?;
    }
    if let Some(instance_port) = parts.next() {
        port.instance_port = instance_port
            .parse()
            .with_context(|| format!("invalid instance port in '{value}'"))?;
    }
    if parts.next().is_some() {
        return Err(anyhow!("port '{value}' has too many fields"));
    }
    Ok(port)
}
