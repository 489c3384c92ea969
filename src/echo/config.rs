//! # Echo Configuration
//!
//! Configuration of one echo service under test, plus the helpers that turn
//! a partial config into a deployable one.

use crate::constants::{
    DEFAULT_GRPC_PORT_NAME, DEFAULT_SERVICE, DEFAULT_VERSION, HTTP_READINESS_PORT,
    INSTANCE_PORT_BASE, SERVICE_PORT_BASE, TCP_HEALTH_PORT,
};
use crate::error::HarnessError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Application protocol spoken on a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "HTTP2")]
    Http2,
    #[serde(rename = "HTTPS")]
    Https,
    #[serde(rename = "GRPC")]
    Grpc,
    #[serde(rename = "TCP")]
    Tcp,
}

impl Protocol {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "HTTP",
            Protocol::Http2 => "HTTP2",
            Protocol::Https => "HTTPS",
            Protocol::Grpc => "GRPC",
            Protocol::Tcp => "TCP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HTTP" => Ok(Protocol::Http),
            "HTTP2" => Ok(Protocol::Http2),
            "HTTPS" => Ok(Protocol::Https),
            "GRPC" => Ok(Protocol::Grpc),
            "TCP" => Ok(Protocol::Tcp),
            other => Err(HarnessError::Config(format!("unknown protocol '{other}'"))),
        }
    }
}

/// A port exposed by the echo service
///
/// A zero port number means "assign one" and is filled in by
/// [`EchoConfig::fill_in_defaults`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub name: String,
    pub protocol: Protocol,
    /// Port on the Kubernetes Service
    #[serde(default)]
    pub service_port: u16,
    /// Port the echo container listens on
    #[serde(default)]
    pub instance_port: u16,
}

impl Port {
    pub fn new(name: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            name: name.into(),
            protocol,
            service_port: 0,
            instance_port: 0,
        }
    }

    #[must_use]
    pub fn with_service_port(mut self, port: u16) -> Self {
        self.service_port = port;
        self
    }

    #[must_use]
    pub fn with_instance_port(mut self, port: u16) -> Self {
        self.instance_port = port;
        self
    }
}

/// Configuration of one echo service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EchoConfig {
    pub namespace: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub version: String,
    /// Cluster DNS domain
    #[serde(default)]
    pub domain: String,
    /// Headless services have no ClusterIP
    #[serde(default)]
    pub headless: bool,
    #[serde(default)]
    pub ports: Vec<Port>,
}

impl EchoConfig {
    pub fn new(namespace: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            service: service.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: Port) -> Self {
        self.ports.push(port);
        self
    }

    /// Fill in defaults for any missing values and validate the result
    ///
    /// Adds a gRPC command port when none is configured, since workloads are
    /// driven through it, and assigns free service/instance port numbers to
    /// ports that leave them at zero.
    pub fn fill_in_defaults(&mut self, default_domain: &str) -> Result<(), HarnessError> {
        if self.namespace.trim().is_empty() {
            return Err(HarnessError::Config("namespace must be provided".to_string()));
        }
        if self.service.is_empty() {
            self.service = DEFAULT_SERVICE.to_string();
        }
        if self.version.is_empty() {
            self.version = DEFAULT_VERSION.to_string();
        }
        if self.domain.is_empty() {
            self.domain = default_domain.to_string();
        }

        let mut names = HashSet::new();
        for port in &self.ports {
            if port.name.is_empty() {
                return Err(HarnessError::Config(format!(
                    "port with protocol {} has no name",
                    port.protocol
                )));
            }
            if !names.insert(port.name.as_str()) {
                return Err(HarnessError::Config(format!(
                    "duplicate port name '{}'",
                    port.name
                )));
            }
        }

        if self.grpc_port().is_none() {
            self.ports
                .push(Port::new(DEFAULT_GRPC_PORT_NAME, Protocol::Grpc));
        }

        let mut service_ports = PortAllocator::new(
            SERVICE_PORT_BASE,
            self.ports.iter().map(|p| p.service_port),
        );
        let mut instance_ports = PortAllocator::new(
            INSTANCE_PORT_BASE,
            self.ports.iter().map(|p| p.instance_port),
        );
        for port in &mut self.ports {
            if port.service_port == 0 {
                port.service_port = service_ports.next_free()?;
            }
            if port.instance_port == 0 {
                port.instance_port = instance_ports.next_free()?;
            }
        }

        Ok(())
    }

    /// The port carrying gRPC echo commands, if any
    #[must_use]
    pub fn grpc_port(&self) -> Option<&Port> {
        self.ports.iter().find(|p| p.protocol == Protocol::Grpc)
    }

    /// Fully qualified service host name
    #[must_use]
    pub fn fqdn(&self) -> String {
        format!("{}.{}.{}", self.service, self.namespace, self.domain)
    }
}

/// Hands out unused port numbers counting up from a base
struct PortAllocator {
    next: u16,
    used: HashSet<u16>,
}

impl PortAllocator {
    fn new(base: u16, used: impl Iterator<Item = u16>) -> Self {
        Self {
            next: base,
            used: used.filter(|p| *p != 0).collect(),
        }
    }

    fn next_free(&mut self) -> Result<u16, HarnessError> {
        while self.used.contains(&self.next) {
            self.next = self
                .next
                .checked_add(1)
                .ok_or_else(|| HarnessError::Config("ran out of port numbers".to_string()))?;
        }
        let port = self.next;
        self.used.insert(port);
        Ok(port)
    }
}

/// A port declared on the echo container
///
/// Input for [`ManifestRenderer`](crate::cluster::ManifestRenderer)
/// implementations; see [`container_ports`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    pub name: String,
    pub protocol: Protocol,
    pub port: u16,
}

/// Convert ports to the container port list
///
/// Adds the HTTP readiness port and the TCP health port unless an
/// application port already occupies them with a matching protocol.
/// Renderers use this for the `containers[].ports` of the Deployment so the
/// pods expose the ports the readiness and liveness probes hit.
#[must_use]
pub fn container_ports(ports: &[Port]) -> Vec<ContainerPort> {
    let mut out = Vec::with_capacity(ports.len() + 2);
    let mut has_ready_port = false;
    let mut has_health_port = false;

    for p in ports {
        out.push(ContainerPort {
            name: p.name.clone(),
            protocol: p.protocol,
            port: p.instance_port,
        });

        match p.protocol {
            Protocol::Grpc => {}
            Protocol::Http => {
                if p.instance_port == HTTP_READINESS_PORT {
                    has_ready_port = true;
                }
            }
            _ => {
                if p.instance_port == TCP_HEALTH_PORT {
                    has_health_port = true;
                }
            }
        }
    }

    if !has_ready_port {
        out.push(ContainerPort {
            name: "http-readiness-port".to_string(),
            protocol: Protocol::Http,
            port: HTTP_READINESS_PORT,
        });
    }
    if !has_health_port {
        out.push(ContainerPort {
            name: "tcp-health-port".to_string(),
            protocol: Protocol::Tcp,
            port: TCP_HEALTH_PORT,
        });
    }
    out
}
