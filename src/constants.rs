//! # Constants
//!
//! Shared constants used throughout the harness.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Port the echo container uses for its TCP health check
pub const TCP_HEALTH_PORT: u16 = 3333;

/// Port the echo container uses for its HTTP readiness probe
pub const HTTP_READINESS_PORT: u16 = 8080;

/// Cluster DNS domain appended to `service.namespace`
pub const DEFAULT_DOMAIN: &str = "svc.cluster.local";

/// Service name used when the config does not set one
pub const DEFAULT_SERVICE: &str = "echo";

/// Version label used when the config does not set one
pub const DEFAULT_VERSION: &str = "v1";

/// Name given to the gRPC command port when one has to be added
pub const DEFAULT_GRPC_PORT_NAME: &str = "grpc";

/// First service port handed out to ports that leave it unset
pub const SERVICE_PORT_BASE: u16 = 1;

/// First instance (container) port handed out to ports that leave it unset
pub const INSTANCE_PORT_BASE: u16 = 10_000;

/// How long to wait for a service to get ready endpoints (seconds)
pub const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 300;

/// First delay between endpoint readiness polls (milliseconds)
pub const DEFAULT_POLL_START_MS: u64 = 500;

/// Upper bound for the delay between endpoint readiness polls (milliseconds)
pub const DEFAULT_POLL_MAX_MS: u64 = 5_000;

/// Field manager used for server-side apply
pub const DEFAULT_FIELD_MANAGER: &str = "echo-harness";
