//! # Errors
//!
//! Error types returned by the harness.
//!
//! Batch operations never stop at the first failure; they collect every
//! cause into an [`AggregateError`] so a failing test run reports all broken
//! services at once.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// Missing or inconsistent echo configuration
    #[error("invalid echo config: {0}")]
    Config(String),

    /// A manifest could not be parsed into Kubernetes objects
    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("failed to parse manifest YAML: {0}")]
    ManifestYaml(#[from] serde_yaml::Error),

    /// Applying a manifest to the cluster failed
    #[error("failed to apply {kind} '{name}' to namespace {namespace}: {source}")]
    Deploy {
        namespace: String,
        kind: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("service {namespace}/{service} not found")]
    ServiceNotFound { namespace: String, service: String },

    #[error("invalid ClusterIP {cluster_ip} for non-headless service {namespace}/{service}")]
    InvalidClusterIp {
        cluster_ip: String,
        namespace: String,
        service: String,
    },

    #[error("timed out after {timeout_secs}s waiting for endpoints of service {namespace}/{service}: {last_observation}")]
    EndpointsTimeout {
        namespace: String,
        service: String,
        timeout_secs: u64,
        last_observation: String,
    },

    #[error("no pods found for service {namespace}/{service}/{version}")]
    NoPods {
        namespace: String,
        service: String,
        version: String,
    },

    #[error("echo instance {namespace}/{service} was closed before it became ready")]
    NotReady { namespace: String, service: String },

    /// A discovery worker panicked or was aborted
    #[error("discovery for service {namespace}/{service} did not complete: {message}")]
    DiscoveryAborted {
        namespace: String,
        service: String,
        message: String,
    },

    /// Failure reported by the echo client of a workload
    #[error("echo client error: {0}")]
    Client(String),

    #[error("workload {pod} has no echo client attached")]
    NoEchoClient { pod: String },

    /// A call failed; carries the call route for diagnostics
    #[error("failed calling {source_service}->'{protocol}://{target}:{port}/{path}': {source}")]
    Call {
        source_service: String,
        protocol: String,
        target: String,
        port: u16,
        path: String,
        #[source]
        source: Box<HarnessError>,
    },

    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// Several errors reported together
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<HarnessError>,
}

impl AggregateError {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: HarnessError) {
        self.errors.push(error);
    }

    #[must_use]
    pub fn errors(&self) -> &[HarnessError] {
        &self.errors
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when nothing was collected, the aggregate otherwise
    pub fn into_result(self) -> Result<(), HarnessError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::Aggregate(self))
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.errors.len() == 1 { "error" } else { "errors" };
        write!(f, "{} {} occurred:", self.errors.len(), noun)?;
        for error in &self.errors {
            write!(f, "\n\t* {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

impl Extend<HarnessError> for AggregateError {
    fn extend<I: IntoIterator<Item = HarnessError>>(&mut self, iter: I) {
        self.errors.extend(iter);
    }
}

impl FromIterator<HarnessError> for AggregateError {
    fn from_iter<I: IntoIterator<Item = HarnessError>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_pods(service: &str) -> HarnessError {
        HarnessError::NoPods {
            namespace: "echo".to_string(),
            service: service.to_string(),
            version: "v1".to_string(),
        }
    }

    #[test]
    fn test_empty_aggregate_is_ok() {
        assert!(AggregateError::new().into_result().is_ok());
    }

    #[test]
    fn test_aggregate_lists_every_cause() {
        let aggregate: AggregateError = vec![no_pods("a"), no_pods("b")].into_iter().collect();
        let message = HarnessError::from(aggregate).to_string();

        assert!(message.starts_with("2 errors occurred:"), "got: {message}");
        assert!(message.contains("no pods found for service echo/a/v1"));
        assert!(message.contains("no pods found for service echo/b/v1"));
    }

    #[test]
    fn test_single_cause_uses_singular() {
        let mut aggregate = AggregateError::new();
        aggregate.push(no_pods("a"));
        assert_eq!(
            aggregate.to_string(),
            "1 error occurred:\n\t* no pods found for service echo/a/v1"
        );
    }

    #[test]
    fn test_call_error_carries_route() {
        let err = HarnessError::Call {
            source_service: "a".to_string(),
            protocol: "http".to_string(),
            target: "b".to_string(),
            port: 80,
            path: "health".to_string(),
            source: Box::new(HarnessError::Client("connection refused".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "failed calling a->'http://b:80/health': echo client error: connection refused"
        );
    }
}
