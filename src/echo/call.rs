//! # Calls
//!
//! Options for a call issued from one echo instance to another, and the
//! responses the echo client hands back.

use crate::echo::config::Port;
use crate::echo::Instance;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Options for a call made from an echo instance
#[derive(Clone)]
pub struct CallOptions {
    /// Instance being called
    pub target: Arc<dyn Instance>,
    /// Port on the target; `None` lets the echo client choose
    pub port: Option<Port>,
    /// Request path, without the leading slash
    pub path: String,
    /// Number of requests to send
    pub count: usize,
    /// Extra request headers
    pub headers: BTreeMap<String, String>,
}

impl CallOptions {
    pub fn new(target: Arc<dyn Instance>) -> Self {
        Self {
            target,
            port: None,
            path: String::new(),
            count: 1,
            headers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: Port) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

impl fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOptions")
            .field("target", &self.target.config().service)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("count", &self.count)
            .field("headers", &self.headers)
            .finish()
    }
}

/// One response as reported by the echo server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedResponse {
    /// Request ID echoed back
    #[serde(default)]
    pub id: String,
    /// Version of the answering workload
    #[serde(default)]
    pub version: String,
    /// Port the request arrived on
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub protocol: String,
    /// Status code as text, e.g. "200"
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub host: String,
    /// Pod hostname of the answering workload
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub raw: String,
}

impl ParsedResponse {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code == "200"
    }
}

/// All responses of one call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedResponses(pub Vec<ParsedResponse>);

impl ParsedResponses {
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParsedResponse> {
        self.0.iter()
    }

    /// True when every response carries a 200 status
    #[must_use]
    pub fn all_ok(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(ParsedResponse::is_ok)
    }
}

impl From<Vec<ParsedResponse>> for ParsedResponses {
    fn from(responses: Vec<ParsedResponse>) -> Self {
        Self(responses)
    }
}

impl<'a> IntoIterator for &'a ParsedResponses {
    type Item = &'a ParsedResponse;
    type IntoIter = std::slice::Iter<'a, ParsedResponse>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
