//! # Echo Client
//!
//! Interface to the echo RPC client. The wire protocol lives outside this
//! crate; workloads only need something that can send calls and be closed.

use crate::echo::call::{CallOptions, ParsedResponses};
use crate::error::HarnessError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::EndpointAddress;
use std::sync::Arc;

/// Client connected to the gRPC command port of one echo pod
#[async_trait]
pub trait EchoClient: Send + Sync {
    /// Ask the pod to send the described requests and report the responses
    async fn call(&self, opts: &CallOptions) -> Result<ParsedResponses, HarnessError>;

    /// Release the connection (and any port-forward behind it)
    async fn close(&self) -> Result<(), HarnessError>;
}

/// Opens echo clients for discovered pods
#[async_trait]
pub trait EchoClientFactory: Send + Sync {
    async fn connect(
        &self,
        address: &EndpointAddress,
        grpc_port: u16,
    ) -> Result<Arc<dyn EchoClient>, HarnessError>;
}
