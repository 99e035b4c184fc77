//! RPC plumbing shared by the chain adapters: an injectable HTTP transport,
//! a JSON-RPC helper and the per-chain endpoint pool with failover.

pub mod client;
pub mod endpoints;

use thiserror::Error;

use crate::error::ErrorKind;

pub use client::{HttpTransport, ReqwestTransport, RpcClient};
pub use endpoints::{EndpointPool, RpcEndpoint, MAX_FAILURES};

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Request timed out")]
    Timeout,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("RPC error {code}: {message}")]
    Remote { code: i64, message: String },
    #[error("No endpoint configured for {0}")]
    NoEndpoint(String),
    #[error("Invalid endpoint configuration: {0}")]
    Config(String),
    #[error("Cannot read endpoint configuration: {0}")]
    ConfigIo(#[from] std::io::Error),
}

impl RpcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::Config(_) => ErrorKind::InvalidInput,
            RpcError::ConfigIo(_) => ErrorKind::ResourceFailure,
            _ => ErrorKind::NetworkFailure,
        }
    }
}
