use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::endpoints::EndpointPool;
use super::RpcError;
use crate::chains::Chain;

/// The HTTP capability the adapters depend on.
///
/// Implementations must apply a timeout to every request. Dropping a returned
/// future cancels the request.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<Value, RpcError>;

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, RpcError>;

    /// POSTs a plain-text body and returns the plain-text response.
    async fn post_text(&self, url: &str, body: String) -> Result<String, RpcError>;
}

/// [`HttpTransport`] backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(ReqwestTransport { client })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, RpcError> {
        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> RpcError {
    if err.is_timeout() {
        RpcError::Timeout
    } else if err.is_decode() {
        RpcError::InvalidResponse(err.to_string())
    } else {
        RpcError::Transport(err.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_json(&self, url: &str) -> Result<Value, RpcError> {
        let response = self.send(self.client.get(url)).await?;
        response.json().await.map_err(map_reqwest_error)
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, RpcError> {
        let response = self.send(self.client.post(url).json(body)).await?;
        response.json().await.map_err(map_reqwest_error)
    }

    async fn post_text(&self, url: &str, body: String) -> Result<String, RpcError> {
        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body);
        let response = self.send(request).await?;
        response.text().await.map_err(map_reqwest_error)
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Shared request plumbing for the chain adapters.
///
/// Every call resolves the chain's current URL from the [`EndpointPool`] and
/// reports failures back to it, so the next call may go elsewhere. Nothing is
/// retried here.
pub struct RpcClient {
    transport: Arc<dyn HttpTransport>,
    endpoints: Arc<EndpointPool>,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn HttpTransport>, endpoints: Arc<EndpointPool>) -> Self {
        RpcClient {
            transport,
            endpoints,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoints(&self) -> &Arc<EndpointPool> {
        &self.endpoints
    }

    fn base_url(&self, chain: Chain) -> Result<String, RpcError> {
        self.endpoints
            .get_endpoint(chain)
            .ok_or_else(|| RpcError::NoEndpoint(chain.to_string()))
    }

    /// Charges a failure to `url`, the endpoint the request went to.
    fn record<T>(&self, chain: Chain, url: &str, result: Result<T, RpcError>) -> Result<T, RpcError> {
        if let Err(err) = &result {
            // A JSON-RPC error object means the endpoint answered
            if !matches!(err, RpcError::Remote { .. }) {
                self.endpoints.report_failure_for(chain, url, &err.to_string());
            }
        }
        result
    }

    /// JSON-RPC 2.0 call against the chain's current endpoint.
    pub async fn call<T: DeserializeOwned>(
        &self,
        chain: Chain,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        let url = self.base_url(chain)?;
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let body =
            serde_json::to_value(&request).map_err(|e| RpcError::InvalidResponse(e.to_string()))?;

        debug!(%chain, method, id = request.id, "JSON-RPC request");
        let result = async {
            let raw = self.transport.post_json(&url, &body).await?;
            parse_response(raw)
        }
        .await;

        self.record(chain, &url, result)
    }

    /// GET `{endpoint}{path}` returning JSON.
    pub async fn get_json(&self, chain: Chain, path: &str) -> Result<Value, RpcError> {
        let base = self.base_url(chain)?;
        let result = self.transport.get_json(&join_url(&base, path)).await;
        self.record(chain, &base, result)
    }

    /// POST a JSON body to `{endpoint}{path}`.
    pub async fn post_json(&self, chain: Chain, path: &str, body: &Value) -> Result<Value, RpcError> {
        let base = self.base_url(chain)?;
        let result = self.transport.post_json(&join_url(&base, path), body).await;
        self.record(chain, &base, result)
    }

    /// POST a plain-text body to `{endpoint}{path}`.
    pub async fn post_text(&self, chain: Chain, path: &str, body: String) -> Result<String, RpcError> {
        let base = self.base_url(chain)?;
        let result = self.transport.post_text(&join_url(&base, path), body).await;
        self.record(chain, &base, result)
    }
}

fn parse_response<T: DeserializeOwned>(raw: Value) -> Result<T, RpcError> {
    let response: RpcResponse =
        serde_json::from_value(raw).map_err(|e| RpcError::InvalidResponse(e.to_string()))?;

    if let Some(error) = response.error {
        return Err(RpcError::Remote {
            code: error.code,
            message: error.message,
        });
    }

    let result = response
        .result
        .ok_or_else(|| RpcError::InvalidResponse("missing result".to_string()))?;
    serde_json::from_value(result).map_err(|e| RpcError::InvalidResponse(e.to_string()))
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}
