use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{ConfigError, RpcError};
use crate::logging::LogContext;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl From<JsonRpcError> for RpcError {
    fn from(error: JsonRpcError) -> Self {
        RpcError::Method {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }
}

/// Stateless JSON-RPC 2.0 client over HTTP; the endpoint is chosen per call
#[derive(Debug)]
pub struct RpcClient {
    client: Client,
    timeout_seconds: u64,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(timeout_seconds: u64) -> Result<Self, ConfigError> {
        let context = LogContext::new("rpc_client", "initialization")
            .with_metadata("timeout_seconds", serde_json::json!(timeout_seconds));
        context.debug("Initializing RPC client");

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "rpc.client".to_string(),
                value: e.to_string(),
            })?;

        Ok(Self {
            client,
            timeout_seconds,
            next_id: AtomicU64::new(1),
        })
    }

    /// Send one request to `endpoint`. A JSON `null` result is returned as `Value::Null`.
    pub async fn call(&self, endpoint: &str, method: &str, params: &Value) -> Result<Value, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let context = LogContext::new("rpc_client", "call")
            .with_endpoint(endpoint)
            .with_metadata("method", serde_json::json!(method));
        context.trace(&format!("Sending RPC request: {}", method));

        let response = self
            .client
            .post(http_url(endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            // CometBFT can pair a JSON-RPC error body with a 500
            let body = response.text().await.unwrap_or_default();
            if let Ok(JsonRpcResponse { error: Some(error), .. }) = serde_json::from_str::<JsonRpcResponse>(&body) {
                return Err(error.into());
            }
            return Err(RpcError::Status {
                status: status.as_u16(),
            });
        }

        let rpc_response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::InvalidResponse(e.to_string()))?;

        if let Some(error) = rpc_response.error {
            return Err(error.into());
        }

        Ok(rpc_response.result.unwrap_or(Value::Null))
    }

    fn classify(&self, error: reqwest::Error) -> RpcError {
        if error.is_timeout() {
            RpcError::Timeout {
                seconds: self.timeout_seconds,
            }
        } else if error.is_connect() {
            RpcError::Connection(error.to_string())
        } else {
            RpcError::Http(error)
        }
    }
}

/// Websocket-style URLs are served over HTTP POST by the same nodes
fn http_url(endpoint: &str) -> String {
    if let Some(rest) = endpoint.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if let Some(rest) = endpoint.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else {
        endpoint.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_json_rpc_request_serialization() {
        let params = json!(["0x1", true]);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: "eth_getBlockByNumber",
            params: &params,
            id: 7,
        };

        let serialized = serde_json::to_value(&request).unwrap();
        assert_eq!(serialized["jsonrpc"], "2.0");
        assert_eq!(serialized["method"], "eth_getBlockByNumber");
        assert_eq!(serialized["params"][1], true);
        assert_eq!(serialized["id"], 7);
    }

    #[test]
    fn test_http_url_rewrites_websocket_schemes() {
        assert_eq!(http_url("wss://rpc.polkadot.io"), "https://rpc.polkadot.io");
        assert_eq!(http_url("ws://localhost:9944"), "http://localhost:9944");
        assert_eq!(http_url("https://rpc"), "https://rpc");
    }

    #[tokio::test]
    async fn test_call_returns_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_blockNumber"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": "0x10"
            })))
            .mount(&server)
            .await;

        let client = RpcClient::new(5).unwrap();
        let result = client.call(&server.uri(), "eth_blockNumber", &json!([])).await.unwrap();
        assert_eq!(result, json!("0x10"));
    }

    #[tokio::test]
    async fn test_call_maps_errors() {
        let server = MockServer::start().await;
        Mock::given(body_partial_json(json!({"method": "eth_getTransactionByHash"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "error": {"code": -32602, "message": "invalid argument"}
            })))
            .mount(&server)
            .await;
        Mock::given(body_partial_json(json!({"method": "eth_blockNumber"})))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(body_partial_json(json!({"method": "eth_chainId"})))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = RpcClient::new(5).unwrap();

        let method_error = client
            .call(&server.uri(), "eth_getTransactionByHash", &json!(["0x1"]))
            .await;
        assert!(matches!(method_error, Err(RpcError::Method { code: -32602, .. })));

        let status_error = client.call(&server.uri(), "eth_blockNumber", &json!([])).await;
        assert!(matches!(status_error, Err(RpcError::Status { status: 503 })));

        let invalid = client.call(&server.uri(), "eth_chainId", &json!([])).await;
        assert!(matches!(invalid, Err(RpcError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_method_error_keeps_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": -1,
                "error": {"code": -32603, "message": "Internal error", "data": "tx (ABCD) not found"}
            })))
            .mount(&server)
            .await;

        let client = RpcClient::new(5).unwrap();
        let error = client.call(&server.uri(), "tx", &json!({"hash": "ABCD"})).await.unwrap_err();

        match &error {
            RpcError::Method { code, data, .. } => {
                assert_eq!(*code, -32603);
                assert_eq!(data.as_ref(), Some(&json!("tx (ABCD) not found")));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(error.reports_not_found());
        assert!(!error.is_endpoint_fault());
    }

    #[tokio::test]
    async fn test_null_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": null
            })))
            .mount(&server)
            .await;

        let client = RpcClient::new(5).unwrap();
        let result = client
            .call(&server.uri(), "eth_getTransactionByHash", &json!(["0xdead"]))
            .await
            .unwrap();
        assert!(result.is_null());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let client = RpcClient::new(2).unwrap();
        let result = client.call("http://127.0.0.1:1", "eth_blockNumber", &json!([])).await;
        assert!(matches!(result, Err(RpcError::Connection(_)) | Err(RpcError::Http(_))));
    }
}
