use serde_json::Value;
use std::sync::{Mutex, MutexGuard};

use super::endpoint_pool::{EndpointPool, PoolConfig};
use super::rpc_client::RpcClient;
use crate::config::RpcConfig;
use crate::error::{RpcError, TrackerError};
use crate::logging::{LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{ChainConfig, EndpointRole, EndpointSnapshot};
use crate::retry::{RetryConfig, RetryManager};

/// JSON-RPC access to one chain through its endpoint pool.
///
/// Every call goes to the currently selected endpoint. Transport failures,
/// server errors and malformed payloads count against that endpoint and the
/// call is retried on whatever the pool selects next.
#[derive(Debug)]
pub struct ChainRpc {
    chain: String,
    client: RpcClient,
    pool: Mutex<EndpointPool>,
    retry: RetryConfig,
}

impl ChainRpc {
    pub fn new(config: &ChainConfig, rpc: &RpcConfig) -> Result<Self, TrackerError> {
        let client = RpcClient::new(rpc.timeout_seconds)?;
        Ok(Self::with_client(
            &config.name,
            client,
            config.endpoints(),
            PoolConfig::from(rpc),
            rpc.retry.clone(),
        ))
    }

    pub fn with_client(
        chain: &str,
        client: RpcClient,
        endpoints: Vec<(String, EndpointRole)>,
        pool_config: PoolConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            chain: chain.to_string(),
            client,
            pool: Mutex::new(EndpointPool::new(chain, endpoints, pool_config)),
            retry,
        }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    // The pool is only touched between awaits, a poisoned lock still holds valid counters
    fn pool(&self) -> MutexGuard<'_, EndpointPool> {
        self.pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn endpoint_states(&self) -> Vec<EndpointSnapshot> {
        self.pool().snapshot()
    }

    /// Call `method` and return the raw result
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, TrackerError> {
        self.request_parsed(method, params, |value| Ok(value.clone()))
            .await
    }

    /// Call `method` and decode the result with `parse`. A decode failure is
    /// treated like a transport failure of the endpoint that produced it.
    pub async fn request_parsed<T, P>(&self, method: &str, params: Value, parse: P) -> Result<T, TrackerError>
    where
        P: Fn(&Value) -> Result<T, String> + Sync,
    {
        let retry_manager = RetryManager::new(&format!("{}_{}", self.chain, method), self.retry.clone());
        let params = &params;
        let parse = &parse;

        retry_manager
            .execute_with_handler(
                move || self.attempt(method, params, parse),
                |error, _| error.triggers_failover(),
            )
            .await
    }

    async fn attempt<T, P>(&self, method: &str, params: &Value, parse: &P) -> Result<T, TrackerError>
    where
        P: Fn(&Value) -> Result<T, String> + Sync,
    {
        let (index, endpoint) = self.pool().select()?;

        let monitor = PerformanceMonitor::new("rpc_call")
            .with_metadata("chain", serde_json::json!(self.chain))
            .with_metadata("method", serde_json::json!(method));
        let result = self.client.call(&endpoint, method, params).await;
        let duration = monitor.finish_with_result(&result);

        let outcome = match result {
            Ok(value) => parse(&value).map_err(|reason| RpcError::InvalidResponse(format!("{}: {}", method, reason))),
            Err(error) => Err(error),
        };
        MetricsLogger::log_rpc_call(&self.chain, method, &endpoint, duration, outcome.is_ok());

        match outcome {
            Ok(parsed) => {
                self.pool().record_success(index);
                Ok(parsed)
            }
            Err(error) if error.is_endpoint_fault() => {
                self.pool().record_failure(index);

                let context = LogContext::new("transport", method)
                    .with_chain(&self.chain)
                    .with_endpoint(&endpoint);
                context.debug(&format!("Endpoint call failed: {}", error));

                Err(TrackerError::RpcUnavailable {
                    chain: self.chain.clone(),
                    endpoint,
                    reason: error.to_string(),
                })
            }
            Err(error) => {
                // The endpoint answered; the request itself was rejected
                self.pool().record_success(index);
                Err(TrackerError::Rpc(error))
            }
        }
    }
}
