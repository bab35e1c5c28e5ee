use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chain_tx_tracker::blockchain::{build_adapter, ChainAdapter};
use chain_tx_tracker::config::RpcConfig;
use chain_tx_tracker::error::TrackerError;
use chain_tx_tracker::models::{ChainConfig, ChainKind, Web3Flavor};
use chain_tx_tracker::retry::RetryConfig;

fn rpc_result(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
}

/// Retries enabled and a low threshold, so a misclassified lookup would
/// both retry and suspend the only endpoint
fn rpc_config() -> RpcConfig {
    RpcConfig {
        timeout_seconds: 5,
        failure_threshold: 2,
        suspension_base_seconds: 60,
        suspension_max_seconds: 300,
        retry: RetryConfig::immediate(3),
    }
}

fn chain(server: &MockServer, flavor: Option<Web3Flavor>) -> ChainConfig {
    let mut config = ChainConfig::evm("testnet", &server.uri(), "TST");
    if flavor.is_some() {
        config.kind = ChainKind::Web3;
        config.chain_type = flavor;
    }
    config.confirmations = 0;
    config
}

fn adapter(server: &MockServer, flavor: Option<Web3Flavor>) -> Arc<dyn ChainAdapter> {
    build_adapter(chain(server, flavor), &rpc_config()).unwrap()
}

fn web3_without_chain_type(server: &MockServer) -> Arc<dyn ChainAdapter> {
    let mut config = chain(server, None);
    config.kind = ChainKind::Web3;
    build_adapter(config, &rpc_config()).unwrap()
}

fn assert_not_found(result: Result<chain_tx_tracker::models::RawTransaction, TrackerError>, expected_hash: &str) {
    match result {
        Err(TrackerError::NotFound { chain, hash }) => {
            assert_eq!(chain, "testnet");
            assert_eq!(hash, expected_hash);
        }
        other => panic!("expected NotFound, got {:?}", other),
    }
}

fn assert_endpoint_healthy(adapter: &Arc<dyn ChainAdapter>) {
    let states = adapter.endpoint_states();
    assert_eq!(states[0].consecutive_failures, 0);
    assert!(states[0].suspended_for_ms.is_none());
}

#[tokio::test]
async fn test_cosmos_unknown_hash_is_not_found() {
    let server = MockServer::start().await;
    // CometBFT keeps the reason in `data`
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tx"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": -1,
            "error": {"code": -32603, "message": "Internal error", "data": "tx (ABCD) not found"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cosmos = adapter(&server, Some(Web3Flavor::Cosmos));
    assert_not_found(cosmos.get_transaction_details("ABCD").await, "ABCD");
    assert_endpoint_healthy(&cosmos);
}

#[tokio::test]
async fn test_cosmos_unknown_hash_with_http_500_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": -1,
            "error": {"code": -32603, "message": "Internal error", "data": "tx (ABCD) not found"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cosmos = adapter(&server, Some(Web3Flavor::Cosmos));
    assert_not_found(cosmos.get_transaction_details("ABCD").await, "ABCD");
    assert_endpoint_healthy(&cosmos);
}

#[tokio::test]
async fn test_cosmos_internal_error_still_counts_against_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": -1,
            "error": {"code": -32603, "message": "Internal error", "data": "database is locked"}
        })))
        .mount(&server)
        .await;

    let cosmos = adapter(&server, Some(Web3Flavor::Cosmos));
    let result = cosmos.get_transaction_details("ABCD").await;
    assert!(matches!(
        result,
        Err(TrackerError::RpcUnavailable { .. }) | Err(TrackerError::AllEndpointsDown { .. })
    ));
    assert!(cosmos.endpoint_states()[0].suspended_for_ms.is_some());
}

#[tokio::test]
async fn test_evm_unknown_and_pending_transactions_are_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_getTransactionByHash", "params": ["0xunknown"]})))
        .respond_with(rpc_result(Value::Null))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_getTransactionByHash", "params": ["0xpending"]})))
        .respond_with(rpc_result(json!({
            "hash": "0xpending",
            "from": "0x1111111111111111111111111111111111111111",
            "to": "0x2222222222222222222222222222222222222222",
            "value": "0x1",
            "blockNumber": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let evm = adapter(&server, None);
    assert_not_found(evm.get_transaction_details("0xunknown").await, "0xunknown");
    assert_not_found(evm.get_transaction_details("0xpending").await, "0xpending");
    assert_endpoint_healthy(&evm);
}

#[tokio::test]
async fn test_evm_transaction_details_include_block_timestamp() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_getTransactionByHash"})))
        .respond_with(rpc_result(json!({
            "hash": "0xabc",
            "from": "0x1111111111111111111111111111111111111111",
            "to": "0x2222222222222222222222222222222222222222",
            "value": "0x2a",
            "blockNumber": "0x65"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_getBlockByNumber", "params": ["0x65", false]})))
        .respond_with(rpc_result(json!({"number": "0x65", "timestamp": "0x6553f100", "transactions": []})))
        .mount(&server)
        .await;

    let evm = adapter(&server, None);
    let tx = evm.get_transaction_details("0xabc").await.unwrap();
    assert_eq!(tx.block_number, 101);
    assert_eq!(tx.value, 42);
    assert_eq!(tx.timestamp, 0x6553f100);
}

#[tokio::test]
async fn test_substrate_unknown_extrinsic_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_result(Value::Null))
        .expect(1)
        .mount(&server)
        .await;

    let substrate = adapter(&server, Some(Web3Flavor::Substrate));
    assert_not_found(substrate.get_transaction_details("0xdead").await, "0xdead");
    assert_endpoint_healthy(&substrate);
}

#[tokio::test]
async fn test_generic_unknown_transaction_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_result(Value::Null))
        .expect(2)
        .mount(&server)
        .await;

    let generic = adapter(&server, Some(Web3Flavor::Generic));
    assert_not_found(generic.get_transaction_details("tx-1").await, "tx-1");

    // A web3 chain without chain_type takes the same path
    let unset = web3_without_chain_type(&server);
    assert_not_found(unset.get_transaction_details("tx-1").await, "tx-1");
    assert_endpoint_healthy(&generic);
}

#[tokio::test]
async fn test_reversed_range_is_rejected_without_network_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_result(Value::Null))
        .expect(0)
        .mount(&server)
        .await;

    let flavors = [
        None,
        Some(Web3Flavor::Substrate),
        Some(Web3Flavor::Cosmos),
        Some(Web3Flavor::Generic),
    ];
    for flavor in flavors {
        let adapter = adapter(&server, flavor);
        let result = adapter.get_transactions(105, 101).await;
        assert!(
            matches!(result, Err(TrackerError::InvalidRange { start: 105, end: 101 })),
            "{:?} accepted a reversed range",
            flavor
        );
    }
}

#[tokio::test]
async fn test_evm_range_only_returns_transactions_inside_it() {
    let server = MockServer::start().await;
    // Block 0x65 carries one transaction that claims to belong to block 0x70
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_getBlockByNumber", "params": ["0x65", true]})))
        .respond_with(rpc_result(json!({
            "number": "0x65",
            "timestamp": "0x6553f100",
            "transactions": [
                {
                    "hash": "0xinside",
                    "from": "0x1111111111111111111111111111111111111111",
                    "to": "0x2222222222222222222222222222222222222222",
                    "value": "0x1",
                    "blockNumber": "0x65"
                },
                {
                    "hash": "0xoutside",
                    "from": "0x1111111111111111111111111111111111111111",
                    "to": "0x2222222222222222222222222222222222222222",
                    "value": "0x1",
                    "blockNumber": "0x70"
                }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_getBlockByNumber"})))
        .respond_with(rpc_result(json!({"number": "0x66", "timestamp": "0x6553f10c", "transactions": []})))
        .mount(&server)
        .await;

    let evm = adapter(&server, None);
    let txs = evm.get_transactions(101, 102).await.unwrap();

    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].hash, "0xinside");
    assert!(txs.iter().all(|tx| (101..=102).contains(&tx.block_number)));
}
