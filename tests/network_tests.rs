//! Balance queries and endpoint failover against mocked chain APIs.

use std::sync::Arc;
use std::time::Duration;

use hd_wallet_core::chains::EthereumAdapter;
use hd_wallet_core::rpc::{EndpointPool, ReqwestTransport, RpcClient, RpcEndpoint};
use hd_wallet_core::{Chain, ErrorKind, Token, TokenRegistry, WalletConfig, WalletCore};
use httpmock::{Method, MockServer};
use serde_json::json;

const ETH_ADDRESS: &str = "0x9858effd232b4033e47d90003d41ec34ecaeda94";

fn wallet_with(chain: Chain, urls: &[&str]) -> WalletCore {
    let wallet = WalletCore::new(WalletConfig::default()).unwrap();
    let endpoints = urls
        .iter()
        .enumerate()
        .map(|(i, url)| RpcEndpoint::new(&format!("mock-{}", i), url, i as u32 + 1, 10))
        .collect();
    wallet.endpoints().set_endpoints(chain, endpoints);
    wallet
}

#[tokio::test(flavor = "current_thread")]
async fn ethereum_balance_is_formatted() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(Method::POST)
                .path("/")
                .json_body_partial(r#"{"method": "eth_getBalance"}"#);
            then.status(200).json_body(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "0xde0b6b3a7640000"
            }));
        })
        .await;

    let wallet = wallet_with(Chain::Ethereum, &[&server.base_url()]);
    let balance = wallet.get_balance("ETH", ETH_ADDRESS).await.unwrap();

    mock.assert_async().await;
    assert_eq!(balance, "1.00000000");
}

fn ethereum_adapter(url: &str) -> EthereumAdapter {
    let pool = Arc::new(EndpointPool::empty());
    pool.set_endpoints(Chain::Ethereum, vec![RpcEndpoint::new("mock", url, 1, 10)]);
    let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(5)).unwrap());
    EthereumAdapter::new(Arc::new(RpcClient::new(transport, pool)))
}

#[tokio::test(flavor = "current_thread")]
async fn token_balance_above_u128_is_formatted() {
    let server = MockServer::start_async().await;
    // 2^128 base units of an 18-decimal token
    server
        .mock_async(|when, then| {
            when.method(Method::POST)
                .path("/")
                .json_body_partial(r#"{"method": "eth_call"}"#);
            then.status(200).json_body(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "0x0000000000000000000000000000000100000000000000000000000000000000"
            }));
        })
        .await;

    let adapter = ethereum_adapter(&server.base_url());
    let token = Token::new("BIG", "Big Supply", "0x1111111111111111111111111111111111111111", 18);
    let balance = adapter.get_token_balance(ETH_ADDRESS, &token).await.unwrap();
    assert_eq!(balance, "340282366920938463463.374607431768211456");
}

#[tokio::test(flavor = "current_thread")]
async fn registry_token_balances_are_refreshed() {
    let server = MockServer::start_async().await;
    // 2.5 units of any 6-decimal token, 0.0000000000025 of an 18-decimal one
    server
        .mock_async(|when, then| {
            when.method(Method::POST)
                .path("/")
                .json_body_partial(r#"{"method": "eth_call"}"#);
            then.status(200).json_body(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "0x00000000000000000000000000000000000000000000000000000000002625a0"
            }));
        })
        .await;

    let adapter = ethereum_adapter(&server.base_url());
    let mut registry = TokenRegistry::with_defaults();
    adapter
        .refresh_token_balances(ETH_ADDRESS, &mut registry)
        .await
        .unwrap();

    assert_eq!(registry.find(Chain::Ethereum, "USDT").unwrap().balance, "2.500000");
    assert_eq!(
        registry.find(Chain::Ethereum, "DAI").unwrap().balance,
        "0.000000000002500000"
    );
    // Other chains are left alone
    assert_eq!(registry.find(Chain::Tron, "USDT").unwrap().balance, "0");

    assert!(adapter
        .refresh_token_balances("not-an-address", &mut registry)
        .await
        .is_err());
}

#[tokio::test(flavor = "current_thread")]
async fn failing_endpoint_is_rotated_out() {
    let broken = MockServer::start_async().await;
    let healthy = MockServer::start_async().await;

    let broken_mock = broken
        .mock_async(|when, then| {
            when.method(Method::POST).path("/");
            then.status(500);
        })
        .await;
    let healthy_mock = healthy
        .mock_async(|when, then| {
            when.method(Method::POST).path("/");
            then.status(200).json_body(json!({
                "jsonrpc": "2.0",
                "id": 4,
                "result": "0x1bc16d674ec80000"
            }));
        })
        .await;

    let wallet = wallet_with(Chain::Ethereum, &[&broken.base_url(), &healthy.base_url()]);

    for _ in 0..3 {
        assert_eq!(wallet.get_balance("ETH", ETH_ADDRESS).await.unwrap(), "0.0");
    }
    assert_eq!(
        wallet.endpoints().get_endpoint(Chain::Ethereum).unwrap(),
        healthy.base_url()
    );

    assert_eq!(wallet.get_balance("ETH", ETH_ADDRESS).await.unwrap(), "2.00000000");
    broken_mock.assert_hits_async(3).await;
    healthy_mock.assert_hits_async(1).await;
}

#[tokio::test(flavor = "current_thread")]
async fn remote_errors_do_not_rotate() {
    let primary = MockServer::start_async().await;
    let backup = MockServer::start_async().await;

    primary
        .mock_async(|when, then| {
            when.method(Method::POST).path("/");
            then.status(200).json_body(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32602, "message": "invalid params" }
            }));
        })
        .await;

    let wallet = wallet_with(Chain::Ethereum, &[&primary.base_url(), &backup.base_url()]);
    for _ in 0..5 {
        assert_eq!(wallet.get_balance("ETH", ETH_ADDRESS).await.unwrap(), "0.0");
    }
    assert_eq!(
        wallet.endpoints().get_endpoint(Chain::Ethereum).unwrap(),
        primary.base_url()
    );
}

#[tokio::test(flavor = "current_thread")]
async fn bitcoin_balance_and_fee_from_esplora() {
    let server = MockServer::start_async().await;
    let address = "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";

    server
        .mock_async(|when, then| {
            when.method(Method::GET).path(format!("/address/{}", address));
            then.status(200).json_body(json!({
                "address": address,
                "chain_stats": { "funded_txo_sum": 250_000_000u64, "spent_txo_sum": 100_000_000u64 }
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(Method::GET).path("/fee-estimates");
            then.status(200).json_body(json!({ "1": 25.0, "6": 10.0, "144": 1.0 }));
        })
        .await;

    let wallet = wallet_with(Chain::Bitcoin, &[&server.base_url()]);
    assert_eq!(wallet.get_balance("BTC", address).await.unwrap(), "1.50000000");

    let adapter = wallet.adapter(Chain::Bitcoin).unwrap();
    assert_eq!(adapter.estimate_fee().await, "0.000014");
}

#[tokio::test(flavor = "current_thread")]
async fn tron_balance_reads_first_account() {
    let server = MockServer::start_async().await;
    let address = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

    server
        .mock_async(|when, then| {
            when.method(Method::GET).path(format!("/v1/accounts/{}", address));
            then.status(200).json_body(json!({
                "data": [{ "balance": 12_345_678u64 }],
                "success": true
            }));
        })
        .await;

    let wallet = wallet_with(Chain::Tron, &[&server.base_url()]);
    assert_eq!(wallet.get_balance("tron", address).await.unwrap(), "12.345678");
}

#[tokio::test(flavor = "current_thread")]
async fn solana_balance_uses_lamports() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(Method::POST)
                .path("/")
                .json_body_partial(r#"{"method": "getBalance"}"#);
            then.status(200).json_body(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": { "context": { "slot": 1 }, "value": 1_500_000_000u64 }
            }));
        })
        .await;

    let wallet = wallet_with(Chain::Solana, &[&server.base_url()]);
    let balance = wallet
        .get_balance("SOL", "So11111111111111111111111111111111111111112")
        .await
        .unwrap();
    assert_eq!(balance, "1.500000000");
}

#[tokio::test(flavor = "current_thread")]
async fn ethereum_broadcast_returns_hash() {
    let server = MockServer::start_async().await;
    let tx_hash = "0xdeadbeefcafebabefeedface0000000000000000000000000000000000000000";

    server
        .mock_async(|when, then| {
            when.method(Method::POST)
                .path("/")
                .json_body_partial(r#"{"method": "eth_sendRawTransaction", "params": ["0xf86c01"]}"#);
            then.status(200).json_body(json!({ "jsonrpc": "2.0", "id": 1, "result": tx_hash }));
        })
        .await;

    let wallet = wallet_with(Chain::Ethereum, &[&server.base_url()]);
    let adapter = wallet.adapter(Chain::Ethereum).unwrap();
    assert_eq!(adapter.broadcast_transaction("f86c01").await.unwrap(), tx_hash);
}

#[tokio::test(flavor = "current_thread")]
async fn chain_without_endpoints_degrades_to_zero() {
    let wallet = WalletCore::new(WalletConfig::default()).unwrap();
    wallet.endpoints().set_endpoints(Chain::Ethereum, Vec::new());
    assert_eq!(wallet.get_balance("ETH", ETH_ADDRESS).await.unwrap(), "0.0");
}

#[tokio::test(flavor = "current_thread")]
async fn unknown_chain_is_rejected() {
    let wallet = WalletCore::new(WalletConfig::default()).unwrap();
    let err = wallet.get_balance("DOGE", "D8xyz").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn endpoint_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rpc.json");
    std::fs::write(
        &path,
        r#"{ "mainnet": { "ETH": [ { "name": "Local", "url": "http://127.0.0.1:8545", "priority": 1 } ] } }"#,
    )
    .unwrap();

    let pool = EndpointPool::from_config_file(&path, Default::default()).unwrap();
    assert_eq!(pool.get_endpoint(Chain::Ethereum).unwrap(), "http://127.0.0.1:8545");
    assert!(pool.get_endpoint(Chain::Bitcoin).is_some());

    let config = WalletConfig {
        rpc_config_path: Some(path),
        ..WalletConfig::default()
    };
    let wallet = WalletCore::new(config).unwrap();
    assert_eq!(
        wallet.endpoints().get_endpoint(Chain::Ethereum).unwrap(),
        "http://127.0.0.1:8545"
    );
}
