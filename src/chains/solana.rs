use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tracing::warn;

use super::units::format_units;
use super::{decode_hex, Chain, ChainAdapter, FALLBACK_BALANCE};
use crate::encoding::{decode_base58, encode_base58};
use crate::error::{Result, WalletError};
use crate::keys::KeyFormat;
use crate::rpc::RpcClient;

const DECIMALS: u32 = 9;
/// 5000 lamports per signature.
const BASE_FEE: &str = "0.000005";

/// Solana adapter.
///
/// Addresses are the Base58 X coordinate of the secp256k1 public key. Real
/// Solana accounts are Ed25519 keys, so these addresses cannot sign on chain
/// and signing is refused.
pub struct SolanaAdapter {
    rpc: Arc<RpcClient>,
}

impl SolanaAdapter {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        SolanaAdapter { rpc }
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn chain(&self) -> Chain {
        Chain::Solana
    }

    fn key_format(&self) -> KeyFormat {
        KeyFormat::Uncompressed
    }

    fn derive_address(&self, public_key: &[u8]) -> Option<String> {
        let body = match public_key.first() {
            Some(0x04) if public_key.len() == 65 => &public_key[1..],
            _ => public_key,
        };
        if body.len() < 32 {
            return None;
        }
        Some(encode_base58(&body[..32]))
    }

    fn validate_address(&self, address: &str) -> bool {
        (32..=44).contains(&address.len())
            && decode_base58(address).map(|bytes| bytes.len() == 32).unwrap_or(false)
    }

    async fn get_balance(&self, address: &str) -> String {
        let result: std::result::Result<Value, _> = self
            .rpc
            .call(Chain::Solana, "getBalance", vec![json!(address)])
            .await;
        let balance = result
            .ok()
            .and_then(|value| value["value"].as_u64())
            .and_then(|lamports| format_units(lamports, DECIMALS, DECIMALS).ok());
        match balance {
            Some(balance) => balance,
            None => {
                warn!(chain = "SOL", "balance query failed");
                FALLBACK_BALANCE.to_string()
            }
        }
    }

    async fn estimate_fee(&self) -> String {
        BASE_FEE.to_string()
    }

    fn sign_transaction(&self, _raw_tx: &[u8], _private_key: &[u8]) -> Result<String> {
        Err(WalletError::UnsupportedOperation(
            "Solana transactions need an Ed25519 key".into(),
        ))
    }

    async fn broadcast_transaction(&self, signed_tx: &str) -> Result<String> {
        let encoded = STANDARD.encode(decode_hex(signed_tx)?);
        let signature: String = self
            .rpc
            .call(
                Chain::Solana,
                "sendTransaction",
                vec![json!(encoded), json!({ "encoding": "base64" })],
            )
            .await?;
        Ok(signature)
    }
}
