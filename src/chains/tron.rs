use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use super::ethereum::address_bytes;
use super::units::format_units;
use super::{decode_hex, signing, Chain, ChainAdapter, FALLBACK_BALANCE};
use crate::encoding::{decode_base58check, encode_base58check};
use crate::error::{Result, WalletError};
use crate::hash::sha256;
use crate::keys::KeyFormat;
use crate::rpc::{RpcClient, RpcError};

/// Base58Check version byte of mainnet Tron addresses (leading 'T').
pub const ADDRESS_VERSION: u8 = 0x41;
const DECIMALS: u32 = 6;
const FALLBACK_FEE: &str = "0.0";

pub struct TronAdapter {
    rpc: Arc<RpcClient>,
}

impl TronAdapter {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        TronAdapter { rpc }
    }

    async fn fetch_balance(&self, address: &str) -> Option<String> {
        let account = self
            .rpc
            .get_json(Chain::Tron, &format!("/v1/accounts/{}", address))
            .await
            .ok()?;
        let sun = account["data"].get(0)?["balance"].as_u64()?;
        format_units(sun, DECIMALS, DECIMALS).ok()
    }
}

/// The 20-byte account id behind a Base58Check Tron address.
pub fn address_to_bytes(address: &str) -> Result<[u8; 20]> {
    let (version, payload) = decode_base58check(address)?;
    if version != ADDRESS_VERSION || payload.len() != 20 {
        return Err(WalletError::InvalidInput(format!("invalid Tron address: {}", address)));
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&payload);
    Ok(out)
}

#[async_trait]
impl ChainAdapter for TronAdapter {
    fn chain(&self) -> Chain {
        Chain::Tron
    }

    fn key_format(&self) -> KeyFormat {
        KeyFormat::Uncompressed
    }

    fn derive_address(&self, public_key: &[u8]) -> Option<String> {
        address_bytes(public_key).map(|bytes| encode_base58check(&bytes, ADDRESS_VERSION))
    }

    fn validate_address(&self, address: &str) -> bool {
        address.starts_with('T') && address.len() == 34
    }

    async fn get_balance(&self, address: &str) -> String {
        match self.fetch_balance(address).await {
            Some(balance) => balance,
            None => {
                warn!(chain = "TRX", "balance query failed");
                FALLBACK_BALANCE.to_string()
            }
        }
    }

    async fn estimate_fee(&self) -> String {
        // bandwidth and energy, not a per-transaction fee
        FALLBACK_FEE.to_string()
    }

    /// Recoverable signature over SHA-256 of the raw transaction (the Tron txid).
    fn sign_transaction(&self, raw_tx: &[u8], private_key: &[u8]) -> Result<String> {
        let signature = signing::sign_recoverable(&sha256(raw_tx), private_key, 0)?;
        Ok(hex::encode(signature))
    }

    async fn broadcast_transaction(&self, signed_tx: &str) -> Result<String> {
        let body = json!({ "transaction": hex::encode(decode_hex(signed_tx)?) });
        let response = self
            .rpc
            .post_json(Chain::Tron, "/wallet/broadcasthex", &body)
            .await?;

        if response["result"].as_bool() != Some(true) {
            let message = response["message"]
                .as_str()
                .or_else(|| response["code"].as_str())
                .unwrap_or("broadcast rejected");
            return Err(RpcError::InvalidResponse(message.to_string()).into());
        }
        response["txid"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RpcError::InvalidResponse("missing txid".to_string()).into())
    }
}
