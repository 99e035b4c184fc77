use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::units::{format_units, format_units_trimmed};
use super::{decode_hex, signing, Chain, ChainAdapter, FALLBACK_BALANCE};
use crate::config::Network;
use crate::encoding::encode_segwit_v0;
use crate::error::Result;
use crate::hash::{hash160, sha256d};
use crate::keys::KeyFormat;
use crate::rpc::RpcClient;

const DECIMALS: u32 = 8;
const FALLBACK_FEE: &str = "0.0001";
/// Block target used from the `/fee-estimates` table.
const FEE_TARGET_BLOCKS: &str = "6";
/// Virtual size of a one-input, two-output P2WPKH spend.
const TYPICAL_TX_VBYTES: f64 = 140.0;

/// Native segwit (P2WPKH) addresses against an Esplora-style REST API.
pub struct BitcoinAdapter {
    network: Network,
    rpc: Arc<RpcClient>,
}

impl BitcoinAdapter {
    pub fn new(network: Network, rpc: Arc<RpcClient>) -> Self {
        BitcoinAdapter { network, rpc }
    }

    fn hrp(&self) -> &'static str {
        match self.network {
            Network::Mainnet => "bc",
            Network::Testnet => "tb",
        }
    }

    async fn fetch_balance(&self, address: &str) -> Option<String> {
        let info = self
            .rpc
            .get_json(Chain::Bitcoin, &format!("/address/{}", address))
            .await
            .ok()?;
        let stats = &info["chain_stats"];
        let funded = stats["funded_txo_sum"].as_u64()?;
        let spent = stats["spent_txo_sum"].as_u64()?;
        let satoshis = funded.saturating_sub(spent);
        format_units(satoshis, DECIMALS, DECIMALS).ok()
    }

    async fn fetch_fee(&self) -> Option<String> {
        let estimates = self.rpc.get_json(Chain::Bitcoin, "/fee-estimates").await.ok()?;
        let sat_per_vbyte = estimates[FEE_TARGET_BLOCKS].as_f64()?;
        if !sat_per_vbyte.is_finite() || sat_per_vbyte < 0.0 {
            return None;
        }
        let satoshis = (sat_per_vbyte * TYPICAL_TX_VBYTES).ceil() as u64;
        format_units_trimmed(satoshis, DECIMALS).ok()
    }
}

#[async_trait]
impl ChainAdapter for BitcoinAdapter {
    fn chain(&self) -> Chain {
        Chain::Bitcoin
    }

    fn key_format(&self) -> KeyFormat {
        KeyFormat::Compressed
    }

    fn derive_address(&self, public_key: &[u8]) -> Option<String> {
        if public_key.len() != 33 {
            return None;
        }
        encode_segwit_v0(self.hrp(), &hash160(public_key)).ok()
    }

    fn validate_address(&self, address: &str) -> bool {
        let len = address.len();
        if address.starts_with("bc1") || address.starts_with("tb1") {
            return (42..=62).contains(&len);
        }
        if address.starts_with('1') || address.starts_with('3') {
            return (26..=35).contains(&len);
        }
        false
    }

    async fn get_balance(&self, address: &str) -> String {
        match self.fetch_balance(address).await {
            Some(balance) => balance,
            None => {
                warn!(chain = "BTC", "balance query failed");
                FALLBACK_BALANCE.to_string()
            }
        }
    }

    async fn estimate_fee(&self) -> String {
        self.fetch_fee()
            .await
            .unwrap_or_else(|| FALLBACK_FEE.to_string())
    }

    /// DER signature over SHA-256d of the raw transaction.
    fn sign_transaction(&self, raw_tx: &[u8], private_key: &[u8]) -> Result<String> {
        let signature = signing::sign_der(&sha256d(raw_tx), private_key)?;
        Ok(hex::encode(signature))
    }

    async fn broadcast_transaction(&self, signed_tx: &str) -> Result<String> {
        // Esplora expects the raw hex as the request body
        let raw = hex::encode(decode_hex(signed_tx)?);
        let txid = self.rpc.post_text(Chain::Bitcoin, "/tx", raw).await?;
        Ok(txid.trim().to_string())
    }
}
