use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::U256;
use serde_json::json;
use tracing::warn;

use super::tokens::{encode_balance_of, Token, TokenRegistry};
use super::units::{format_units, format_units_trimmed, parse_hex_quantity};
use super::{decode_hex, signing, uncompressed_body, Chain, ChainAdapter, FALLBACK_BALANCE};
use crate::error::{Result, WalletError};
use crate::hash::keccak256;
use crate::keys::KeyFormat;
use crate::rpc::{RpcClient, RpcError};

const DECIMALS: u32 = 18;
const DISPLAY_DECIMALS: u32 = 8;
const FALLBACK_FEE: &str = "0.001";
const TRANSFER_GAS: u64 = 21_000;

pub struct EthereumAdapter {
    rpc: Arc<RpcClient>,
}

impl EthereumAdapter {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        EthereumAdapter { rpc }
    }

    async fn quantity(&self, method: &str, params: Vec<serde_json::Value>) -> Result<U256> {
        let hex: String = self.rpc.call(Chain::Ethereum, method, params).await?;
        parse_hex_quantity(&hex)
            .ok_or_else(|| RpcError::InvalidResponse(format!("bad quantity {}", hex)).into())
    }

    /// ERC-20 `balanceOf(owner)` through `eth_call`, formatted with the token's decimals.
    pub async fn get_token_balance(&self, owner: &str, token: &Token) -> Result<String> {
        let owner = parse_address(owner)?;
        let call = json!({
            "to": token.contract_address,
            "data": format!("0x{}", hex::encode(encode_balance_of(&owner))),
        });
        let raw = self.quantity("eth_call", vec![call, json!("latest")]).await?;
        let decimals = u32::from(token.decimals);
        format_units(raw, decimals, decimals)
            .map_err(|e| WalletError::InvalidInput(format!("{} decimals: {}", token.symbol, e)))
    }

    /// Refreshes `balance` on every Ethereum token in `registry`. Tokens whose
    /// query fails keep their previous balance.
    pub async fn refresh_token_balances(&self, owner: &str, registry: &mut TokenRegistry) -> Result<()> {
        parse_address(owner)?;
        for token in registry.tokens_for_mut(Chain::Ethereum) {
            match self.get_token_balance(owner, token).await {
                Ok(balance) => token.balance = balance,
                Err(e) => warn!(token = %token.symbol, error = %e, "token balance query failed"),
            }
        }
        Ok(())
    }
}

/// Parses a `0x`-prefixed 20-byte hex address.
pub fn parse_address(address: &str) -> Result<[u8; 20]> {
    let bytes = address
        .strip_prefix("0x")
        .and_then(|digits| hex::decode(digits).ok())
        .filter(|bytes| bytes.len() == 20)
        .ok_or_else(|| WalletError::InvalidInput(format!("invalid Ethereum address: {}", address)))?;
    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Last 20 bytes of Keccak-256 of the 64-byte public key body.
pub(crate) fn address_bytes(public_key: &[u8]) -> Option<[u8; 20]> {
    let body = uncompressed_body(public_key)?;
    let hash = keccak256(body);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    Some(out)
}

#[async_trait]
impl ChainAdapter for EthereumAdapter {
    fn chain(&self) -> Chain {
        Chain::Ethereum
    }

    fn key_format(&self) -> KeyFormat {
        KeyFormat::Uncompressed
    }

    fn derive_address(&self, public_key: &[u8]) -> Option<String> {
        address_bytes(public_key).map(|bytes| format!("0x{}", hex::encode(bytes)))
    }

    fn validate_address(&self, address: &str) -> bool {
        match address.strip_prefix("0x") {
            Some(digits) => digits.len() == 40 && digits.chars().all(|c| c.is_ascii_hexdigit()),
            None => false,
        }
    }

    async fn get_balance(&self, address: &str) -> String {
        match self
            .quantity("eth_getBalance", vec![json!(address), json!("latest")])
            .await
        {
            Ok(wei) => format_units(wei, DECIMALS, DISPLAY_DECIMALS)
                .unwrap_or_else(|_| FALLBACK_BALANCE.to_string()),
            Err(e) => {
                warn!(chain = "ETH", error = %e, "balance query failed");
                FALLBACK_BALANCE.to_string()
            }
        }
    }

    async fn estimate_fee(&self) -> String {
        match self.quantity("eth_gasPrice", Vec::new()).await {
            Ok(gas_price) => format_units_trimmed(gas_price.saturating_mul(U256::from(TRANSFER_GAS)), DECIMALS)
                .unwrap_or_else(|_| FALLBACK_FEE.to_string()),
            Err(_) => FALLBACK_FEE.to_string(),
        }
    }

    /// Recoverable signature over Keccak-256 of the raw transaction, `v` in {27, 28}.
    fn sign_transaction(&self, raw_tx: &[u8], private_key: &[u8]) -> Result<String> {
        let signature = signing::sign_recoverable(&keccak256(raw_tx), private_key, 27)?;
        Ok(format!("0x{}", hex::encode(signature)))
    }

    async fn broadcast_transaction(&self, signed_tx: &str) -> Result<String> {
        let raw = format!("0x{}", hex::encode(decode_hex(signed_tx)?));
        let hash: String = self
            .rpc
            .call(Chain::Ethereum, "eth_sendRawTransaction", vec![json!(raw)])
            .await?;
        Ok(hash)
    }
}
