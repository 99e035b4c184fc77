//! Per-chain address, balance and transaction conventions behind one trait.

pub mod bitcoin;
pub mod ethereum;
mod signing;
pub mod solana;
pub mod tokens;
pub mod tron;
pub mod units;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Network;
use crate::derivation::paths;
use crate::error::{Result, WalletError};
use crate::keys::KeyFormat;
use crate::rpc::RpcClient;

pub use bitcoin::BitcoinAdapter;
pub use ethereum::EthereumAdapter;
pub use solana::SolanaAdapter;
pub use tokens::{Token, TokenRegistry};
pub use tron::TronAdapter;

/// Balance reported when a query fails for any reason.
pub const FALLBACK_BALANCE: &str = "0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Chain {
    Bitcoin,
    Ethereum,
    Tron,
    Solana,
}

impl Chain {
    pub const ALL: [Chain; 4] = [Chain::Bitcoin, Chain::Ethereum, Chain::Tron, Chain::Solana];

    pub fn symbol(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "BTC",
            Chain::Ethereum => "ETH",
            Chain::Tron => "TRX",
            Chain::Solana => "SOL",
        }
    }

    /// BIP44 coin type.
    pub fn coin_type(&self) -> u32 {
        match self {
            Chain::Bitcoin => paths::BITCOIN,
            Chain::Ethereum => paths::ETHEREUM,
            Chain::Tron => paths::TRON,
            Chain::Solana => paths::SOLANA,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Chain {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BTC" | "BITCOIN" => Ok(Chain::Bitcoin),
            "ETH" | "ETHEREUM" => Ok(Chain::Ethereum),
            "TRX" | "TRON" => Ok(Chain::Tron),
            "SOL" | "SOLANA" => Ok(Chain::Solana),
            _ => Err(WalletError::InvalidInput(format!("unknown chain: {}", s))),
        }
    }
}

/// Address and transaction conventions of one chain.
///
/// Balance and fee queries never fail: network problems degrade to a default
/// string and are counted against the endpoint that caused them.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> Chain;

    /// The public key serialization [`ChainAdapter::derive_address`] expects.
    fn key_format(&self) -> KeyFormat;

    /// `None` when the public key has the wrong shape for this chain.
    fn derive_address(&self, public_key: &[u8]) -> Option<String>;

    /// Structural check only.
    fn validate_address(&self, address: &str) -> bool;

    async fn get_balance(&self, address: &str) -> String;

    async fn estimate_fee(&self) -> String;

    fn create_transaction(&self, _from: &str, _to: &str, _amount: &str) -> Result<Vec<u8>> {
        Err(WalletError::UnsupportedOperation(format!(
            "{} transaction construction",
            self.chain()
        )))
    }

    /// Signs the digest of `raw_tx` and returns the hex signature.
    fn sign_transaction(&self, raw_tx: &[u8], private_key: &[u8]) -> Result<String>;

    /// Submits a signed transaction and returns its id.
    async fn broadcast_transaction(&self, signed_tx: &str) -> Result<String>;
}

/// One adapter per chain, sharing `rpc`.
pub fn default_adapters(network: Network, rpc: Arc<RpcClient>) -> HashMap<Chain, Arc<dyn ChainAdapter>> {
    let mut adapters: HashMap<Chain, Arc<dyn ChainAdapter>> = HashMap::new();
    adapters.insert(Chain::Bitcoin, Arc::new(BitcoinAdapter::new(network, rpc.clone())));
    adapters.insert(Chain::Ethereum, Arc::new(EthereumAdapter::new(rpc.clone())));
    adapters.insert(Chain::Tron, Arc::new(TronAdapter::new(rpc.clone())));
    adapters.insert(Chain::Solana, Arc::new(SolanaAdapter::new(rpc)));
    adapters
}

/// Strips the `0x04` prefix of an uncompressed key, accepting the bare 64 bytes too.
fn uncompressed_body(public_key: &[u8]) -> Option<&[u8]> {
    match public_key.len() {
        65 if public_key[0] == 0x04 => Some(&public_key[1..]),
        64 => Some(public_key),
        _ => None,
    }
}

fn decode_hex(data: &str) -> Result<Vec<u8>> {
    let digits = data.strip_prefix("0x").unwrap_or(data);
    hex::decode(digits).map_err(|e| WalletError::InvalidInput(format!("invalid hex: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_round_trip() {
        for chain in Chain::ALL {
            assert_eq!(chain.symbol().parse::<Chain>().unwrap(), chain);
        }
        assert_eq!("eth".parse::<Chain>().unwrap(), Chain::Ethereum);
        assert_eq!("Solana".parse::<Chain>().unwrap(), Chain::Solana);
        assert!("DOGE".parse::<Chain>().is_err());
    }

    #[test]
    fn coin_types() {
        assert_eq!(Chain::Bitcoin.coin_type(), 0);
        assert_eq!(Chain::Ethereum.coin_type(), 60);
        assert_eq!(Chain::Tron.coin_type(), 195);
        assert_eq!(Chain::Solana.coin_type(), 501);
    }

    #[test]
    fn uncompressed_body_accepts_both_shapes() {
        let mut key = vec![0x04];
        key.extend_from_slice(&[7u8; 64]);
        assert_eq!(uncompressed_body(&key).unwrap().len(), 64);
        assert_eq!(uncompressed_body(&key[1..]).unwrap().len(), 64);
        assert!(uncompressed_body(&[0x02; 33]).is_none());
        key[0] = 0x05;
        assert!(uncompressed_body(&key).is_none());
    }
}
