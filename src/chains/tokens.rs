use std::collections::HashMap;

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use super::Chain;
use crate::error::{Result, WalletError};
use crate::hash::keccak256;

/// `keccak256("balanceOf(address)")[..4]`
pub const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];
/// `keccak256("transfer(address,uint256)")[..4]`
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub symbol: String,
    pub name: String,
    pub contract_address: String,
    pub balance: String,
    pub decimals: u8,
}

impl Token {
    pub fn new(symbol: &str, name: &str, contract_address: &str, decimals: u8) -> Self {
        Token {
            symbol: symbol.to_string(),
            name: name.to_string(),
            contract_address: contract_address.to_string(),
            balance: "0".to_string(),
            decimals,
        }
    }
}

/// Known tokens per chain. Built by the caller and handed to whatever needs it.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: HashMap<Chain, Vec<Token>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Popular ERC-20, TRC-20 and SPL tokens.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.tokens.insert(
            Chain::Ethereum,
            vec![
                Token::new("USDT", "Tether USD", "0xdac17f958d2ee523a2206206994597c13d831ec7", 6),
                Token::new("USDC", "USD Coin", "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", 6),
                Token::new("DAI", "Dai Stablecoin", "0x6b175474e89094c44da98b954eedeac495271d0f", 18),
                Token::new("WETH", "Wrapped Ether", "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2", 18),
                Token::new("UNI", "Uniswap", "0x1f9840a85d5af5bf1d1762f925bdaddc4201f984", 18),
            ],
        );
        registry.tokens.insert(
            Chain::Tron,
            vec![
                Token::new("USDT", "Tether USD", "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t", 6),
                Token::new("USDC", "USD Coin", "TEkxiTehnzSmSe2XqrBj4w32RUN966rdz8", 6),
            ],
        );
        registry.tokens.insert(
            Chain::Solana,
            vec![
                Token::new("USDT", "Tether USD", "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", 6),
                Token::new("USDC", "USD Coin", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", 6),
                Token::new("SOL", "Wrapped SOL", "So11111111111111111111111111111111111111112", 9),
            ],
        );
        registry
    }

    pub fn tokens_for(&self, chain: Chain) -> &[Token] {
        self.tokens.get(&chain).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tokens_for_mut(&mut self, chain: Chain) -> impl Iterator<Item = &mut Token> {
        self.tokens.get_mut(&chain).into_iter().flatten()
    }

    pub fn find(&self, chain: Chain, symbol: &str) -> Option<&Token> {
        self.tokens_for(chain)
            .iter()
            .find(|token| token.symbol.eq_ignore_ascii_case(symbol))
    }

    /// Adds a token, replacing any entry with the same contract address.
    pub fn add_custom_token(&mut self, chain: Chain, token: Token) -> Result<()> {
        if token.symbol.is_empty() || token.contract_address.is_empty() {
            return Err(WalletError::InvalidInput(
                "token needs a symbol and a contract address".into(),
            ));
        }

        let tokens = self.tokens.entry(chain).or_default();
        match tokens
            .iter_mut()
            .find(|t| t.contract_address.eq_ignore_ascii_case(&token.contract_address))
        {
            Some(existing) => *existing = token,
            None => tokens.push(token),
        }
        Ok(())
    }
}

/// Calldata for `balanceOf(owner)`.
pub fn encode_balance_of(owner: &[u8; 20]) -> Vec<u8> {
    let mut data = Vec::with_capacity(36);
    data.extend_from_slice(&BALANCE_OF_SELECTOR);
    data.extend_from_slice(&pad_address(owner));
    data
}

/// Calldata for `transfer(to, amount)`.
pub fn encode_transfer(to: &[u8; 20], amount: U256) -> Vec<u8> {
    let mut data = Vec::with_capacity(68);
    data.extend_from_slice(&TRANSFER_SELECTOR);
    data.extend_from_slice(&pad_address(to));
    let mut word = [0u8; 32];
    amount.to_big_endian(&mut word);
    data.extend_from_slice(&word);
    data
}

/// First four bytes of the Keccak-256 of a function signature.
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&hash[..4]);
    selector
}

fn pad_address(address: &[u8; 20]) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address);
    word
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_match_signatures() {
        assert_eq!(function_selector("balanceOf(address)"), BALANCE_OF_SELECTOR);
        assert_eq!(function_selector("transfer(address,uint256)"), TRANSFER_SELECTOR);
    }

    #[test]
    fn balance_of_calldata_layout() {
        let owner = [0xabu8; 20];
        let data = encode_balance_of(&owner);
        assert_eq!(data.len(), 36);
        assert_eq!(
            hex::encode(&data),
            format!("70a08231{}{}", "00".repeat(12), "ab".repeat(20))
        );
    }

    #[test]
    fn transfer_calldata_layout() {
        let data = encode_transfer(&[0x01; 20], U256::from(1_000_000u64));
        assert_eq!(data.len(), 68);
        assert_eq!(&data[..4], &TRANSFER_SELECTOR);
        assert_eq!(hex::encode(&data[36..]), format!("{}0f4240", "00".repeat(29)));

        let data = encode_transfer(&[0x01; 20], U256::MAX);
        assert_eq!(hex::encode(&data[36..]), "ff".repeat(32));
    }

    #[test]
    fn defaults_cover_token_chains() {
        let registry = TokenRegistry::with_defaults();
        assert_eq!(registry.tokens_for(Chain::Ethereum).len(), 5);
        assert_eq!(registry.tokens_for(Chain::Tron).len(), 2);
        assert_eq!(registry.tokens_for(Chain::Solana).len(), 3);
        assert!(registry.tokens_for(Chain::Bitcoin).is_empty());
        assert_eq!(registry.find(Chain::Ethereum, "dai").unwrap().decimals, 18);
    }

    #[test]
    fn custom_tokens_replace_by_contract() {
        let mut registry = TokenRegistry::with_defaults();
        registry
            .add_custom_token(
                Chain::Ethereum,
                Token::new("LINK", "Chainlink", "0x514910771af9ca656af840dff83e8264ecf986ca", 18),
            )
            .unwrap();
        assert_eq!(registry.tokens_for(Chain::Ethereum).len(), 6);

        registry
            .add_custom_token(
                Chain::Ethereum,
                Token::new("USDT", "Tether", "0xDAC17F958D2EE523A2206206994597C13D831EC7", 6),
            )
            .unwrap();
        assert_eq!(registry.tokens_for(Chain::Ethereum).len(), 6);
        assert_eq!(registry.find(Chain::Ethereum, "USDT").unwrap().name, "Tether");

        assert!(registry
            .add_custom_token(Chain::Ethereum, Token::new("", "x", "0x00", 0))
            .is_err());
    }
}
