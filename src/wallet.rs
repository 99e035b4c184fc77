use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::chains::{default_adapters, Chain, ChainAdapter};
use crate::config::WalletConfig;
use crate::derivation::{paths, DerivationError, DerivationPath, ExtendedKey};
use crate::error::{Result, WalletError};
use crate::keys::{public_key_of, KeyFormat};
use crate::mnemonic::{self, SecureMnemonic};
use crate::rpc::{EndpointPool, HttpTransport, ReqwestTransport, RpcClient};
use crate::secure::SecureBuffer;
use crate::storage::SecretStore;

/// The secret document written to keyfiles.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct WalletSecret {
    mnemonic: String,
    #[serde(default)]
    passphrase: String,
}

/// Unlocked wallet state; dropped (and wiped) on `clear`.
struct Session {
    master: ExtendedKey,
    phrase: SecureBuffer,
    passphrase: SecureBuffer,
}

/// Owns the master key and routes per-chain work to the adapters.
pub struct WalletCore {
    config: WalletConfig,
    session: Mutex<Option<Session>>,
    adapters: HashMap<Chain, Arc<dyn ChainAdapter>>,
    endpoints: Arc<EndpointPool>,
    secrets: SecretStore,
}

impl WalletCore {
    /// Builds a wallet that talks to the network through `reqwest`.
    pub fn new(config: WalletConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(config.request_timeout())?);
        Self::with_transport(config, transport)
    }

    /// Builds a wallet around a caller-supplied HTTP transport.
    pub fn with_transport(config: WalletConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        config.validate()?;

        let endpoints = Arc::new(match &config.rpc_config_path {
            Some(path) => EndpointPool::from_config_file(path, config.network)?,
            None => EndpointPool::with_defaults(config.network),
        });
        let rpc = Arc::new(RpcClient::new(transport, endpoints.clone()));
        let adapters = default_adapters(config.network, rpc);
        let secrets = SecretStore::new(config.kdf_iterations)?;

        Ok(WalletCore {
            config,
            session: Mutex::new(None),
            adapters,
            endpoints,
            secrets,
        })
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &Arc<EndpointPool> {
        &self.endpoints
    }

    pub fn adapter(&self, chain: Chain) -> Option<Arc<dyn ChainAdapter>> {
        self.adapters.get(&chain).cloned()
    }

    pub fn generate_mnemonic(&self, word_count: usize) -> Result<String> {
        Ok(mnemonic::generate_mnemonic(word_count)?)
    }

    pub fn validate_mnemonic(&self, phrase: &str) -> bool {
        mnemonic::validate_mnemonic(phrase)
    }

    pub fn restore_from_mnemonic(&self, phrase: &str) -> Result<()> {
        self.restore_from_mnemonic_with_passphrase(phrase, "")
    }

    /// Validates the phrase, derives the seed and master key, and replaces
    /// any previous session. The seed is wiped before returning.
    pub fn restore_from_mnemonic_with_passphrase(&self, phrase: &str, passphrase: &str) -> Result<()> {
        let mnemonic = SecureMnemonic::from_phrase(phrase)?;
        let seed = mnemonic.to_seed(passphrase);
        let master = ExtendedKey::from_seed(seed.as_slice())?;
        drop(seed);

        let session = Session {
            master,
            phrase: SecureBuffer::from_vec(mnemonic.phrase().into_bytes()),
            passphrase: SecureBuffer::from_slice(passphrase.as_bytes()),
        };
        *self.session.lock() = Some(session);

        info!(words = mnemonic.word_count(), "wallet restored");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Wipes the master key and returns to the uninitialized state.
    pub fn clear(&self) {
        if let Some(mut session) = self.session.lock().take() {
            session.master.zeroize();
            session.phrase.clear();
            session.passphrase.clear();
            info!("wallet cleared");
        }
    }

    fn with_master<T>(&self, f: impl FnOnce(&ExtendedKey) -> Result<T>) -> Result<T> {
        let session = self.session.lock();
        match session.as_ref() {
            Some(session) => f(&session.master),
            None => Err(WalletError::NotInitialized),
        }
    }

    fn derive(&self, path: &DerivationPath) -> Result<ExtendedKey> {
        self.with_master(|master| Ok(path.derive(master)?))
    }

    /// 32-byte private key at `path`.
    pub fn derive_private_key(&self, path: &str) -> Result<SecureBuffer> {
        let path: DerivationPath = path.parse()?;
        let key = self.derive(&path)?;
        Ok(SecureBuffer::from_slice(key.key()))
    }

    /// 33-byte compressed public key at `path`.
    pub fn derive_public_key(&self, path: &str) -> Result<Vec<u8>> {
        let path: DerivationPath = path.parse()?;
        let key = self.derive(&path)?;
        Ok(public_key_of(&key, KeyFormat::Compressed)?)
    }

    /// Serialized extended public key at `path`, for the configured network.
    pub fn derive_xpub(&self, path: &str) -> Result<String> {
        let path: DerivationPath = path.parse()?;
        let key = self.derive(&path)?;
        Ok(key.to_xpub(self.config.network)?)
    }

    /// BIP44 path of the first receiving address of `account`. Accounts at or
    /// above 2^31 are rejected.
    pub fn address_path(chain: Chain, account: u32) -> Result<DerivationPath> {
        Ok(paths::bip44(chain.coin_type(), account, false, 0)?)
    }

    /// Address at `m/44'/coin'/account'/0/0` for a chain symbol such as `"ETH"`.
    pub fn derive_address(&self, chain_symbol: &str, account: u32) -> Result<String> {
        self.derive_address_for(chain_symbol.parse()?, account)
    }

    pub fn derive_address_for(&self, chain: Chain, account: u32) -> Result<String> {
        let adapter = self
            .adapter(chain)
            .ok_or_else(|| WalletError::InvalidInput(format!("no adapter for {}", chain)))?;

        let path = Self::address_path(chain, account)?;
        let key = self.derive(&path)?;
        let public_key = public_key_of(&key, adapter.key_format())?;

        let address = adapter
            .derive_address(&public_key)
            .ok_or(WalletError::Derivation(DerivationError::InvalidKey))?;
        debug!(%chain, account, "address derived");
        Ok(address)
    }

    /// Balance of `address` on the chain named by `chain_symbol`; "0.0" on
    /// network failure.
    pub async fn get_balance(&self, chain_symbol: &str, address: &str) -> Result<String> {
        let chain: Chain = chain_symbol.parse()?;
        let adapter = self
            .adapter(chain)
            .ok_or_else(|| WalletError::InvalidInput(format!("no adapter for {}", chain)))?;
        Ok(adapter.get_balance(address).await)
    }

    /// `{"mnemonic": ..., "passphrase": ...}` as bytes in a wiped-on-drop buffer.
    pub fn export_secret(&self) -> Result<SecureBuffer> {
        let session = self.session.lock();
        let session = session.as_ref().ok_or(WalletError::NotInitialized)?;

        let secret = WalletSecret {
            mnemonic: utf8(&session.phrase)?.to_string(),
            passphrase: utf8(&session.passphrase)?.to_string(),
        };
        let json = serde_json::to_vec(&secret)
            .map_err(|e| WalletError::InvalidInput(format!("cannot encode secret: {}", e)))?;
        Ok(SecureBuffer::from_vec(json))
    }

    /// Encrypts the exported secret into a keyfile at `path`.
    pub fn save_keyfile<P: AsRef<Path>>(&self, path: P, password: &str) -> Result<()> {
        let secret = self.export_secret()?;
        self.secrets.encrypt_and_save(path, secret.as_slice(), password)?;
        Ok(())
    }

    /// Decrypts a keyfile written by [`WalletCore::save_keyfile`] and restores from it.
    pub fn restore_from_keyfile<P: AsRef<Path>>(&self, path: P, password: &str) -> Result<()> {
        let plaintext = self.secrets.load_and_decrypt(path, password)?;
        let secret: WalletSecret = serde_json::from_slice(plaintext.as_slice())
            .map_err(|_| WalletError::InvalidInput("keyfile does not hold a wallet secret".into()))?;
        self.restore_from_mnemonic_with_passphrase(&secret.mnemonic, &secret.passphrase)
    }
}

impl Drop for WalletCore {
    fn drop(&mut self) {
        self.clear();
    }
}

fn utf8(buffer: &SecureBuffer) -> Result<&str> {
    std::str::from_utf8(buffer.as_slice())
        .map_err(|_| WalletError::InvalidInput("stored secret is not UTF-8".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon \
                           abandon abandon abandon abandon abandon about";

    fn wallet() -> WalletCore {
        WalletCore::new(WalletConfig::default()).unwrap()
    }

    #[test]
    fn ethereum_reference_address() {
        let wallet = wallet();
        wallet.restore_from_mnemonic(ABANDON).unwrap();
        assert_eq!(
            wallet.derive_address("ETH", 0).unwrap(),
            "0x9858effd232b4033e47d90003d41ec34ecaeda94"
        );
    }

    #[test]
    fn uninitialized_wallet_refuses_derivation() {
        let wallet = wallet();
        assert!(!wallet.is_initialized());
        let err = wallet.derive_address("BTC", 0).unwrap_err();
        assert!(matches!(err, WalletError::NotInitialized));
        assert!(wallet.derive_private_key("m/0").is_err());
        assert!(wallet.export_secret().is_err());
    }

    #[test]
    fn clear_resets_state() {
        let wallet = wallet();
        wallet.restore_from_mnemonic(ABANDON).unwrap();
        assert!(wallet.is_initialized());
        wallet.clear();
        assert!(!wallet.is_initialized());
        assert!(wallet.derive_public_key("m/44'/60'/0'/0/0").is_err());
    }

    #[test]
    fn invalid_mnemonic_is_rejected() {
        let wallet = wallet();
        let err = wallet.restore_from_mnemonic("abandon abandon abandon").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(!wallet.is_initialized());
    }

    #[test]
    fn unknown_chain_is_invalid_input() {
        let wallet = wallet();
        wallet.restore_from_mnemonic(ABANDON).unwrap();
        let err = wallet.derive_address("DOGE", 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn key_sizes() {
        let wallet = wallet();
        wallet.restore_from_mnemonic(ABANDON).unwrap();
        assert_eq!(wallet.derive_private_key("m/44'/60'/0'/0/0").unwrap().len(), 32);
        assert_eq!(wallet.derive_public_key("m/44'/60'/0'/0/0").unwrap().len(), 33);
        assert!(wallet.derive_public_key("m/44'/x'").is_err());
    }

    #[test]
    fn accounts_yield_distinct_addresses() {
        let wallet = wallet();
        wallet.restore_from_mnemonic(ABANDON).unwrap();
        for chain in Chain::ALL {
            let first = wallet.derive_address_for(chain, 0).unwrap();
            let second = wallet.derive_address_for(chain, 1).unwrap();
            assert_ne!(first, second);
            assert!(wallet.adapter(chain).unwrap().validate_address(&first));
        }
    }

    #[test]
    fn passphrase_changes_keys() {
        let wallet = wallet();
        wallet.restore_from_mnemonic(ABANDON).unwrap();
        let plain = wallet.derive_address("ETH", 0).unwrap();
        wallet
            .restore_from_mnemonic_with_passphrase(ABANDON, "TREZOR")
            .unwrap();
        assert_ne!(wallet.derive_address("ETH", 0).unwrap(), plain);
    }

    #[test]
    fn exported_secret_is_json() {
        let wallet = wallet();
        wallet
            .restore_from_mnemonic_with_passphrase(ABANDON, "extra")
            .unwrap();
        let secret = wallet.export_secret().unwrap();
        let json: serde_json::Value = serde_json::from_slice(secret.as_slice()).unwrap();
        assert_eq!(json["mnemonic"], ABANDON.split_whitespace().collect::<Vec<_>>().join(" "));
        assert_eq!(json["passphrase"], "extra");
    }

    #[test]
    fn account_with_hardened_bit_is_rejected() {
        let wallet = wallet();
        wallet.restore_from_mnemonic(ABANDON).unwrap();

        let err = wallet.derive_address("ETH", 0x8000_0000).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(wallet.derive_address_for(Chain::Bitcoin, u32::MAX).is_err());

        let last = wallet.derive_address("ETH", 0x7fff_ffff).unwrap();
        assert_ne!(last, wallet.derive_address("ETH", 0).unwrap());
    }

    #[test]
    fn address_paths_follow_bip44() {
        assert_eq!(
            WalletCore::address_path(Chain::Tron, 3).unwrap().to_string(),
            "m/44'/195'/3'/0/0"
        );
        assert_eq!(
            WalletCore::address_path(Chain::Solana, 0).unwrap().to_string(),
            "m/44'/501'/0'/0/0"
        );
    }
}
