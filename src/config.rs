use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::ErrorKind;
use crate::storage::MIN_KDF_ITERATIONS;

pub const ENV_NETWORK: &str = "HD_WALLET_NETWORK";
pub const ENV_RPC_CONFIG: &str = "HD_WALLET_RPC_CONFIG";
pub const ENV_TIMEOUT_SECS: &str = "HD_WALLET_TIMEOUT_SECS";
pub const ENV_KEYFILE_DIR: &str = "HD_WALLET_KEYFILE_DIR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => f.write_str("mainnet"),
            Network::Testnet => f.write_str("testnet"),
        }
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            other => Err(ConfigError::Invalid(format!("unknown network {}", other))),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Io(_) => ErrorKind::ResourceFailure,
            ConfigError::Parse(_) | ConfigError::Invalid(_) => ErrorKind::InvalidInput,
        }
    }
}

/// Wallet settings, read from TOML and overridable from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    #[serde(default)]
    pub network: Network,

    /// JSON endpoint list; built-in endpoints are used when unset
    #[serde(default)]
    pub rpc_config_path: Option<PathBuf>,

    #[serde(default = "WalletConfig::default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub keyfile_dir: Option<PathBuf>,

    /// PBKDF2 iteration count for new keyfiles
    #[serde(default = "WalletConfig::default_kdf_iterations")]
    pub kdf_iterations: u32,
}

impl WalletConfig {
    fn default_request_timeout_secs() -> u64 {
        15
    }

    fn default_kdf_iterations() -> u32 {
        MIN_KDF_ITERATIONS
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: WalletConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file, then applies environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let mut config: WalletConfig = toml::from_str(&contents)?;
        config.apply_env()?;
        config.validate()?;
        debug!(path = %path.as_ref().display(), network = %config.network, "configuration loaded");
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = WalletConfig::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`, keyed by the `HD_WALLET_*` names.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(network) = lookup(ENV_NETWORK) {
            self.network = network.parse()?;
        }
        if let Some(path) = lookup(ENV_RPC_CONFIG) {
            self.rpc_config_path = Some(PathBuf::from(path));
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            self.request_timeout_secs = secs
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{} must be an integer", ENV_TIMEOUT_SECS)))?;
        }
        if let Some(dir) = lookup(ENV_KEYFILE_DIR) {
            self.keyfile_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be positive".into()));
        }
        if self.kdf_iterations < MIN_KDF_ITERATIONS {
            return Err(ConfigError::Invalid(format!(
                "kdf_iterations must be at least {}",
                MIN_KDF_ITERATIONS
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        WalletConfig {
            network: Network::default(),
            rpc_config_path: None,
            request_timeout_secs: Self::default_request_timeout_secs(),
            keyfile_dir: None,
            kdf_iterations: Self::default_kdf_iterations(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = WalletConfig::from_toml_str("").unwrap();
        assert_eq!(config, WalletConfig::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.kdf_iterations, 100_000);
    }

    #[test]
    fn parses_all_fields() {
        let config = WalletConfig::from_toml_str(
            r#"
            network = "testnet"
            rpc_config_path = "/etc/wallet/rpc.json"
            request_timeout_secs = 5
            keyfile_dir = "/var/lib/wallet"
            kdf_iterations = 250000
            "#,
        )
        .unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.rpc_config_path.unwrap(), PathBuf::from("/etc/wallet/rpc.json"));
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.kdf_iterations, 250_000);
    }

    #[test]
    fn rejects_weak_settings() {
        assert!(WalletConfig::from_toml_str("kdf_iterations = 1000").is_err());
        assert!(WalletConfig::from_toml_str("request_timeout_secs = 0").is_err());
        assert!(WalletConfig::from_toml_str("network = \"regtest\"").is_err());
    }

    #[test]
    fn overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = [
            (ENV_NETWORK, "TESTNET"),
            (ENV_TIMEOUT_SECS, "30"),
            (ENV_KEYFILE_DIR, "/tmp/keys"),
        ]
        .into_iter()
        .collect();

        let mut config = WalletConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.keyfile_dir.unwrap(), PathBuf::from("/tmp/keys"));
        assert!(config.rpc_config_path.is_none());
    }

    #[test]
    fn bad_override_is_reported() {
        let mut config = WalletConfig::default();
        let err = config
            .apply_overrides(|name| (name == ENV_TIMEOUT_SECS).then(|| "soon".to_string()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
