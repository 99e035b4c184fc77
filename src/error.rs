use thiserror::Error;

use crate::config::ConfigError;
use crate::derivation::DerivationError;
use crate::encoding::EncodingError;
use crate::mnemonic::MnemonicError;
use crate::rpc::RpcError;
use crate::storage::StorageError;

/// The five failure categories every wallet operation reports through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad mnemonic, malformed path, wrong key size, unknown chain.
    InvalidInput,
    /// Authentication tag mismatch or a curve operation that cannot complete.
    CryptographicFailure,
    /// Operation the key material or chain cannot perform.
    UnsupportedOperation,
    /// File system errors.
    ResourceFailure,
    /// RPC timeout, transport error or non-success response.
    NetworkFailure,
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error(transparent)]
    Mnemonic(#[from] MnemonicError),
    #[error(transparent)]
    Derivation(#[from] DerivationError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("Wallet is not initialized")]
    NotInitialized,
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::Mnemonic(e) => e.kind(),
            WalletError::Derivation(e) => e.kind(),
            WalletError::Encoding(_) => ErrorKind::InvalidInput,
            WalletError::Storage(e) => e.kind(),
            WalletError::Rpc(e) => e.kind(),
            WalletError::Config(e) => e.kind(),
            WalletError::InvalidInput(_) => ErrorKind::InvalidInput,
            WalletError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            WalletError::NotInitialized => ErrorKind::UnsupportedOperation,
        }
    }
}

pub type Result<T> = std::result::Result<T, WalletError>;
