pub mod chains;
pub mod config;
pub mod derivation;
pub mod encoding;
pub mod error;
pub mod hash;
pub mod keys;
pub mod mnemonic;
pub mod rpc;
pub mod secure;
pub mod storage;
pub mod wallet;

pub use chains::{
    Chain,
    ChainAdapter,
    Token,
    TokenRegistry,
};
pub use config::{
    Network,
    WalletConfig,
};
pub use derivation::{
    DerivationPath,
    ExtendedKey,
};
pub use error::{
    ErrorKind,
    Result,
    WalletError,
};
pub use keys::KeyFormat;
pub use mnemonic::{
    MnemonicStrength,
    MnemonicError,
    SecureMnemonic,
    generate_entropy,
    generate_mnemonic,
    validate_mnemonic,
    mnemonic_to_seed,
};
pub use secure::SecureBuffer;
pub use storage::{
    KeyfileStore,
    SecretStore,
};
pub use wallet::WalletCore;
