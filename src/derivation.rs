use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use sha2::Sha512;
use thiserror::Error;
use zeroize::Zeroize;

use crate::error::ErrorKind;
use crate::hash::hash160;
use crate::secure::SecureBuffer;

pub const HARDENED_BIT: u32 = 0x8000_0000;

const MASTER_HMAC_KEY: &[u8] = b"Bitcoin seed";
const PRIVATE_KEY_LEN: usize = 32;
const PUBLIC_KEY_LEN: usize = 33;

type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, Error)]
pub enum DerivationError {
    #[error("Invalid derivation path: {0}")]
    InvalidPath(String),
    #[error("Invalid child number: {0}")]
    InvalidChildNumber(String),
    #[error("Seed must be 16 to 64 bytes, got {0}")]
    InvalidSeedLength(usize),
    #[error("Invalid key material")]
    InvalidKey,
    #[error("Hardened derivation requires a private parent key")]
    HardenedFromPublic,
    #[error("Key derivation failed")]
    KeyDerivationFailed,
    #[error("HMAC operation failed")]
    HmacError,
    #[error("Invalid extended key serialization: {0}")]
    InvalidSerialization(String),
}

impl DerivationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DerivationError::HardenedFromPublic => ErrorKind::UnsupportedOperation,
            DerivationError::KeyDerivationFailed | DerivationError::HmacError => {
                ErrorKind::CryptographicFailure
            }
            _ => ErrorKind::InvalidInput,
        }
    }
}

/// A BIP32 extended key: private (32-byte scalar) or public (33-byte compressed point).
///
/// The key bytes live in a [`SecureBuffer`] and the chain code is wiped on drop.
pub struct ExtendedKey {
    key: SecureBuffer,
    chain_code: [u8; 32],
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    is_private: bool,
}

impl ExtendedKey {
    /// Creates a new master key from a seed
    pub fn from_seed(seed: &[u8]) -> Result<Self, DerivationError> {
        if seed.len() < 16 || seed.len() > 64 {
            return Err(DerivationError::InvalidSeedLength(seed.len()));
        }

        let mut hmac = HmacSha512::new_from_slice(MASTER_HMAC_KEY)
            .map_err(|_| DerivationError::HmacError)?;
        hmac.update(seed);
        let mut result = hmac.finalize().into_bytes();

        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&result[32..64]);

        // IL must be a valid scalar: non-zero and below the curve order
        let valid = SecretKey::from_slice(&result[0..32]).is_ok();
        let key = SecureBuffer::from_slice(&result[0..32]);
        result.as_mut_slice().zeroize();

        if !valid {
            chain_code.zeroize();
            return Err(DerivationError::KeyDerivationFailed);
        }

        Ok(ExtendedKey {
            key,
            chain_code,
            depth: 0,
            parent_fingerprint: [0u8; 4],
            child_number: 0,
            is_private: true,
        })
    }

    /// Assembles a key from already-validated parts.
    pub(crate) fn from_parts(
        key: SecureBuffer,
        chain_code: [u8; 32],
        depth: u8,
        parent_fingerprint: [u8; 4],
        child_number: u32,
        is_private: bool,
    ) -> Result<Self, DerivationError> {
        if is_private {
            if key.len() != PRIVATE_KEY_LEN || SecretKey::from_slice(key.as_slice()).is_err() {
                return Err(DerivationError::InvalidKey);
            }
        } else if key.len() != PUBLIC_KEY_LEN || PublicKey::from_slice(key.as_slice()).is_err() {
            return Err(DerivationError::InvalidKey);
        }

        Ok(ExtendedKey {
            key,
            chain_code,
            depth,
            parent_fingerprint,
            child_number,
            is_private,
        })
    }

    pub fn key(&self) -> &[u8] {
        self.key.as_slice()
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn parent_fingerprint(&self) -> [u8; 4] {
        self.parent_fingerprint
    }

    pub fn child_number(&self) -> u32 {
        self.child_number
    }

    pub fn is_private(&self) -> bool {
        self.is_private
    }

    pub fn is_hardened(&self) -> bool {
        self.child_number & HARDENED_BIT != 0
    }

    /// The secp256k1 public point of this key.
    pub fn public_key(&self) -> Result<PublicKey, DerivationError> {
        if self.is_private {
            let secp = Secp256k1::signing_only();
            let secret = SecretKey::from_slice(self.key.as_slice())
                .map_err(|_| DerivationError::InvalidKey)?;
            Ok(PublicKey::from_secret_key(&secp, &secret))
        } else {
            PublicKey::from_slice(self.key.as_slice()).map_err(|_| DerivationError::InvalidKey)
        }
    }

    /// First four bytes of HASH160 of the compressed public key.
    pub fn fingerprint(&self) -> Result<[u8; 4], DerivationError> {
        let hash = hash160(&self.public_key()?.serialize());
        let mut result = [0u8; 4];
        result.copy_from_slice(&hash[0..4]);
        Ok(result)
    }

    /// Derives a child key.
    ///
    /// The child is hardened when `hardened` is set or `index` already carries
    /// the top bit. Hardened children need a private parent.
    pub fn derive_child(&self, index: u32, hardened: bool) -> Result<Self, DerivationError> {
        let hardened = hardened || index & HARDENED_BIT != 0;
        let child_number = if hardened { index | HARDENED_BIT } else { index };

        let mut data = Vec::with_capacity(37);
        if hardened {
            if !self.is_private {
                return Err(DerivationError::HardenedFromPublic);
            }
            data.push(0);
            data.extend_from_slice(self.key.as_slice());
        } else {
            data.extend_from_slice(&self.public_key()?.serialize());
        }
        data.extend_from_slice(&child_number.to_be_bytes());

        let mut hmac = HmacSha512::new_from_slice(&self.chain_code)
            .map_err(|_| DerivationError::HmacError)?;
        hmac.update(&data);
        data.zeroize();
        let mut result = hmac.finalize().into_bytes();

        let mut left = [0u8; 32];
        let mut chain_code = [0u8; 32];
        left.copy_from_slice(&result[0..32]);
        chain_code.copy_from_slice(&result[32..64]);
        result.as_mut_slice().zeroize();

        let tweak = Scalar::from_be_bytes(left);
        left.zeroize();
        let tweak = tweak.map_err(|_| DerivationError::KeyDerivationFailed)?;

        let key = if self.is_private {
            // k_child = (IL + k_parent) mod n
            let parent = SecretKey::from_slice(self.key.as_slice())
                .map_err(|_| DerivationError::InvalidKey)?;
            let child = parent
                .add_tweak(&tweak)
                .map_err(|_| DerivationError::KeyDerivationFailed)?;
            let mut bytes = child.secret_bytes();
            let buffer = SecureBuffer::from_slice(&bytes);
            bytes.zeroize();
            buffer
        } else {
            // K_child = point(IL) + K_parent
            let secp = Secp256k1::verification_only();
            let parent = PublicKey::from_slice(self.key.as_slice())
                .map_err(|_| DerivationError::InvalidKey)?;
            let child = parent
                .add_exp_tweak(&secp, &tweak)
                .map_err(|_| DerivationError::KeyDerivationFailed)?;
            SecureBuffer::from_slice(&child.serialize())
        };

        let depth = self
            .depth
            .checked_add(1)
            .ok_or(DerivationError::KeyDerivationFailed)?;

        Ok(ExtendedKey {
            key,
            chain_code,
            depth,
            parent_fingerprint: self.fingerprint()?,
            child_number,
            is_private: self.is_private,
        })
    }

    /// Derives along a path string such as `m/44'/60'/0'/0/0`.
    pub fn derive_path(&self, path: &str) -> Result<Self, DerivationError> {
        path.parse::<DerivationPath>()?.derive(self)
    }

    /// The public extended key with the same chain code and metadata.
    pub fn neuter(&self) -> Result<Self, DerivationError> {
        let public = self.public_key()?;
        Ok(ExtendedKey {
            key: SecureBuffer::from_slice(&public.serialize()),
            chain_code: self.chain_code,
            depth: self.depth,
            parent_fingerprint: self.parent_fingerprint,
            child_number: self.child_number,
            is_private: false,
        })
    }

    /// Wipes the key bytes and chain code in place.
    pub fn zeroize(&mut self) {
        self.key.clear();
        self.chain_code.zeroize();
    }
}

impl Drop for ExtendedKey {
    fn drop(&mut self) {
        self.chain_code.zeroize();
    }
}

impl fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedKey")
            .field("depth", &self.depth)
            .field("parent_fingerprint", &hex::encode(self.parent_fingerprint))
            .field("child_number", &self.child_number)
            .field("is_private", &self.is_private)
            .finish_non_exhaustive()
    }
}

/// Represents a BIP32 derivation path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationPath {
    indices: Vec<u32>,
}

impl DerivationPath {
    pub fn new(indices: Vec<u32>) -> Self {
        DerivationPath { indices }
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Derives a key following this path
    pub fn derive(&self, root: &ExtendedKey) -> Result<ExtendedKey, DerivationError> {
        let mut indices = self.indices.iter();
        let first = match indices.next() {
            Some(&index) => root.derive_child(index, false)?,
            None => return copy_key(root),
        };

        indices.try_fold(first, |key, &index| key.derive_child(index, false))
    }
}

impl FromStr for DerivationPath {
    type Err = DerivationError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let trimmed = path.trim();
        let body = if trimmed.eq_ignore_ascii_case("m") {
            ""
        } else if trimmed.starts_with("m/") || trimmed.starts_with("M/") {
            &trimmed[2..]
        } else {
            trimmed
        };

        if body.is_empty() {
            return Ok(DerivationPath { indices: Vec::new() });
        }

        let indices = body
            .split('/')
            .map(|segment| {
                if segment.is_empty() {
                    Err(DerivationError::InvalidPath(path.to_string()))
                } else {
                    parse_segment(segment)
                }
            })
            .collect::<Result<Vec<u32>, _>>()?;

        Ok(DerivationPath { indices })
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for &index in &self.indices {
            if index & HARDENED_BIT != 0 {
                write!(f, "/{}'", index & !HARDENED_BIT)?;
            } else {
                write!(f, "/{}", index)?;
            }
        }
        Ok(())
    }
}

fn parse_segment(component: &str) -> Result<u32, DerivationError> {
    let hardened = component.ends_with('\'') || component.ends_with('h') || component.ends_with('H');
    let index_str = if hardened {
        &component[..component.len() - 1]
    } else {
        component
    };

    if index_str.is_empty() || !index_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DerivationError::InvalidPath(component.to_string()));
    }

    let index = index_str
        .parse::<u32>()
        .map_err(|_| DerivationError::InvalidChildNumber(component.to_string()))?;

    if hardened {
        if index & HARDENED_BIT != 0 {
            return Err(DerivationError::InvalidChildNumber(component.to_string()));
        }
        Ok(index | HARDENED_BIT)
    } else {
        Ok(index)
    }
}

fn copy_key(key: &ExtendedKey) -> Result<ExtendedKey, DerivationError> {
    ExtendedKey::from_parts(
        SecureBuffer::from_slice(key.key()),
        key.chain_code,
        key.depth,
        key.parent_fingerprint,
        key.child_number,
        key.is_private,
    )
}

/// Utility functions for common derivation paths
pub mod paths {
    use super::{DerivationError, DerivationPath, HARDENED_BIT};

    /// BIP44 - Multi-Account Hierarchy for Deterministic Wallets
    /// Format: m/44'/coin_type'/account'/change/address_index
    ///
    /// Every index must be below 2^31; the hardened bit is added here.
    pub fn bip44(
        coin_type: u32,
        account: u32,
        change: bool,
        address_index: u32,
    ) -> Result<DerivationPath, DerivationError> {
        for (name, index) in [("coin type", coin_type), ("account", account), ("address index", address_index)] {
            if index & HARDENED_BIT != 0 {
                return Err(DerivationError::InvalidChildNumber(format!("{} {}", name, index)));
            }
        }
        Ok(DerivationPath::new(vec![
            44 | HARDENED_BIT,
            coin_type | HARDENED_BIT,
            account | HARDENED_BIT,
            u32::from(change),
            address_index,
        ]))
    }

    pub const BITCOIN: u32 = 0;
    pub const ETHEREUM: u32 = 60;
    pub const TRON: u32 = 195;
    pub const SOLANA: u32 = 501;
}
