use bip39::{Language, Mnemonic};
use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use thiserror::Error;
use zeroize::Zeroize;

use crate::error::ErrorKind;
use crate::secure::SecureBuffer;

pub const SEED_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MnemonicStrength {
    Words12,
    Words15,
    Words18,
    Words21,
    Words24,
}

impl MnemonicStrength {
    pub fn from_word_count(count: usize) -> Result<Self, MnemonicError> {
        match count {
            12 => Ok(MnemonicStrength::Words12),
            15 => Ok(MnemonicStrength::Words15),
            18 => Ok(MnemonicStrength::Words18),
            21 => Ok(MnemonicStrength::Words21),
            24 => Ok(MnemonicStrength::Words24),
            other => Err(MnemonicError::UnsupportedWordCount(other)),
        }
    }

    pub fn word_count(&self) -> usize {
        match self {
            MnemonicStrength::Words12 => 12,
            MnemonicStrength::Words15 => 15,
            MnemonicStrength::Words18 => 18,
            MnemonicStrength::Words21 => 21,
            MnemonicStrength::Words24 => 24,
        }
    }

    /// Entropy size: 32 bits for every three words.
    pub fn entropy_bits(&self) -> usize {
        self.word_count() / 3 * 32
    }
}

#[derive(Debug, Error)]
pub enum MnemonicError {
    #[error("Unsupported mnemonic word count: {0}")]
    UnsupportedWordCount(usize),
    #[error("Invalid mnemonic phrase")]
    InvalidMnemonic,
    #[error("Failed to generate entropy")]
    EntropyGenerationFailed,
}

impl MnemonicError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MnemonicError::UnsupportedWordCount(_) | MnemonicError::InvalidMnemonic => {
                ErrorKind::InvalidInput
            }
            MnemonicError::EntropyGenerationFailed => ErrorKind::CryptographicFailure,
        }
    }
}

/// A checksummed English BIP39 mnemonic.
pub struct SecureMnemonic {
    mnemonic: Mnemonic,
}

impl SecureMnemonic {
    pub fn generate(strength: MnemonicStrength) -> Result<Self, MnemonicError> {
        Self::generate_with_rng(strength, &mut OsRng)
    }

    /// Generates a mnemonic from caller-supplied randomness.
    pub fn generate_with_rng<R>(strength: MnemonicStrength, rng: &mut R) -> Result<Self, MnemonicError>
    where
        R: RngCore + CryptoRng,
    {
        let mut entropy = generate_entropy(strength.entropy_bits() / 8, rng)?;

        let result = Mnemonic::from_entropy_in(Language::English, &entropy)
            .map(|mnemonic| Self { mnemonic })
            .map_err(|_| MnemonicError::EntropyGenerationFailed);

        entropy.zeroize();
        result
    }

    /// Parses a phrase after NFKD normalization, checking words, length and checksum.
    pub fn from_phrase(phrase: &str) -> Result<Self, MnemonicError> {
        match Mnemonic::parse_in(Language::English, phrase) {
            Ok(mnemonic) => Ok(Self { mnemonic }),
            Err(_) => Err(MnemonicError::InvalidMnemonic),
        }
    }

    pub fn phrase(&self) -> String {
        self.mnemonic.to_string()
    }

    pub fn word_count(&self) -> usize {
        self.mnemonic.word_count()
    }

    /// PBKDF2-HMAC-SHA512, 2048 rounds, salt `"mnemonic" + passphrase`.
    pub fn to_seed(&self, passphrase: &str) -> SecureBuffer {
        let mut seed = self.mnemonic.to_seed(passphrase);
        let buffer = SecureBuffer::from_slice(&seed);
        seed.zeroize();
        buffer
    }
}

/// Returns a space-separated phrase of `word_count` words.
pub fn generate_mnemonic(word_count: usize) -> Result<String, MnemonicError> {
    let strength = MnemonicStrength::from_word_count(word_count)?;
    Ok(SecureMnemonic::generate(strength)?.phrase())
}

pub fn validate_mnemonic(phrase: &str) -> bool {
    SecureMnemonic::from_phrase(phrase).is_ok()
}

pub fn mnemonic_to_seed(phrase: &str, passphrase: &str) -> Result<SecureBuffer, MnemonicError> {
    Ok(SecureMnemonic::from_phrase(phrase)?.to_seed(passphrase))
}

pub fn generate_entropy<R>(byte_length: usize, rng: &mut R) -> Result<Vec<u8>, MnemonicError>
where
    R: RngCore + CryptoRng,
{
    let mut bytes = vec![0u8; byte_length];
    rng.try_fill_bytes(&mut bytes)
        .map_err(|_| MnemonicError::EntropyGenerationFailed)?;
    Ok(bytes)
}
