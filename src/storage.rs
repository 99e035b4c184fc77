use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::error::ErrorKind;
use crate::secure::SecureBuffer;

pub const KEYFILE_VERSION: u32 = 1;
pub const KEYFILE_EXTENSION: &str = "keyfile";
pub const CIPHER_NAME: &str = "aes-256-gcm";
pub const KDF_NAME: &str = "pbkdf2";
pub const MIN_KDF_ITERATIONS: u32 = 100_000;

const SALT_LEN: usize = 16;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid keyfile format: {0}")]
    InvalidFormat(String),
    #[error("KDF iterations {0} below the minimum of {}", MIN_KDF_ITERATIONS)]
    WeakKdf(u32),
    #[error("Invalid keyfile id: {0}")]
    InvalidId(String),
    #[error("Failed to encrypt data")]
    EncryptionFailed,
    #[error("Decryption failed: wrong password or corrupted keyfile")]
    DecryptionFailed,
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Io(_) => ErrorKind::ResourceFailure,
            StorageError::EncryptionFailed | StorageError::DecryptionFailed => {
                ErrorKind::CryptographicFailure
            }
            StorageError::InvalidFormat(_)
            | StorageError::WeakKdf(_)
            | StorageError::InvalidId(_) => ErrorKind::InvalidInput,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::InvalidFormat(err.to_string())
    }
}

/// On-disk keyfile document. Field names are part of the file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyfileEnvelope {
    pub version: u32,
    pub created_at: i64,
    pub updated_at: i64,
    pub crypto: CryptoParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoParams {
    pub cipher: String,
    pub ciphertext: String,
    pub iv: String,
    pub tag: String,
    pub kdf: String,
    pub kdfparams: KdfParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfParams {
    pub iterations: u32,
    pub salt: String,
}

/// The unencrypted header fields of a keyfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyfileMetadata {
    pub version: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Password-based AES-256-GCM encryption of a secret into a keyfile envelope.
#[derive(Debug, Clone, Copy)]
pub struct SecretStore {
    iterations: u32,
}

impl Default for SecretStore {
    fn default() -> Self {
        SecretStore {
            iterations: MIN_KDF_ITERATIONS,
        }
    }
}

impl SecretStore {
    pub fn new(iterations: u32) -> Result<Self, StorageError> {
        if iterations < MIN_KDF_ITERATIONS {
            return Err(StorageError::WeakKdf(iterations));
        }
        Ok(SecretStore { iterations })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Encrypts `plaintext` under `password` and writes a fresh envelope to `path`.
    pub fn encrypt_and_save<P: AsRef<Path>>(
        &self,
        path: P,
        plaintext: &[u8],
        password: &str,
    ) -> Result<(), StorageError> {
        let now = Utc::now().timestamp_millis();
        let envelope = self.seal(plaintext, password, now, now)?;
        write_envelope(path.as_ref(), &envelope)?;
        info!(path = %path.as_ref().display(), "keyfile saved");
        Ok(())
    }

    /// Reads the envelope at `path` and returns the plaintext.
    ///
    /// A wrong password and a tampered file fail the same way; no plaintext is
    /// returned unless the authentication tag verifies.
    pub fn load_and_decrypt<P: AsRef<Path>>(
        &self,
        path: P,
        password: &str,
    ) -> Result<SecureBuffer, StorageError> {
        let envelope = read_envelope(path.as_ref())?;
        let plaintext = open(&envelope, password).map_err(|e| {
            warn!(path = %path.as_ref().display(), "keyfile could not be decrypted");
            e
        })?;
        debug!(path = %path.as_ref().display(), "keyfile decrypted");
        Ok(plaintext)
    }

    /// Re-encrypts the keyfile under a new password, keeping its creation time.
    pub fn change_password<P: AsRef<Path>>(
        &self,
        path: P,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), StorageError> {
        let envelope = read_envelope(path.as_ref())?;
        let plaintext = open(&envelope, old_password)?;

        let updated = Utc::now().timestamp_millis();
        let resealed = self.seal(plaintext.as_slice(), new_password, envelope.created_at, updated)?;
        write_envelope(path.as_ref(), &resealed)?;
        info!(path = %path.as_ref().display(), "keyfile password changed");
        Ok(())
    }

    fn seal(
        &self,
        plaintext: &[u8],
        password: &str,
        created_at: i64,
        updated_at: i64,
    ) -> Result<KeyfileEnvelope, StorageError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let mut key = derive_key(password, &salt, self.iterations);
        let sealed = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| StorageError::EncryptionFailed)
            .and_then(|cipher| {
                cipher
                    .encrypt(Nonce::from_slice(&iv), plaintext)
                    .map_err(|_| StorageError::EncryptionFailed)
            });
        key.zeroize();
        let sealed = sealed?;

        // aes-gcm appends the tag to the ciphertext
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        Ok(KeyfileEnvelope {
            version: KEYFILE_VERSION,
            created_at,
            updated_at,
            crypto: CryptoParams {
                cipher: CIPHER_NAME.to_string(),
                ciphertext: STANDARD.encode(ciphertext),
                iv: STANDARD.encode(iv),
                tag: STANDARD.encode(tag),
                kdf: KDF_NAME.to_string(),
                kdfparams: KdfParams {
                    iterations: self.iterations,
                    salt: STANDARD.encode(salt),
                },
            },
        })
    }
}

pub fn encrypt_and_save<P: AsRef<Path>>(
    path: P,
    plaintext: &[u8],
    password: &str,
) -> Result<(), StorageError> {
    SecretStore::default().encrypt_and_save(path, plaintext, password)
}

pub fn load_and_decrypt<P: AsRef<Path>>(path: P, password: &str) -> Result<SecureBuffer, StorageError> {
    SecretStore::default().load_and_decrypt(path, password)
}

/// Structural check only: the file is a JSON object carrying `version`,
/// `crypto.cipher`, `crypto.ciphertext` and `crypto.kdf`.
pub fn validate_keyfile<P: AsRef<Path>>(path: P) -> bool {
    let contents = match fs::read_to_string(path.as_ref()) {
        Ok(contents) => contents,
        Err(e) => {
            debug!(path = %path.as_ref().display(), error = %e, "keyfile unreadable");
            return false;
        }
    };
    let value: serde_json::Value = match serde_json::from_str(&contents) {
        Ok(value) => value,
        Err(_) => return false,
    };

    let crypto = &value["crypto"];
    value.get("version").is_some()
        && crypto.get("cipher").is_some()
        && crypto.get("ciphertext").is_some()
        && crypto.get("kdf").is_some()
}

pub fn get_keyfile_metadata<P: AsRef<Path>>(path: P) -> Result<KeyfileMetadata, StorageError> {
    let envelope = read_envelope(path.as_ref())?;
    Ok(KeyfileMetadata {
        version: envelope.version,
        created_at: envelope.created_at,
        updated_at: envelope.updated_at,
    })
}

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, StorageError> {
    STANDARD
        .decode(value)
        .map_err(|e| StorageError::InvalidFormat(format!("{}: {}", name, e)))
}

fn open(envelope: &KeyfileEnvelope, password: &str) -> Result<SecureBuffer, StorageError> {
    let crypto = &envelope.crypto;
    if crypto.cipher != CIPHER_NAME {
        return Err(StorageError::InvalidFormat(format!("unsupported cipher {}", crypto.cipher)));
    }
    if crypto.kdf != KDF_NAME {
        return Err(StorageError::InvalidFormat(format!("unsupported kdf {}", crypto.kdf)));
    }
    if crypto.kdfparams.iterations < MIN_KDF_ITERATIONS {
        return Err(StorageError::WeakKdf(crypto.kdfparams.iterations));
    }

    let salt = decode_field("salt", &crypto.kdfparams.salt)?;
    let iv = decode_field("iv", &crypto.iv)?;
    let tag = decode_field("tag", &crypto.tag)?;
    let mut sealed = decode_field("ciphertext", &crypto.ciphertext)?;

    if salt.is_empty() {
        return Err(StorageError::InvalidFormat("empty salt".to_string()));
    }
    if iv.len() != IV_LEN {
        return Err(StorageError::InvalidFormat(format!("iv must be {} bytes", IV_LEN)));
    }
    if tag.len() != TAG_LEN {
        return Err(StorageError::InvalidFormat(format!("tag must be {} bytes", TAG_LEN)));
    }
    sealed.extend_from_slice(&tag);

    let mut key = derive_key(password, &salt, crypto.kdfparams.iterations);
    let result = Aes256Gcm::new_from_slice(&key)
        .map_err(|_| StorageError::DecryptionFailed)
        .and_then(|cipher| {
            cipher
                .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
                .map_err(|_| StorageError::DecryptionFailed)
        });
    key.zeroize();

    Ok(SecureBuffer::from_vec(result?))
}

fn read_envelope(path: &Path) -> Result<KeyfileEnvelope, StorageError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Writes the envelope to a sibling temp file, syncs it, then renames it over
/// `path`. The previous keyfile stays intact until the rename.
fn write_envelope(path: &Path, envelope: &KeyfileEnvelope) -> Result<(), StorageError> {
    let json = serde_json::to_string_pretty(envelope)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    // tempfile creates the file owner-only on unix
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(json.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}

/// A keyfile found by [`KeyfileStore::scan`].
#[derive(Debug, Clone)]
pub struct KeyfileEntry {
    pub path: PathBuf,
    pub file_name: String,
    pub modified: DateTime<Utc>,
    pub is_valid: bool,
}

/// A directory of `<id>.keyfile` files.
pub struct KeyfileStore {
    dir: PathBuf,
    secrets: SecretStore,
}

impl KeyfileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        Self::with_secret_store(dir, SecretStore::default())
    }

    pub fn with_secret_store<P: AsRef<Path>>(dir: P, secrets: SecretStore) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(KeyfileStore { dir, secrets })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &str) -> Result<PathBuf, StorageError> {
        if id.is_empty()
            || id == "."
            || id == ".."
            || id.contains(|c| c == '/' || c == '\\' || c == '\0')
        {
            return Err(StorageError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{}.{}", id, KEYFILE_EXTENSION)))
    }

    pub fn save(&self, id: &str, plaintext: &[u8], password: &str) -> Result<PathBuf, StorageError> {
        let path = self.path_for(id)?;
        self.secrets.encrypt_and_save(&path, plaintext, password)?;
        Ok(path)
    }

    pub fn load(&self, id: &str, password: &str) -> Result<SecureBuffer, StorageError> {
        self.secrets.load_and_decrypt(self.path_for(id)?, password)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.path_for(id).map(|path| path.is_file()).unwrap_or(false)
    }

    pub fn delete(&self, id: &str) -> Result<(), StorageError> {
        let path = self.path_for(id)?;
        if path.exists() {
            fs::remove_file(&path)?;
            info!(path = %path.display(), "keyfile deleted");
        }
        Ok(())
    }

    /// Lists `*.keyfile` files in the directory, newest first.
    pub fn scan(&self) -> Result<Vec<KeyfileEntry>, StorageError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some(KEYFILE_EXTENSION)
            {
                continue;
            }

            let modified = DateTime::<Utc>::from(entry.metadata()?.modified()?);
            entries.push(KeyfileEntry {
                file_name: entry.file_name().to_string_lossy().into_owned(),
                is_valid: validate_keyfile(&path),
                modified,
                path,
            });
        }

        entries.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(entries)
    }
}
