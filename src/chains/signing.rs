use secp256k1::{Message, Secp256k1, SecretKey};

use crate::error::{Result, WalletError};

fn secret_key(private_key: &[u8]) -> Result<SecretKey> {
    SecretKey::from_slice(private_key)
        .map_err(|_| WalletError::InvalidInput("private key must be a 32-byte secp256k1 scalar".into()))
}

fn message(digest: &[u8; 32]) -> Result<Message> {
    Message::from_slice(digest).map_err(|_| WalletError::InvalidInput("digest must be 32 bytes".into()))
}

/// Recoverable ECDSA over `digest` as 65 bytes `r ‖ s ‖ v`, with
/// `v = recovery_id + v_offset`.
pub(crate) fn sign_recoverable(digest: &[u8; 32], private_key: &[u8], v_offset: u8) -> Result<[u8; 65]> {
    let secp = Secp256k1::signing_only();
    let signature = secp.sign_ecdsa_recoverable(&message(digest)?, &secret_key(private_key)?);
    let (recovery_id, compact) = signature.serialize_compact();

    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&compact);
    // recovery ids are 0..=3
    out[64] = recovery_id.to_i32() as u8 + v_offset;
    Ok(out)
}

/// DER-encoded low-S ECDSA signature over `digest`.
pub(crate) fn sign_der(digest: &[u8; 32], private_key: &[u8]) -> Result<Vec<u8>> {
    let secp = Secp256k1::signing_only();
    let signature = secp.sign_ecdsa(&message(digest)?, &secret_key(private_key)?);
    Ok(signature.serialize_der().to_vec())
}
