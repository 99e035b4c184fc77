//! Address encodings: Base58, Base58Check and Bech32 (segwit).

use bech32::{u5, FromBase32, ToBase32, Variant};
use thiserror::Error;

use crate::hash::sha256d;

const CHECKSUM_LEN: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Invalid Base58 string: {0}")]
    InvalidBase58(String),
    #[error("Base58Check checksum mismatch")]
    InvalidChecksum,
    #[error("Invalid length: expected at least {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("Invalid Bech32 string: {0}")]
    InvalidBech32(String),
    #[error("Invalid witness program")]
    InvalidWitnessProgram,
}

/// Base58 with the Bitcoin alphabet. Each leading zero byte becomes a leading '1'.
pub fn encode_base58(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

pub fn decode_base58(encoded: &str) -> Result<Vec<u8>, EncodingError> {
    bs58::decode(encoded)
        .into_vec()
        .map_err(|e| EncodingError::InvalidBase58(e.to_string()))
}

/// `Base58(version ‖ payload ‖ SHA256d(version ‖ payload)[0..4])`
pub fn encode_base58check(payload: &[u8], version: u8) -> String {
    let mut data = Vec::with_capacity(1 + payload.len() + CHECKSUM_LEN);
    data.push(version);
    data.extend_from_slice(payload);

    let checksum = sha256d(&data);
    data.extend_from_slice(&checksum[..CHECKSUM_LEN]);

    encode_base58(&data)
}

/// Verifies the checksum and returns `(version, payload)`.
pub fn decode_base58check(encoded: &str) -> Result<(u8, Vec<u8>), EncodingError> {
    let data = decode_base58(encoded)?;
    if data.len() < 1 + CHECKSUM_LEN {
        return Err(EncodingError::InvalidLength {
            expected: 1 + CHECKSUM_LEN,
            actual: data.len(),
        });
    }

    let (body, checksum) = data.split_at(data.len() - CHECKSUM_LEN);
    if checksum != &sha256d(body)[..CHECKSUM_LEN] {
        return Err(EncodingError::InvalidChecksum);
    }

    Ok((body[0], body[1..].to_vec()))
}

/// Encodes a version 0 witness program (P2WPKH / P2WSH) with the Bech32 checksum.
pub fn encode_segwit_v0(hrp: &str, program: &[u8]) -> Result<String, EncodingError> {
    if program.len() != 20 && program.len() != 32 {
        return Err(EncodingError::InvalidWitnessProgram);
    }

    let mut data = vec![u5::try_from_u8(0).map_err(|e| EncodingError::InvalidBech32(e.to_string()))?];
    data.extend(program.to_base32());

    bech32::encode(hrp, data, Variant::Bech32)
        .map_err(|e| EncodingError::InvalidBech32(e.to_string()))
}

/// Decodes a segwit address into `(hrp, witness_version, program)`.
///
/// Version 0 must carry the Bech32 checksum, later versions Bech32m.
pub fn decode_segwit(address: &str) -> Result<(String, u8, Vec<u8>), EncodingError> {
    let (hrp, data, variant) =
        bech32::decode(address).map_err(|e| EncodingError::InvalidBech32(e.to_string()))?;

    let (version, program) = data
        .split_first()
        .ok_or(EncodingError::InvalidWitnessProgram)?;
    let version = version.to_u8();

    let expected_variant = if version == 0 { Variant::Bech32 } else { Variant::Bech32m };
    if version > 16 || variant != expected_variant {
        return Err(EncodingError::InvalidWitnessProgram);
    }

    let program = Vec::<u8>::from_base32(program)
        .map_err(|e| EncodingError::InvalidBech32(e.to_string()))?;

    if program.len() < 2 || program.len() > 40 {
        return Err(EncodingError::InvalidWitnessProgram);
    }
    if version == 0 && program.len() != 20 && program.len() != 32 {
        return Err(EncodingError::InvalidWitnessProgram);
    }

    Ok((hrp, version, program))
}
