//! Hash functions shared by the key tree and the chain adapters.

use bitcoin_hashes::{hash160, ripemd160 as ripemd, sha256d as sha256d_hash, Hash};
use sha2::{Digest, Sha256};
use sha3::Keccak256;

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 applied twice, as used by Base58Check checksums and Bitcoin sighashes.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let hash = sha256d_hash::Hash::hash(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hash[..]);
    out
}

pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    let hash = ripemd::Hash::hash(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[..]);
    out
}

/// RIPEMD-160 of SHA-256.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let hash = hash160::Hash::hash(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[..]);
    out
}

/// Keccak-256 with the original Keccak padding (0x01), not NIST SHA3-256 (0x06).
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak256_of_empty_input() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn keccak256_differs_from_sha3() {
        // SHA3-256("") = a7ffc6f8...
        assert_ne!(
            hex::encode(keccak256(b"")),
            "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a"
        );
    }

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256d_is_sha256_twice() {
        let data = b"hello";
        assert_eq!(sha256d(data), sha256(&sha256(data)));
    }

    #[test]
    fn hash160_is_ripemd_of_sha256() {
        let data = b"wallet";
        assert_eq!(hash160(data), ripemd160(&sha256(data)));
    }

    #[test]
    fn hash160_of_generator_point() {
        let pubkey =
            hex::decode("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798")
                .unwrap();
        assert_eq!(
            hex::encode(hash160(&pubkey)),
            "751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }
}
