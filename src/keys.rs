use zeroize::Zeroize;

use crate::config::Network;
use crate::derivation::{DerivationError, ExtendedKey};
use crate::secure::SecureBuffer;

const SERIALIZED_LEN: usize = 78;

const MAINNET_PRIVATE: [u8; 4] = [0x04, 0x88, 0xAD, 0xE4];
const MAINNET_PUBLIC: [u8; 4] = [0x04, 0x88, 0xB2, 0x1E];
const TESTNET_PRIVATE: [u8; 4] = [0x04, 0x35, 0x83, 0x94];
const TESTNET_PUBLIC: [u8; 4] = [0x04, 0x35, 0x87, 0xCF];

/// Serialization of a secp256k1 public point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// 33 bytes: parity prefix and X.
    Compressed,
    /// 65 bytes: `0x04 ‖ X ‖ Y`.
    Uncompressed,
}

/// Public key bytes of `key` in the requested format.
pub fn public_key_of(key: &ExtendedKey, format: KeyFormat) -> Result<Vec<u8>, DerivationError> {
    let public = key.public_key()?;
    Ok(match format {
        KeyFormat::Compressed => public.serialize().to_vec(),
        KeyFormat::Uncompressed => public.serialize_uncompressed().to_vec(),
    })
}

impl ExtendedKey {
    /// Serialize extended private key (xprv / tprv)
    pub fn to_xprv(&self, network: Network) -> Result<String, DerivationError> {
        if !self.is_private() {
            return Err(DerivationError::InvalidKey);
        }
        let version = match network {
            Network::Mainnet => MAINNET_PRIVATE,
            Network::Testnet => TESTNET_PRIVATE,
        };

        let mut data = self.serialize_header(version);
        // 0x00 byte + private key (33 bytes)
        data.push(0x00);
        data.extend_from_slice(self.key());

        let encoded = bs58::encode(&data).with_check().into_string();
        data.zeroize();
        Ok(encoded)
    }

    /// Serialize extended public key (xpub / tpub)
    pub fn to_xpub(&self, network: Network) -> Result<String, DerivationError> {
        let version = match network {
            Network::Mainnet => MAINNET_PUBLIC,
            Network::Testnet => TESTNET_PUBLIC,
        };

        let mut data = self.serialize_header(version);
        data.extend_from_slice(&self.public_key()?.serialize());

        Ok(bs58::encode(&data).with_check().into_string())
    }

    /// Parses an xprv/xpub/tprv/tpub string.
    pub fn from_base58(encoded: &str) -> Result<(Self, Network), DerivationError> {
        let mut data = bs58::decode(encoded)
            .with_check(None)
            .into_vec()
            .map_err(|e| DerivationError::InvalidSerialization(e.to_string()))?;

        let parsed = parse_serialized(&data);
        data.zeroize();
        parsed
    }

    fn serialize_header(&self, version: [u8; 4]) -> Vec<u8> {
        let mut data = Vec::with_capacity(SERIALIZED_LEN);
        data.extend_from_slice(&version);
        data.push(self.depth());
        data.extend_from_slice(&self.parent_fingerprint());
        data.extend_from_slice(&self.child_number().to_be_bytes());
        data.extend_from_slice(self.chain_code());
        data
    }
}

fn parse_serialized(data: &[u8]) -> Result<(ExtendedKey, Network), DerivationError> {
    if data.len() != SERIALIZED_LEN {
        return Err(DerivationError::InvalidSerialization(format!(
            "expected {} bytes, got {}",
            SERIALIZED_LEN,
            data.len()
        )));
    }

    let mut version = [0u8; 4];
    version.copy_from_slice(&data[0..4]);
    let (network, is_private) = match version {
        MAINNET_PRIVATE => (Network::Mainnet, true),
        MAINNET_PUBLIC => (Network::Mainnet, false),
        TESTNET_PRIVATE => (Network::Testnet, true),
        TESTNET_PUBLIC => (Network::Testnet, false),
        _ => {
            return Err(DerivationError::InvalidSerialization(
                "unknown version bytes".to_string(),
            ))
        }
    };

    let depth = data[4];
    let mut parent_fingerprint = [0u8; 4];
    parent_fingerprint.copy_from_slice(&data[5..9]);
    let mut child_number_bytes = [0u8; 4];
    child_number_bytes.copy_from_slice(&data[9..13]);
    let child_number = u32::from_be_bytes(child_number_bytes);
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&data[13..45]);

    if depth == 0 && (parent_fingerprint != [0u8; 4] || child_number != 0) {
        return Err(DerivationError::InvalidSerialization(
            "master key with non-zero parent data".to_string(),
        ));
    }

    let key = if is_private {
        if data[45] != 0x00 {
            return Err(DerivationError::InvalidSerialization(
                "private key must be prefixed with 0x00".to_string(),
            ));
        }
        SecureBuffer::from_slice(&data[46..78])
    } else {
        SecureBuffer::from_slice(&data[45..78])
    };

    let key = ExtendedKey::from_parts(
        key,
        chain_code,
        depth,
        parent_fingerprint,
        child_number,
        is_private,
    )?;
    chain_code.zeroize();
    Ok((key, network))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master() -> ExtendedKey {
        ExtendedKey::from_seed(&hex::decode("000102030405060708090a0b0c0d0e0f").unwrap()).unwrap()
    }

    #[test]
    fn master_xpub_matches_vector_1() {
        assert_eq!(
            master().to_xpub(Network::Mainnet).unwrap(),
            "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8"
        );
    }

    #[test]
    fn xprv_round_trip() {
        let key = master().derive_path("m/44'/0'/0'").unwrap();
        let encoded = key.to_xprv(Network::Mainnet).unwrap();
        assert!(encoded.starts_with("xprv"));

        let (parsed, network) = ExtendedKey::from_base58(&encoded).unwrap();
        assert_eq!(network, Network::Mainnet);
        assert!(parsed.is_private());
        assert_eq!(parsed.key(), key.key());
        assert_eq!(parsed.chain_code(), key.chain_code());
        assert_eq!(parsed.depth(), 3);
        assert_eq!(parsed.child_number(), key.child_number());
        assert_eq!(parsed.parent_fingerprint(), key.parent_fingerprint());
    }

    #[test]
    fn tpub_round_trip_gives_public_key() {
        let key = master().derive_path("m/0'/1").unwrap();
        let encoded = key.to_xpub(Network::Testnet).unwrap();
        assert!(encoded.starts_with("tpub"));

        let (parsed, network) = ExtendedKey::from_base58(&encoded).unwrap();
        assert_eq!(network, Network::Testnet);
        assert!(!parsed.is_private());
        assert_eq!(parsed.public_key().unwrap(), key.public_key().unwrap());
    }

    #[test]
    fn public_key_cannot_serialize_as_xprv() {
        let public = master().neuter().unwrap();
        assert!(public.to_xprv(Network::Mainnet).is_err());
    }

    #[test]
    fn corrupted_serialization_is_rejected() {
        let mut encoded = master().to_xpub(Network::Mainnet).unwrap();
        encoded.pop();
        encoded.push('1');
        assert!(ExtendedKey::from_base58(&encoded).is_err());
    }

    #[test]
    fn public_key_formats() {
        let key = master();
        let compressed = public_key_of(&key, KeyFormat::Compressed).unwrap();
        let uncompressed = public_key_of(&key, KeyFormat::Uncompressed).unwrap();

        assert_eq!(compressed.len(), 33);
        assert_eq!(uncompressed.len(), 65);
        assert_eq!(uncompressed[0], 0x04);
        assert_eq!(
            hex::encode(&compressed),
            "0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c2"
        );
        // Same X coordinate in both encodings
        assert_eq!(&compressed[1..], &uncompressed[1..33]);
    }

    #[test]
    fn public_key_of_public_key_is_identity() {
        let public = master().neuter().unwrap();
        assert_eq!(
            public_key_of(&public, KeyFormat::Compressed).unwrap(),
            public.key().to_vec()
        );
    }
}
