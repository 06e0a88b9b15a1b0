// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

// Key file management for the guardian node. The guardian signing key must
// be Secp256k1; the node identity key is Ed25519. Both are stored as base64
// encoded `flag || privkey`.

use std::path::Path;

pub use guardian_types::crypto::GuardianKey;

pub mod keygen {
    use super::*;
    use anyhow::{anyhow, Result};
    use fastcrypto::{secp256k1::Secp256k1KeyPair, traits::EncodeDecodeBase64};
    use std::path::PathBuf;

    /// Generate a new Secp256k1 guardian signing key and write it to file.
    pub fn generate_guardian_key_and_write_to_file(path: &PathBuf) -> Result<()> {
        use fastcrypto::traits::{KeyPair as _, ToFromBytes};

        let kp: Secp256k1KeyPair = guardian_types::crypto::get_key_pair();

        tracing::debug!("generated new Secp256k1 guardian key");
        tracing::debug!("public key (hex): {}", hex::encode(kp.public().as_bytes()));

        let guardian_address = calculate_eth_address(kp.public());
        tracing::debug!("guardian address: 0x{}", hex::encode(guardian_address));

        let base64_encoded = GuardianKey::Secp256k1(kp).encode_base64();
        std::fs::write(path, base64_encoded)
            .map_err(|err| anyhow!("Failed to write key to {:?}: {}", path, err))?;

        tracing::debug!("key written to: {:?}", path);
        Ok(())
    }

    /// Generate a new Ed25519 node identity key and write it to file.
    pub fn generate_node_key_and_write_to_file(path: &PathBuf) -> Result<()> {
        use fastcrypto::ed25519::Ed25519KeyPair;
        use fastcrypto::traits::{KeyPair as _, ToFromBytes};

        let kp: Ed25519KeyPair = guardian_types::crypto::get_key_pair();
        tracing::debug!("generated new Ed25519 node key");
        tracing::debug!("public key (hex): {}", hex::encode(kp.public().as_bytes()));

        let contents = GuardianKey::Ed25519(kp).encode_base64();
        std::fs::write(path, contents)
            .map_err(|err| anyhow!("Failed to write key to {:?}: {}", path, err))?;

        tracing::debug!("key written to: {:?}", path);
        Ok(())
    }

    /// Ethereum-style address of a Secp256k1 public key: keccak256 of the
    /// uncompressed point (without the 0x04 prefix), last 20 bytes.
    pub fn calculate_eth_address(pubkey: &fastcrypto::secp256k1::Secp256k1PublicKey) -> [u8; 20] {
        use fastcrypto::traits::ToFromBytes;
        use k256::elliptic_curve::sec1::ToEncodedPoint;
        use k256::PublicKey;
        use sha3::{Digest, Keccak256};

        let compressed_bytes = pubkey.as_bytes();
        let pk = PublicKey::from_sec1_bytes(compressed_bytes).expect("Invalid public key");
        let uncompressed = pk.to_encoded_point(false);

        let pubkey_bytes = &uncompressed.as_bytes()[1..];
        assert_eq!(
            pubkey_bytes.len(),
            64,
            "uncompressed public key must be 64 bytes"
        );

        let hash = Keccak256::digest(pubkey_bytes);

        let mut addr = [0u8; 20];
        addr.copy_from_slice(&hash[12..]);
        addr
    }
}

pub mod keypair_file {
    use super::*;
    use anyhow::{anyhow, Result};
    use fastcrypto::{secp256k1::Secp256k1KeyPair, traits::EncodeDecodeBase64};
    use std::path::PathBuf;

    // Read a GuardianKey from a file containing base64 `flag || privkey`.
    // If require_secp256k1 is true, only Secp256k1 keys are accepted.
    pub fn read_key(path: &PathBuf, require_secp256k1: bool) -> Result<GuardianKey> {
        if !path.exists() {
            return Err(anyhow!("Key file not found at path: {:?}", path));
        }

        let file_contents = std::fs::read_to_string(path)?;
        let contents = file_contents.as_str().trim();

        if let Ok(key) = GuardianKey::decode_base64(contents) {
            if require_secp256k1 && !matches!(key, GuardianKey::Secp256k1(_)) {
                return Err(anyhow!("Key is not Secp256k1"));
            }
            return Ok(key);
        }

        // Fall back to a raw base64 Secp256k1 private key without the flag.
        if let Ok(key) = Secp256k1KeyPair::decode_base64(contents) {
            return Ok(GuardianKey::Secp256k1(key));
        }

        Err(anyhow!(
            "Invalid key file format. Expected Base64 encoded key at {:?}",
            path
        ))
    }

    // Read the Ed25519 node identity key from a file.
    pub fn read_network_keypair_from_file<P: AsRef<Path>>(
        path: P,
    ) -> Result<fastcrypto::ed25519::Ed25519KeyPair> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let kp = GuardianKey::decode_base64(contents.trim())
            .map_err(|e| anyhow!("Failed to decode keypair: {}", e))?;
        if let GuardianKey::Ed25519(kp) = kp {
            Ok(kp)
        } else {
            Err(anyhow!("Invalid scheme for network keypair"))
        }
    }
}
