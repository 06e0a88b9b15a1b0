// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

use fastcrypto::{
    ed25519::Ed25519KeyPair,
    error::FastCryptoError,
    secp256k1::Secp256k1KeyPair,
    traits::{EncodeDecodeBase64, KeyPair as KeyPairTraits, ToFromBytes},
};

/// Network (node identity) keys are Ed25519.
pub type NetworkKeyPair = Ed25519KeyPair;

/// Generic key pair generation.
pub fn get_key_pair<KP: KeyPairTraits>() -> KP {
    let mut rng = rand::thread_rng();
    KP::generate(&mut rng)
}

/// Signature scheme flags used in key files.
const ED25519_FLAG: u8 = 0x00;
const SECP256K1_FLAG: u8 = 0x01;

/// A key pair as stored on disk: base64 of `flag || privkey`.
///
/// The guardian signing key must be Secp256k1 (observation signatures are
/// recoverable ECDSA over keccak digests); the node identity key is Ed25519.
#[derive(Debug)]
pub enum GuardianKey {
    Ed25519(Ed25519KeyPair),
    Secp256k1(Secp256k1KeyPair),
}

impl GuardianKey {
    fn scheme_flag(&self) -> u8 {
        match self {
            GuardianKey::Ed25519(_) => ED25519_FLAG,
            GuardianKey::Secp256k1(_) => SECP256K1_FLAG,
        }
    }

    pub fn public_bytes(&self) -> Vec<u8> {
        match self {
            GuardianKey::Ed25519(kp) => kp.public().as_bytes().to_vec(),
            GuardianKey::Secp256k1(kp) => kp.public().as_bytes().to_vec(),
        }
    }

    /// Serialize as `flag || privkey`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![self.scheme_flag()];
        match self {
            GuardianKey::Ed25519(kp) => bytes.extend_from_slice(kp.as_bytes()),
            GuardianKey::Secp256k1(kp) => bytes.extend_from_slice(kp.as_bytes()),
        }
        bytes
    }

    /// Parse from `flag || privkey`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FastCryptoError> {
        let flag = bytes.first().ok_or(FastCryptoError::InvalidInput)?;
        match *flag {
            ED25519_FLAG => Ok(GuardianKey::Ed25519(Ed25519KeyPair::from_bytes(
                &bytes[1..],
            )?)),
            SECP256K1_FLAG => Ok(GuardianKey::Secp256k1(Secp256k1KeyPair::from_bytes(
                &bytes[1..],
            )?)),
            _ => Err(FastCryptoError::InvalidInput),
        }
    }
}

impl EncodeDecodeBase64 for GuardianKey {
    fn encode_base64(&self) -> String {
        use base64ct::{Base64, Encoding};
        Base64::encode_string(&self.to_bytes())
    }

    fn decode_base64(value: &str) -> Result<Self, FastCryptoError> {
        use base64ct::{Base64, Encoding};
        let bytes = Base64::decode_vec(value).map_err(|_| FastCryptoError::InvalidInput)?;
        Self::from_bytes(&bytes)
    }
}
