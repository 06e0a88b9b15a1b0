// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::error::{GuardianError, GuardianResult};
use ethers::core::k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use ethers::core::k256::elliptic_curve::sec1::ToEncodedPoint;
use ethers::types::Address as EthAddress;
use fastcrypto::hash::{HashFunction, Keccak256};
use fastcrypto::secp256k1::{Secp256k1KeyPair, Secp256k1PublicKey};
use fastcrypto::traits::ToFromBytes;

pub type GuardianKeyPair = Secp256k1KeyPair;
pub type GuardianPublicKey = Secp256k1PublicKey;

/// A guardian signature as it travels on the wire: `r || s || v`, with the
/// recovery byte `v ∈ {0, 1}`.
pub const SIGNATURE_LENGTH: usize = 65;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).digest
}

/// Ethereum-style address of a guardian public key: keccak256 of the
/// uncompressed point (minus the 0x04 prefix), last 20 bytes.
pub fn pubkey_to_eth_address(pubkey: &GuardianPublicKey) -> EthAddress {
    // unwrap: the conversion should not fail
    let pk = VerifyingKey::from_sec1_bytes(pubkey.as_bytes()).unwrap();
    let affine: &ethers::core::k256::AffinePoint = pk.as_ref();
    let encoded = affine.to_encoded_point(false);
    let pubkey = &encoded.as_bytes()[1..];
    assert_eq!(pubkey.len(), 64, "raw public key must be 64 bytes");
    let hash = keccak256(pubkey);
    EthAddress::from_slice(&hash[12..])
}

/// Address of the local guardian key.
pub fn guardian_address(kp: &GuardianKeyPair) -> EthAddress {
    use fastcrypto::traits::KeyPair as _;
    pubkey_to_eth_address(kp.public())
}

/// Sign a 32-byte signing digest directly (the digest is the ECDSA prehash,
/// there is no further hashing). Returns `r || s || v`.
pub fn sign_digest(kp: &GuardianKeyPair, digest: &[u8; 32]) -> [u8; SIGNATURE_LENGTH] {
    // unwrap: the key pair holds a valid 32-byte secret
    let sk = SigningKey::from_slice(kp.as_bytes()).unwrap();
    let (sig, recovery_id) = sk
        .sign_prehash_recoverable(digest)
        .expect("signing a 32-byte digest should not fail");
    let mut out = [0u8; SIGNATURE_LENGTH];
    out[..64].copy_from_slice(&sig.to_bytes());
    out[64] = recovery_id.to_byte();
    out
}

/// Recover the guardian address that produced `signature` over `digest`.
pub fn recover_signer(
    digest: &[u8; 32],
    signature: &[u8; SIGNATURE_LENGTH],
) -> GuardianResult<EthAddress> {
    let sig = EcdsaSignature::from_slice(&signature[..64])
        .map_err(|e| GuardianError::Malformed(format!("invalid signature bytes: {e}")))?;
    let recovery_id = RecoveryId::from_byte(signature[64])
        .ok_or_else(|| GuardianError::Malformed("invalid recovery id".to_string()))?;
    let pk = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|e| GuardianError::Malformed(format!("signature recovery failed: {e}")))?;

    let encoded = pk.to_encoded_point(false);
    let pubkey = &encoded.as_bytes()[1..];
    let hash = keccak256(pubkey);
    Ok(EthAddress::from_slice(&hash[12..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastcrypto::encoding::{Encoding, Hex};
    use fastcrypto::traits::KeyPair as _;

    #[test]
    fn test_sign_and_recover_round_trip() {
        let kp: GuardianKeyPair = guardian_types::crypto::get_key_pair();
        let addr = guardian_address(&kp);

        let digest = keccak256(b"an event we observed");
        let sig = sign_digest(&kp, &digest);
        assert_eq!(recover_signer(&digest, &sig).unwrap(), addr);

        // A different digest must not recover to the same address.
        let other = keccak256(b"a different event");
        assert_ne!(recover_signer(&other, &sig).unwrap(), addr);
    }

    #[test]
    fn test_recover_rejects_garbage_recovery_byte() {
        let kp: GuardianKeyPair = guardian_types::crypto::get_key_pair();
        let digest = keccak256(b"msg");
        let mut sig = sign_digest(&kp, &digest);
        sig[64] = 0x1b;
        assert!(recover_signer(&digest, &sig).is_err());
    }

    #[test]
    fn test_pubkey_to_eth_address_regression() {
        // Example from ethers-rs: compressed pubkey and its known address.
        let pubkey = GuardianPublicKey::from_bytes(
            &Hex::decode("0376698beebe8ee5c74d8cc50ab84ac301ee8f10af6f28d0ffd6adf4d6d3b9b762")
                .unwrap(),
        )
        .unwrap();
        let addr = "0Ac1dF02185025F65202660F8167210A80dD5086"
            .parse::<EthAddress>()
            .unwrap();
        assert_eq!(pubkey_to_eth_address(&pubkey), addr);
    }

    #[test]
    fn test_deterministic_key_signature_stability() {
        // Signatures must be deterministic (RFC 6979); two signs of the same
        // digest are byte-identical so gossip retransmissions compare equal.
        let kp = GuardianKeyPair::from_bytes(
            &Hex::decode("e42c82337ce12d4a7ad6cd65876d91b2ab6594fd50cdab1737c91773ba7451db")
                .unwrap(),
        )
        .unwrap();
        let digest = keccak256(b"stable");
        assert_eq!(sign_digest(&kp, &digest), sign_digest(&kp, &digest));
    }
}
