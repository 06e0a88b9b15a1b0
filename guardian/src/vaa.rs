// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

//! The canonical signed-attestation format. Encoding is fixed and
//! big-endian throughout; independent implementations must produce
//! identical bytes.

use crate::crypto::{self, SIGNATURE_LENGTH};
use crate::error::{GuardianError, GuardianResult};
use crate::types::VaaId;
use ethers::types::Address as EthAddress;
use guardian_types::{Address, ChainId, ADDRESS_LENGTH};

pub const SUPPORTED_VAA_VERSION: u8 = 1;

/// Quorum is strictly more than two thirds of the set.
pub fn calculate_quorum(set_size: usize) -> usize {
    set_size * 2 / 3 + 1
}

/// One guardian's signature within a VAA, identified by its index in the
/// signing guardian set.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature {
    pub index: u8,
    pub signature: [u8; SIGNATURE_LENGTH],
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sig[{}]={}", self.index, hex::encode(self.signature))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vaa {
    pub version: u8,
    pub guardian_set_index: u32,
    pub signatures: Vec<Signature>,
    pub timestamp: u32,
    pub nonce: u32,
    pub emitter_chain: ChainId,
    pub emitter_address: Address,
    pub sequence: u64,
    pub consistency_level: u8,
    pub payload: Vec<u8>,
}

impl Vaa {
    pub fn id(&self) -> VaaId {
        VaaId::new(self.emitter_chain, self.emitter_address, self.sequence)
    }

    /// The canonical body: every field from `timestamp` onward. Signatures
    /// never contribute to the digest.
    pub fn body_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(51 + self.payload.len());
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        bytes.extend_from_slice(&self.nonce.to_be_bytes());
        bytes.extend_from_slice(&self.emitter_chain.to_be_bytes());
        bytes.extend_from_slice(self.emitter_address.as_bytes());
        bytes.extend_from_slice(&self.sequence.to_be_bytes());
        bytes.push(self.consistency_level);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// The value each guardian signs: `keccak256(keccak256(body))`.
    pub fn signing_digest(&self) -> [u8; 32] {
        crypto::keccak256(&crypto::keccak256(&self.body_bytes()))
    }

    pub fn hex_digest(&self) -> String {
        hex::encode(self.signing_digest())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(6 + self.signatures.len() * 66 + 51 + self.payload.len());
        bytes.push(self.version);
        bytes.extend_from_slice(&self.guardian_set_index.to_be_bytes());
        bytes.push(self.signatures.len() as u8);
        for sig in &self.signatures {
            bytes.push(sig.index);
            bytes.extend_from_slice(&sig.signature);
        }
        bytes.extend_from_slice(&self.body_bytes());
        bytes
    }

    pub fn decode(data: &[u8]) -> GuardianResult<Self> {
        let mut r = Reader::new(data);

        let version = r.u8("version")?;
        if version != SUPPORTED_VAA_VERSION {
            return Err(GuardianError::UnknownVaaVersion(version));
        }
        let guardian_set_index = r.u32("guardian set index")?;

        let sig_count = r.u8("signature count")?;
        let mut signatures = Vec::with_capacity(sig_count as usize);
        for _ in 0..sig_count {
            let index = r.u8("signature index")?;
            let mut signature = [0u8; SIGNATURE_LENGTH];
            signature.copy_from_slice(r.bytes(SIGNATURE_LENGTH, "signature")?);
            signatures.push(Signature { index, signature });
        }

        let timestamp = r.u32("timestamp")?;
        let nonce = r.u32("nonce")?;
        let emitter_chain = ChainId(r.u16("emitter chain")?);
        let mut addr = [0u8; ADDRESS_LENGTH];
        addr.copy_from_slice(r.bytes(ADDRESS_LENGTH, "emitter address")?);
        let sequence = r.u64("sequence")?;
        let consistency_level = r.u8("consistency level")?;
        let payload = r.rest().to_vec();

        Ok(Vaa {
            version,
            guardian_set_index,
            signatures,
            timestamp,
            nonce,
            emitter_chain,
            emitter_address: Address::new(addr),
            sequence,
            consistency_level,
            payload,
        })
    }

    /// Verify against the public keys of the guardian set this VAA claims to
    /// be signed by. All of the following must hold: at least one signature,
    /// strictly increasing indices, every index inside the set, at least a
    /// quorum of signatures, and every signature recovering to the address at
    /// its index.
    pub fn verify(&self, guardian_keys: &[EthAddress]) -> GuardianResult<()> {
        if self.signatures.is_empty() {
            return Err(GuardianError::InsufficientSignatures {
                got: 0,
                quorum: calculate_quorum(guardian_keys.len()),
            });
        }

        let mut last_index: Option<u8> = None;
        for sig in &self.signatures {
            if let Some(last) = last_index {
                if sig.index <= last {
                    return Err(GuardianError::DuplicateOrUnsortedSignatures);
                }
            }
            last_index = Some(sig.index);
            if sig.index as usize >= guardian_keys.len() {
                return Err(GuardianError::SignatureIndexOutOfRange(sig.index));
            }
        }

        let quorum = calculate_quorum(guardian_keys.len());
        if self.signatures.len() < quorum {
            return Err(GuardianError::InsufficientSignatures {
                got: self.signatures.len(),
                quorum,
            });
        }

        let digest = self.signing_digest();
        for sig in &self.signatures {
            let expected = guardian_keys[sig.index as usize];
            let recovered = crypto::recover_signer(&digest, &sig.signature)
                .map_err(|_| GuardianError::InvalidSignature(expected))?;
            if recovered != expected {
                return Err(GuardianError::InvalidSignature(expected));
            }
        }

        Ok(())
    }

    /// Sign the digest with `key` and append the signature under
    /// `guardian_index`.
    pub fn add_signature(&mut self, key: &crypto::GuardianKeyPair, guardian_index: u8) {
        let digest = self.signing_digest();
        self.signatures.push(Signature {
            index: guardian_index,
            signature: crypto::sign_digest(key, &digest),
        });
    }
}

/// Minimal cursor over a byte slice; every read reports which field was
/// truncated.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn bytes(&mut self, n: usize, field: &str) -> GuardianResult<&'a [u8]> {
        if self.data.len() - self.pos < n {
            return Err(GuardianError::Malformed(format!(
                "truncated while reading {field}"
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn u8(&mut self, field: &str) -> GuardianResult<u8> {
        Ok(self.bytes(1, field)?[0])
    }

    pub(crate) fn u16(&mut self, field: &str) -> GuardianResult<u16> {
        let b = self.bytes(2, field)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self, field: &str) -> GuardianResult<u32> {
        let b = self.bytes(4, field)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64(&mut self, field: &str) -> GuardianResult<u64> {
        let b = self.bytes(8, field)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_be_bytes(arr))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos == self.data.len()
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos..];
        self.pos = self.data.len();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{guardian_address, GuardianKeyPair};
    use crate::test_utils::{get_test_guardian_keys, get_test_vaa};

    #[test]
    fn test_calculate_quorum() {
        assert_eq!(calculate_quorum(1), 1);
        assert_eq!(calculate_quorum(2), 2);
        assert_eq!(calculate_quorum(3), 3);
        assert_eq!(calculate_quorum(4), 3);
        assert_eq!(calculate_quorum(19), 13);
        // floor(2n/3) + 1 across the whole u8 range
        for n in 1usize..=255 {
            assert_eq!(calculate_quorum(n), n * 2 / 3 + 1);
        }
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let keys = get_test_guardian_keys(3);
        let mut v = get_test_vaa();
        for (i, kp) in keys.iter().enumerate() {
            v.add_signature(kp, i as u8);
        }

        let encoded = v.encode();
        let decoded = Vaa::decode(&encoded).unwrap();
        assert_eq!(decoded, v);
        // Byte-exact on re-encode as well.
        assert_eq!(decoded.encode(), encoded);
    }

    #[test]
    fn test_encode_layout_regression() {
        // Unsigned VAA with known fields; layout must be stable down to the
        // byte.
        let v = Vaa {
            version: 1,
            guardian_set_index: 9,
            signatures: vec![],
            timestamp: 2837,
            nonce: 5,
            emitter_chain: ChainId::SOLANA,
            emitter_address: Address::new({
                let mut a = [0u8; 32];
                a[31] = 4;
                a
            }),
            sequence: 10,
            consistency_level: 2,
            payload: vec![0, 1, 2, 97, 98, 99],
        };
        assert_eq!(
            hex::encode(v.encode()),
            "0100000009000000 0b15 00000005 0001 \
             0000000000000000000000000000000000000000000000000000000000000004 \
             000000000000000a 02 000102616263"
                .replace(' ', "")
        );
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(
            Vaa::decode(&[]).unwrap_err(),
            GuardianError::Malformed(_)
        ));
        // Truncated in the middle of a signature.
        let keys = get_test_guardian_keys(1);
        let mut v = get_test_vaa();
        v.add_signature(&keys[0], 0);
        let encoded = v.encode();
        assert!(matches!(
            Vaa::decode(&encoded[..20]).unwrap_err(),
            GuardianError::Malformed(_)
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let mut encoded = get_test_vaa().encode();
        encoded[0] = 2;
        assert_eq!(
            Vaa::decode(&encoded).unwrap_err(),
            GuardianError::UnknownVaaVersion(2)
        );
    }

    #[test]
    fn test_digest_ignores_signatures_and_header() {
        let keys = get_test_guardian_keys(2);
        let unsigned = get_test_vaa();
        let digest = unsigned.signing_digest();

        let mut signed = unsigned.clone();
        signed.guardian_set_index += 1;
        signed.add_signature(&keys[0], 0);
        signed.add_signature(&keys[1], 1);
        assert_eq!(signed.signing_digest(), digest);

        // But any body field change moves the digest.
        let mut other = unsigned.clone();
        other.nonce += 1;
        assert_ne!(other.signing_digest(), digest);
    }

    #[test]
    fn test_verify_happy_path_and_quorum() {
        let keys = get_test_guardian_keys(4);
        let addrs: Vec<_> = keys.iter().map(guardian_address).collect();

        let mut v = get_test_vaa();
        // quorum of 4 is 3
        v.add_signature(&keys[0], 0);
        v.add_signature(&keys[1], 1);
        assert!(matches!(
            v.verify(&addrs).unwrap_err(),
            GuardianError::InsufficientSignatures { got: 2, quorum: 3 }
        ));

        v.add_signature(&keys[3], 3);
        v.verify(&addrs).unwrap();
    }

    #[test]
    fn test_verify_rejects_unsorted_and_duplicate_indices() {
        let keys = get_test_guardian_keys(3);
        let addrs: Vec<_> = keys.iter().map(guardian_address).collect();

        let mut v = get_test_vaa();
        v.add_signature(&keys[1], 1);
        v.add_signature(&keys[0], 0);
        v.add_signature(&keys[2], 2);
        assert_eq!(
            v.verify(&addrs).unwrap_err(),
            GuardianError::DuplicateOrUnsortedSignatures
        );

        let mut v = get_test_vaa();
        v.add_signature(&keys[0], 0);
        v.add_signature(&keys[0], 0);
        v.add_signature(&keys[2], 2);
        assert_eq!(
            v.verify(&addrs).unwrap_err(),
            GuardianError::DuplicateOrUnsortedSignatures
        );
    }

    #[test]
    fn test_verify_rejects_index_out_of_range() {
        let keys = get_test_guardian_keys(2);
        let addrs: Vec<_> = keys.iter().map(guardian_address).collect();

        let mut v = get_test_vaa();
        v.add_signature(&keys[0], 0);
        v.add_signature(&keys[1], 5);
        assert_eq!(
            v.verify(&addrs).unwrap_err(),
            GuardianError::SignatureIndexOutOfRange(5)
        );
    }

    #[test]
    fn test_verify_rejects_wrong_signer() {
        let keys = get_test_guardian_keys(2);
        let addrs: Vec<_> = keys.iter().map(guardian_address).collect();
        let outsider: GuardianKeyPair = guardian_types::crypto::get_key_pair();

        let mut v = get_test_vaa();
        v.add_signature(&keys[0], 0);
        v.add_signature(&outsider, 1);
        assert!(matches!(
            v.verify(&addrs).unwrap_err(),
            GuardianError::InvalidSignature(_)
        ));
    }
}
