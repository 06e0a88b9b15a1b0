// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

use ethers::types::Address as EthAddress;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardianError {
    // A binary payload could not be decoded
    Malformed(String),
    // VAA version byte is not a supported version
    UnknownVaaVersion(u8),
    // Signature list is unsorted or contains a duplicate guardian index
    DuplicateOrUnsortedSignatures,
    // A signature references an index outside the guardian set
    SignatureIndexOutOfRange(u8),
    // Fewer signatures than the quorum of the referenced set
    InsufficientSignatures { got: usize, quorum: usize },
    // A signature does not recover to the guardian at its index
    InvalidSignature(EthAddress),
    // Signer is not a member of any currently valid guardian set
    UnknownGuardianSigner(EthAddress),
    // Referenced guardian set is not known locally
    GuardianSetNotFound(u32),
    // Invalid guardian set contents (duplicates, empty)
    InvalidGuardianSet(String),
    // A query failed structural validation
    InvalidQuery(String),
    // Query requester is not on the allowlist
    UnauthorizedQueryRequester(EthAddress),
    // Governor does not recognize the referenced pending VAA
    PendingVaaNotFound(String),
    // Chain id is outside the u16 range or otherwise unusable
    InvalidChainId,
    // VAA store I/O failure
    StorageError(String),
    // A bounded channel was full; caller decides whether to drop or surface
    ChannelFull(&'static str),
    // Invalid admin client request
    InvalidAdminRequest(String),
    // Transient failure talking to a backfill peer
    TransientPeerError(String),
    // Uncategorized error
    Generic(String),
}

impl GuardianError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            GuardianError::Malformed(_) => "malformed",
            GuardianError::UnknownVaaVersion(_) => "unknown_version",
            GuardianError::DuplicateOrUnsortedSignatures => "duplicate_or_unsorted_signatures",
            GuardianError::SignatureIndexOutOfRange(_) => "index_out_of_range",
            GuardianError::InsufficientSignatures { .. } => "insufficient_signatures",
            GuardianError::InvalidSignature(_) => "invalid_signature",
            GuardianError::UnknownGuardianSigner(_) => "unknown_guardian_signer",
            GuardianError::GuardianSetNotFound(_) => "guardian_set_not_found",
            GuardianError::InvalidGuardianSet(_) => "invalid_guardian_set",
            GuardianError::InvalidQuery(_) => "invalid_query",
            GuardianError::UnauthorizedQueryRequester(_) => "unauthorized_query_requester",
            GuardianError::PendingVaaNotFound(_) => "pending_vaa_not_found",
            GuardianError::InvalidChainId => "invalid_chain_id",
            GuardianError::StorageError(_) => "storage_error",
            GuardianError::ChannelFull(_) => "channel_full",
            GuardianError::InvalidAdminRequest(_) => "invalid_admin_request",
            GuardianError::TransientPeerError(_) => "transient_peer_error",
            GuardianError::Generic(_) => "generic",
        }
    }
}

pub type GuardianResult<T> = Result<T, GuardianError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_labels_are_stable() {
        // These labels feed monitoring dashboards; changing them breaks alerts.
        let cases = vec![
            (GuardianError::Malformed("x".into()), "malformed"),
            (GuardianError::UnknownVaaVersion(2), "unknown_version"),
            (
                GuardianError::DuplicateOrUnsortedSignatures,
                "duplicate_or_unsorted_signatures",
            ),
            (
                GuardianError::SignatureIndexOutOfRange(9),
                "index_out_of_range",
            ),
            (
                GuardianError::InsufficientSignatures { got: 1, quorum: 3 },
                "insufficient_signatures",
            ),
            (
                GuardianError::InvalidSignature(EthAddress::zero()),
                "invalid_signature",
            ),
            (GuardianError::StorageError("x".into()), "storage_error"),
            (GuardianError::ChannelFull("obsv"), "channel_full"),
        ];
        for (error, expected) in cases {
            assert_eq!(error.error_type(), expected);
        }
    }

    #[test]
    fn test_error_type_valid_prometheus_labels() {
        let errors = vec![
            GuardianError::Malformed("a".into()),
            GuardianError::UnknownVaaVersion(0),
            GuardianError::DuplicateOrUnsortedSignatures,
            GuardianError::SignatureIndexOutOfRange(0),
            GuardianError::InsufficientSignatures { got: 0, quorum: 1 },
            GuardianError::InvalidSignature(EthAddress::zero()),
            GuardianError::UnknownGuardianSigner(EthAddress::zero()),
            GuardianError::GuardianSetNotFound(0),
            GuardianError::InvalidGuardianSet("a".into()),
            GuardianError::InvalidQuery("a".into()),
            GuardianError::UnauthorizedQueryRequester(EthAddress::zero()),
            GuardianError::PendingVaaNotFound("a".into()),
            GuardianError::InvalidChainId,
            GuardianError::StorageError("a".into()),
            GuardianError::ChannelFull("x"),
            GuardianError::InvalidAdminRequest("a".into()),
            GuardianError::TransientPeerError("a".into()),
            GuardianError::Generic("a".into()),
        ];

        for error in errors {
            let label = error.error_type();
            assert!(!label.is_empty());
            for c in label.chars() {
                assert!(
                    c.is_ascii_lowercase() || c == '_',
                    "error_type '{}' contains invalid character '{}'",
                    label,
                    c
                );
            }
            assert!(!label.starts_with('_'));
            assert!(!label.ends_with('_'));
        }
    }

    #[test]
    fn test_error_type_payload_independence() {
        let err1 = GuardianError::Malformed("short".to_string());
        let err2 = GuardianError::Malformed("a much longer description of the failure".to_string());
        assert_eq!(err1.error_type(), err2.error_type());
    }
}
