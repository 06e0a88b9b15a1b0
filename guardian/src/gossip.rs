// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed envelopes carried by the peer-to-peer bus. The transport itself is
//! external; these are the payload contracts, plus non-blocking send helpers
//! for the paths where a full channel means "drop" rather than "wait".

use crate::crypto::SIGNATURE_LENGTH;
use crate::error::{GuardianError, GuardianResult};
use ethers::types::Address as EthAddress;
use guardian_types::ChainId;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use tokio::sync::mpsc;

/// One guardian's signed claim that it saw the event behind `hash`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedObservation {
    /// The claimed signer. Verification recovers the address from the
    /// signature and compares; the field exists so receivers can count
    /// per-guardian traffic without recovery.
    pub addr: EthAddress,
    /// The signing digest of the observed message.
    pub hash: [u8; 32],
    #[serde_as(as = "serde_with::Bytes")]
    pub signature: [u8; SIGNATURE_LENGTH],
    /// Transaction in which the observation was made, for re-observation.
    pub tx_hash: Vec<u8>,
}

/// A fully signed VAA that reached quorum somewhere in the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedVaaWithQuorum {
    pub vaa_bytes: Vec<u8>,
}

/// Ask watchers (ours and our peers') to look at a transaction again.
/// `chain_id` zero addresses every watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationRequest {
    pub chain_id: ChainId,
    pub tx_hash: Vec<u8>,
}

/// A cross-chain query request, signed by an allowlisted requester.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedQueryRequest {
    pub query_request: Vec<u8>,
    #[serde_as(as = "serde_with::Bytes")]
    pub signature: [u8; SIGNATURE_LENGTH],
}

/// One guardian's signed response publication for a query.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedQueryResponse {
    pub query_response: Vec<u8>,
    #[serde_as(as = "serde_with::Bytes")]
    pub signature: [u8; SIGNATURE_LENGTH],
}

/// Everything this node can put on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GossipEnvelope {
    SignedObservation(SignedObservation),
    SignedVaaWithQuorum(SignedVaaWithQuorum),
    ObservationRequest(ObservationRequest),
    SignedQueryRequest(SignedQueryRequest),
    SignedQueryResponse(SignedQueryResponse),
}

/// Non-blocking send of a re-observation request. A full channel surfaces as
/// a sentinel; the caller decides whether that is fatal.
pub fn post_observation_request(
    obsv_req_tx: &mpsc::Sender<ObservationRequest>,
    req: ObservationRequest,
) -> GuardianResult<()> {
    obsv_req_tx
        .try_send(req)
        .map_err(|_| GuardianError::ChannelFull("observation request channel"))
}

/// Non-blocking send of a signed query request into the query lane.
pub fn post_signed_query_request(
    query_req_tx: &mpsc::Sender<SignedQueryRequest>,
    req: SignedQueryRequest,
) -> GuardianResult<()> {
    query_req_tx
        .try_send(req)
        .map_err(|_| GuardianError::ChannelFull("signed query request channel"))
}
