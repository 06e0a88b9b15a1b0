// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

//! Test fixtures shared across the crate's unit tests.

use crate::crypto::{guardian_address, GuardianKeyPair};
use crate::gossip::{GossipEnvelope, ObservationRequest};
use crate::metrics::GuardianMetrics;
use crate::processor::Processor;
use crate::store::VaaStore;
use crate::types::{GuardianSet, GuardianSetState, MessagePublication};
use crate::vaa::Vaa;
use ethers::types::H256;
use fastcrypto::hash::{HashFunction, Keccak256};
use fastcrypto::traits::ToFromBytes;
use guardian_types::{Address, ChainId, Environment};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Deterministic guardian keys; key `i` is stable across runs so tests can
/// hard-code derived values.
pub fn get_test_guardian_keys(n: usize) -> Vec<GuardianKeyPair> {
    (0..n)
        .map(|i| {
            let seed = Keccak256::digest(format!("guardian-test-key-{i}").as_bytes()).digest;
            GuardianKeyPair::from_bytes(&seed).expect("test seed is a valid secret")
        })
        .collect()
}

pub fn get_test_emitter() -> Address {
    Address::from_hex("ec7372995d5cc8732397fb0ad35c0121e0eaa90d26f828a534cab54391b3a4f5").unwrap()
}

/// An unsigned VAA with fixed fields.
pub fn get_test_vaa() -> Vaa {
    Vaa {
        version: 1,
        guardian_set_index: 0,
        signatures: vec![],
        timestamp: 1_000_000,
        nonce: 42,
        emitter_chain: ChainId::SOLANA,
        emitter_address: get_test_emitter(),
        sequence: 86,
        consistency_level: 32,
        payload: b"test-payload".to_vec(),
    }
}

/// A message publication matching [`get_test_vaa`]'s body fields.
pub fn get_test_message_publication() -> MessagePublication {
    MessagePublication {
        tx_hash: H256::repeat_byte(0xab),
        timestamp: 1_000_000,
        nonce: 42,
        sequence: 86,
        consistency_level: 32,
        emitter_chain: ChainId::SOLANA,
        emitter_address: get_test_emitter(),
        payload: b"test-payload".to_vec(),
        unreliable: false,
    }
}

pub struct TestProcessorHarness {
    pub processor: Processor,
    pub gossip_rx: mpsc::Receiver<GossipEnvelope>,
    pub obsv_req_rx: mpsc::Receiver<ObservationRequest>,
    pub keys: Vec<GuardianKeyPair>,
    pub store: Arc<VaaStore>,
    pub gst: Arc<GuardianSetState>,
    pub metrics: Arc<GuardianMetrics>,
}

/// A processor over `num_guardians` deterministic keys, with the guardian
/// set at index 0 already installed. We are guardian `our_index`.
pub fn make_processor_for_testing(num_guardians: usize, our_index: usize) -> TestProcessorHarness {
    let keys = get_test_guardian_keys(num_guardians);
    let addrs: Vec<_> = keys.iter().map(guardian_address).collect();

    // The store directory outlives the harness; partial destructuring must
    // not delete it out from under the open database.
    let dir = tempfile::tempdir().unwrap().into_path();
    let store = Arc::new(VaaStore::open(&dir).unwrap());
    let gst = Arc::new(GuardianSetState::new());
    let metrics = GuardianMetrics::new_for_testing();

    let (_msg_tx, msg_rx) = mpsc::channel(16);
    let (_set_tx, set_rx) = mpsc::channel(16);
    let (_obsv_tx, obsv_rx) = mpsc::channel(16);
    let (_signed_tx, signed_rx) = mpsc::channel(16);
    let (gossip_tx, gossip_rx) = mpsc::channel(16);
    let (obsv_req_tx, obsv_req_rx) = mpsc::channel(16);

    let our_key = GuardianKeyPair::from_bytes(keys[our_index].as_bytes()).unwrap();
    let mut processor = Processor::new(
        Environment::UnsafeDevNet,
        msg_rx,
        set_rx,
        obsv_rx,
        signed_rx,
        gossip_tx,
        obsv_req_tx,
        our_key,
        store.clone(),
        gst.clone(),
        None,
        metrics.clone(),
        CancellationToken::new(),
    );
    processor.set_guardian_set_for_test(GuardianSet::new(0, addrs).unwrap());

    TestProcessorHarness {
        processor,
        gossip_rx,
        obsv_req_rx,
        keys,
        store,
        gst,
        metrics,
    }
}
