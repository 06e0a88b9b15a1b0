// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

//! The observation-aggregation processor: a single cooperative event loop
//! that owns the per-digest observation map. It signs everything our
//! watchers publish, collects peer signatures from gossip, and assembles the
//! signed VAA once a supermajority of the current guardian set agrees.
//!
//! Nothing outside this loop ever touches the observation map; other tasks
//! communicate exclusively through the channels passed at construction.

mod cleanup;

use crate::crypto::{self, GuardianKeyPair, SIGNATURE_LENGTH};
use crate::error::{GuardianError, GuardianResult};
use crate::gossip::{GossipEnvelope, ObservationRequest, SignedObservation, SignedVaaWithQuorum};
use crate::governor::ChainGovernor;
use crate::metrics::GuardianMetrics;
use crate::store::VaaStore;
use crate::types::{GuardianSet, GuardianSetState, MessagePublication, Observation};
use crate::vaa::Signature;
use ethers::types::Address as EthAddress;
use guardian_types::Environment;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);
pub const GOVERNOR_INTERVAL: Duration = Duration::from_secs(60);

/// Age at which an observation state settles: quorum either happened or is
/// counted as missed.
pub const SETTLEMENT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// First re-observation request fires this long after first sight; each
/// subsequent one doubles the wait, up to the cap.
pub const FIRST_RETRY_DELAY: Duration = Duration::from_secs(60);
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(8 * 60);
pub const MAX_RETRY_COUNT: u32 = 5;

/// The local view of one in-flight digest.
pub(crate) struct ObservationState {
    /// First time this digest was seen, possibly before we observed it
    /// ourselves.
    pub(crate) first_observed: Instant,
    /// No re-observation request before this time.
    pub(crate) next_retry: Instant,
    pub(crate) retry_ctr: u32,
    /// Our own copy of the observation, if our watcher produced it.
    pub(crate) our_observation: Option<Observation>,
    /// Signatures by guardian address. Across a set rotation this may hold
    /// signatures from members of either set; counting resolves against the
    /// current set.
    pub(crate) signatures: HashMap<EthAddress, [u8; SIGNATURE_LENGTH]>,
    /// Set once the assembled VAA was persisted and broadcast.
    pub(crate) submitted: bool,
    /// Set by cleanup after the settlement timeout expired.
    pub(crate) settled: bool,
    /// Unreliable observations are never retried or re-observed.
    pub(crate) reliable: bool,
    /// Human-readable source label for metrics.
    pub(crate) source: &'static str,
    /// The envelope we broadcast, kept for retransmissions.
    pub(crate) our_msg: Option<SignedObservation>,
    /// Transaction hash behind the observation, for re-observation requests.
    pub(crate) tx_hash: Vec<u8>,
    /// Guardian set valid when this state was created.
    pub(crate) gs: Option<Arc<GuardianSet>>,
}

impl ObservationState {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            first_observed: now,
            next_retry: now + FIRST_RETRY_DELAY,
            retry_ctr: 0,
            our_observation: None,
            signatures: HashMap::new(),
            submitted: false,
            settled: false,
            reliable: true,
            source: "unknown",
            our_msg: None,
            tx_hash: Vec::new(),
            gs: None,
        }
    }
}

/// Count how many of `signatures` belong to members of `gs`. Both the VAA
/// and the query-response lanes reach quorum through this count.
pub(crate) fn count_set_signatures(
    signatures: &HashMap<EthAddress, [u8; SIGNATURE_LENGTH]>,
    gs: &GuardianSet,
) -> usize {
    signatures.keys().filter(|&addr| gs.contains(addr)).count()
}

pub struct Processor {
    env: Environment,

    // Inbound channels
    msg_rx: mpsc::Receiver<MessagePublication>,
    set_rx: mpsc::Receiver<GuardianSet>,
    obsv_rx: mpsc::Receiver<SignedObservation>,
    signed_rx: mpsc::Receiver<SignedVaaWithQuorum>,

    // Outbound channels
    gossip_tx: mpsc::Sender<GossipEnvelope>,
    obsv_req_tx: mpsc::Sender<ObservationRequest>,

    guardian_key: GuardianKeyPair,
    our_addr: EthAddress,

    store: Arc<VaaStore>,

    /// The currently valid guardian set, as last seen on the set channel.
    gs: Option<Arc<GuardianSet>>,
    /// Shared handle through which other tasks read set snapshots.
    gst: Arc<GuardianSetState>,

    /// The per-digest observation map, keyed by hex digest.
    state: HashMap<String, ObservationState>,

    governor: Option<Arc<ChainGovernor>>,
    metrics: Arc<GuardianMetrics>,
    shutdown: CancellationToken,
}

#[allow(clippy::too_many_arguments)]
impl Processor {
    pub fn new(
        env: Environment,
        msg_rx: mpsc::Receiver<MessagePublication>,
        set_rx: mpsc::Receiver<GuardianSet>,
        obsv_rx: mpsc::Receiver<SignedObservation>,
        signed_rx: mpsc::Receiver<SignedVaaWithQuorum>,
        gossip_tx: mpsc::Sender<GossipEnvelope>,
        obsv_req_tx: mpsc::Sender<ObservationRequest>,
        guardian_key: GuardianKeyPair,
        store: Arc<VaaStore>,
        gst: Arc<GuardianSetState>,
        governor: Option<Arc<ChainGovernor>>,
        metrics: Arc<GuardianMetrics>,
        shutdown: CancellationToken,
    ) -> Self {
        let our_addr = crypto::guardian_address(&guardian_key);
        Self {
            env,
            msg_rx,
            set_rx,
            obsv_rx,
            signed_rx,
            gossip_tx,
            obsv_req_tx,
            guardian_key,
            our_addr,
            store,
            gs: None,
            gst,
            state: HashMap::new(),
            governor,
            metrics,
            shutdown,
        }
    }

    /// The event loop. Returns on shutdown, or with an error on conditions
    /// that require a supervised restart (storage failure after quorum,
    /// governor inconsistency).
    pub async fn run(mut self) -> GuardianResult<()> {
        let mut cleanup = tokio::time::interval(CLEANUP_INTERVAL);
        let mut governor_tick = tokio::time::interval(GOVERNOR_INTERVAL);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("processor shutting down");
                    return Ok(());
                }
                Some(gs) = self.set_rx.recv() => {
                    self.handle_guardian_set_update(gs);
                }
                Some(msg) = self.msg_rx.recv() => {
                    if let Some(governor) = self.governor.clone() {
                        if !governor.process_msg(&msg) {
                            self.metrics.governor_messages_enqueued.inc();
                            continue;
                        }
                    }
                    self.handle_message(msg).await?;
                }
                Some(obsv) = self.obsv_rx.recv() => {
                    let started = Instant::now();
                    self.handle_observation(obsv).await?;
                    self.metrics
                        .observation_processing_seconds
                        .observe(started.elapsed().as_secs_f64());
                }
                Some(signed) = self.signed_rx.recv() => {
                    self.handle_signed_vaa_with_quorum(&signed.vaa_bytes)?;
                }
                _ = cleanup.tick() => {
                    self.handle_cleanup(Instant::now());
                }
                _ = governor_tick.tick() => {
                    if let Some(governor) = self.governor.clone() {
                        for msg in governor.check_pending()? {
                            // Defense-in-depth: the governor must never hand
                            // back a message it does not govern.
                            if !governor.is_governed_msg(&msg)? {
                                panic!(
                                    "governor released a message it does not govern: {}",
                                    msg.message_id_string()
                                );
                            }
                            self.metrics.governor_messages_released.inc();
                            self.handle_message(msg).await?;
                        }
                    }
                }
            }
        }
    }

    fn handle_guardian_set_update(&mut self, gs: GuardianSet) {
        info!(
            index = gs.index,
            keys = ?gs.keys_as_hex_strings(),
            "guardian set updated"
        );
        self.metrics.guardian_set_index.set(gs.index as i64);
        let gs = Arc::new(gs);
        self.gs = Some(gs.clone());
        self.gst.set(gs);
    }

    /// Sign one of our own observations, broadcast it, and feed it into the
    /// aggregation state.
    pub(crate) async fn handle_message(&mut self, msg: MessagePublication) -> GuardianResult<()> {
        let Some(gs) = self.gs.clone() else {
            warn!(
                "dropping message {} observed before the first guardian set arrived",
                msg.message_id_string()
            );
            return Ok(());
        };

        let v = msg.to_unsigned_vaa(gs.index);
        let digest = v.signing_digest();
        let hex_digest = hex::encode(digest);
        let signature = crypto::sign_digest(&self.guardian_key, &digest);

        debug!(
            message_id = %msg.message_id_string(),
            digest = %hex_digest,
            "observed message, signing and broadcasting"
        );

        let envelope = SignedObservation {
            addr: self.our_addr,
            hash: digest,
            signature,
            tx_hash: msg.tx_hash.as_bytes().to_vec(),
        };

        // Observation gossip is drop-on-full; a dropped broadcast is repaired
        // later by peers' re-observation requests.
        if self
            .gossip_tx
            .try_send(GossipEnvelope::SignedObservation(envelope.clone()))
            .is_err()
        {
            self.metrics.gossip_sends_dropped.inc();
            warn!("gossip channel full, dropping own observation broadcast");
        } else {
            self.metrics.observations_broadcast.inc();
        }

        let our_addr = self.our_addr;
        let observation = Observation::Vaa(Box::new(v));
        let source = observation.emitter_chain().name();
        let tx_hash = msg.tx_hash.as_bytes().to_vec();
        let state = self
            .state
            .entry(hex_digest.clone())
            .or_insert_with(|| ObservationState::new(Instant::now()));
        state.our_observation = Some(observation);
        state.reliable = !msg.unreliable;
        state.source = source;
        state.tx_hash = tx_hash;
        state.our_msg = Some(envelope);
        state.signatures.insert(our_addr, signature);
        if state.gs.is_none() {
            state.gs = Some(gs);
        }

        self.check_quorum(&hex_digest).await
    }

    /// Verify and absorb one peer observation from gossip.
    pub(crate) async fn handle_observation(
        &mut self,
        obsv: SignedObservation,
    ) -> GuardianResult<()> {
        self.metrics.observations_received.inc();

        let signer = match crypto::recover_signer(&obsv.hash, &obsv.signature) {
            Ok(addr) => addr,
            Err(e) => {
                self.metrics.observations_invalid.inc();
                warn!("dropping observation with unrecoverable signature: {e:?}");
                return Ok(());
            }
        };
        if signer != obsv.addr {
            self.metrics.observations_invalid.inc();
            warn!(
                claimed = %format!("{:#x}", obsv.addr),
                recovered = %format!("{:#x}", signer),
                "dropping observation whose signature does not match its claimed signer"
            );
            return Ok(());
        }

        // The signer must be in the current set, or in the previous set
        // while its grace period lasts.
        let in_current = self
            .gs
            .as_ref()
            .map(|gs| gs.contains(&signer))
            .unwrap_or(false);
        let in_previous = self
            .gst
            .previous_if_valid()
            .map(|gs| gs.contains(&signer))
            .unwrap_or(false);
        if !in_current && !in_previous {
            self.metrics.observations_unknown_guardian.inc();
            debug!(
                signer = %format!("{:#x}", signer),
                "dropping observation from address in no valid guardian set"
            );
            return Ok(());
        }

        let hex_digest = hex::encode(obsv.hash);
        let gs_snapshot = self.gs.clone();
        let state = self
            .state
            .entry(hex_digest.clone())
            // We may be behind on the watcher side; track peers' progress.
            .or_insert_with(|| ObservationState::new(Instant::now()));
        if state.gs.is_none() {
            state.gs = gs_snapshot;
        }
        if state.tx_hash.is_empty() {
            state.tx_hash = obsv.tx_hash.clone();
        }
        // Last write wins; one guardian contributes at most one signature
        // per digest in a quorum round.
        state.signatures.insert(signer, obsv.signature);

        self.check_quorum(&hex_digest).await
    }

    /// Submission check: at most one `SignedVaaWithQuorum` per digest.
    async fn check_quorum(&mut self, hex_digest: &str) -> GuardianResult<()> {
        let Some(gs) = self.gs.clone() else {
            return Ok(());
        };
        let Some(state) = self.state.get_mut(hex_digest) else {
            return Ok(());
        };
        if state.submitted {
            return Ok(());
        }

        let have = count_set_signatures(&state.signatures, &gs);
        let quorum = gs.quorum();
        debug!(
            digest = hex_digest,
            have, quorum, "aggregation state changed"
        );
        if have < quorum || state.our_observation.is_none() {
            return Ok(());
        }

        let observation = state.our_observation.clone().expect("checked above");
        let message_id = observation.message_id();
        debug_assert_eq!(
            hex::encode(observation.signing_digest(self.env)),
            hex_digest,
            "observation stored under a foreign digest"
        );
        match observation {
            Observation::Vaa(unsigned) => {
                let mut v = *unsigned;
                // Collect the signatures that belong to the current set,
                // ordered by guardian index.
                let mut signatures: Vec<Signature> = state
                    .signatures
                    .iter()
                    .filter_map(|(addr, sig)| {
                        gs.key_index(addr).map(|idx| Signature {
                            index: idx as u8,
                            signature: *sig,
                        })
                    })
                    .collect();
                signatures.sort_by_key(|s| s.index);
                v.signatures = signatures;
                v.guardian_set_index = gs.index;

                // A quorum of valid signatures must verify; anything else is
                // a bug in the aggregation above.
                v.verify(&gs.keys)?;

                // Persistence failure after quorum is fatal: restarting and
                // replaying is safer than advertising a VAA we did not keep.
                self.store.store_signed_vaa(&v)?;

                let vaa_bytes = v.encode();
                info!(
                    message_id = %message_id,
                    digest = hex_digest,
                    signatures = v.signatures.len(),
                    "observation reached quorum, broadcasting signed VAA"
                );
                self.metrics.signed_vaas_assembled.inc();
                // Issued before the next channel event is serviced, so the
                // signature that completed quorum happens-before the signed
                // VAA on the network.
                if self
                    .gossip_tx
                    .send(GossipEnvelope::SignedVaaWithQuorum(SignedVaaWithQuorum {
                        vaa_bytes,
                    }))
                    .await
                    .is_err()
                {
                    return Err(GuardianError::Generic(
                        "gossip channel closed while broadcasting signed VAA".into(),
                    ));
                }
            }
            Observation::QueryResponse(_) => {
                // Query responses are aggregated in the query lane; the
                // quorum itself is the terminal event there.
                self.metrics.query_responses_quorum.inc();
            }
        }

        // Reborrow: the await above ended the earlier borrow.
        if let Some(state) = self.state.get_mut(hex_digest) {
            state.submitted = true;
        }
        Ok(())
    }

    /// A fully signed VAA arrived from gossip or RPC backfill: verify it
    /// against the set it names, persist it, and settle any matching
    /// aggregation state.
    pub(crate) fn handle_signed_vaa_with_quorum(&mut self, vaa_bytes: &[u8]) -> GuardianResult<()> {
        self.metrics.signed_vaas_received.inc();

        let v = match crate::vaa::Vaa::decode(vaa_bytes) {
            Ok(v) => v,
            Err(e) => {
                self.metrics.signed_vaas_invalid.inc();
                warn!("dropping undecodable signed VAA: {e:?}");
                return Ok(());
            }
        };

        let Some(gs) = self.gst.get(v.guardian_set_index) else {
            self.metrics.signed_vaas_invalid.inc();
            warn!(
                guardian_set_index = v.guardian_set_index,
                "dropping signed VAA for unknown guardian set"
            );
            return Ok(());
        };

        if let Err(e) = v.verify(&gs.keys) {
            self.metrics.signed_vaas_invalid.inc();
            warn!(
                message_id = %v.id().to_string(),
                "dropping signed VAA that failed verification: {e:?}"
            );
            return Ok(());
        }

        // Storage failures are fatal here as well.
        self.store.store_signed_vaa(&v)?;
        debug!(message_id = %v.id().to_string(), "persisted inbound signed VAA");

        if let Some(state) = self.state.get_mut(&v.hex_digest()) {
            state.submitted = true;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_guardian_set_for_test(&mut self, gs: GuardianSet) {
        self.handle_guardian_set_update(gs);
    }

    #[cfg(test)]
    pub(crate) fn observation_state(&self, hex_digest: &str) -> Option<&ObservationState> {
        self.state.get(hex_digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::guardian_address;
    use crate::test_utils::{
        get_test_message_publication, make_processor_for_testing, TestProcessorHarness,
    };
    use crate::types::VaaId;

    fn signed_observation_from(
        key: &GuardianKeyPair,
        digest: [u8; 32],
        tx_hash: &[u8],
    ) -> SignedObservation {
        SignedObservation {
            addr: guardian_address(key),
            hash: digest,
            signature: crypto::sign_digest(key, &digest),
            tx_hash: tx_hash.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_own_message_is_signed_and_broadcast() {
        let TestProcessorHarness {
            mut processor,
            mut gossip_rx,
            ..
        } = make_processor_for_testing(3, 0);

        let msg = get_test_message_publication();
        processor.handle_message(msg.clone()).await.unwrap();

        let Some(GossipEnvelope::SignedObservation(obsv)) = gossip_rx.recv().await else {
            panic!("expected a signed observation on gossip");
        };
        let digest = msg.to_unsigned_vaa(0).signing_digest();
        assert_eq!(obsv.hash, digest);
        // The signature recovers to our own guardian address.
        assert_eq!(
            crypto::recover_signer(&digest, &obsv.signature).unwrap(),
            obsv.addr
        );

        // State tracks our observation and our own signature.
        let state = processor.observation_state(&hex::encode(digest)).unwrap();
        assert_eq!(state.signatures.len(), 1);
        assert!(state.our_observation.is_some());
        assert!(!state.submitted);
    }

    #[tokio::test]
    async fn test_quorum_assembles_and_stores_vaa() {
        let TestProcessorHarness {
            mut processor,
            mut gossip_rx,
            keys,
            store,
            ..
        } = make_processor_for_testing(3, 0);

        let msg = get_test_message_publication();
        let unsigned = msg.to_unsigned_vaa(0);
        let digest = unsigned.signing_digest();

        processor.handle_message(msg.clone()).await.unwrap();
        let _ = gossip_rx.recv().await; // our own observation

        // Our signature plus one peer: still below quorum of 3.
        processor
            .handle_observation(signed_observation_from(&keys[1], digest, b"tx"))
            .await
            .unwrap();
        assert!(gossip_rx.try_recv().is_err());
        assert!(!store.has_vaa(msg.vaa_id()).unwrap());

        // Third signature completes quorum.
        processor
            .handle_observation(signed_observation_from(&keys[2], digest, b"tx"))
            .await
            .unwrap();

        let Some(GossipEnvelope::SignedVaaWithQuorum(signed)) = gossip_rx.recv().await else {
            panic!("expected a signed VAA with quorum on gossip");
        };
        let v = crate::vaa::Vaa::decode(&signed.vaa_bytes).unwrap();
        assert_eq!(v.id(), msg.vaa_id());
        assert_eq!(v.signatures.len(), 3);
        // Signatures are sorted by guardian index and verify as a whole.
        let addrs: Vec<_> = keys.iter().map(guardian_address).collect();
        v.verify(&addrs).unwrap();

        // Persisted before broadcast.
        assert!(store.has_vaa(msg.vaa_id()).unwrap());
        assert!(
            processor
                .observation_state(&hex::encode(digest))
                .unwrap()
                .submitted
        );
    }

    #[tokio::test]
    async fn test_at_most_one_submission_per_digest() {
        let TestProcessorHarness {
            mut processor,
            mut gossip_rx,
            keys,
            ..
        } = make_processor_for_testing(3, 0);

        let msg = get_test_message_publication();
        let digest = msg.to_unsigned_vaa(0).signing_digest();

        processor.handle_message(msg).await.unwrap();
        let _ = gossip_rx.recv().await;
        processor
            .handle_observation(signed_observation_from(&keys[1], digest, b"tx"))
            .await
            .unwrap();
        processor
            .handle_observation(signed_observation_from(&keys[2], digest, b"tx"))
            .await
            .unwrap();
        let Some(GossipEnvelope::SignedVaaWithQuorum(_)) = gossip_rx.recv().await else {
            panic!("expected the signed VAA");
        };

        // Late signatures for a submitted digest change nothing.
        processor
            .handle_observation(signed_observation_from(&keys[1], digest, b"tx"))
            .await
            .unwrap();
        assert!(gossip_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_observation_from_outsider_is_dropped() {
        let TestProcessorHarness {
            mut processor,
            mut gossip_rx,
            ..
        } = make_processor_for_testing(3, 0);

        let msg = get_test_message_publication();
        let digest = msg.to_unsigned_vaa(0).signing_digest();
        processor.handle_message(msg).await.unwrap();
        let _ = gossip_rx.recv().await;

        let outsider: GuardianKeyPair = guardian_types::crypto::get_key_pair();
        processor
            .handle_observation(signed_observation_from(&outsider, digest, b"tx"))
            .await
            .unwrap();

        // Outsider signature was not recorded.
        let state = processor.observation_state(&hex::encode(digest)).unwrap();
        assert_eq!(state.signatures.len(), 1);
    }

    #[tokio::test]
    async fn test_observation_with_mismatched_claimed_signer_is_dropped() {
        let TestProcessorHarness {
            mut processor,
            keys,
            ..
        } = make_processor_for_testing(3, 0);
        let gs = GuardianSet::new(0, keys.iter().map(guardian_address).collect()).unwrap();
        processor.set_guardian_set_for_test(gs);

        let digest = crypto::keccak256(b"some digest");
        let mut obsv = signed_observation_from(&keys[1], digest, b"tx");
        obsv.addr = guardian_address(&keys[2]); // lie about the signer
        processor.handle_observation(obsv).await.unwrap();
        assert!(processor
            .observation_state(&hex::encode(digest))
            .is_none());
    }

    #[tokio::test]
    async fn test_peer_observation_before_ours_creates_state() {
        let TestProcessorHarness {
            mut processor,
            keys,
            ..
        } = make_processor_for_testing(3, 0);

        let digest = crypto::keccak256(b"unseen event");
        processor
            .handle_observation(signed_observation_from(&keys[1], digest, b"tx-hash"))
            .await
            .unwrap();

        let state = processor.observation_state(&hex::encode(digest)).unwrap();
        assert!(state.our_observation.is_none());
        assert_eq!(state.signatures.len(), 1);
        assert_eq!(state.tx_hash, b"tx-hash".to_vec());
    }

    #[tokio::test]
    async fn test_no_submission_without_own_observation() {
        let TestProcessorHarness {
            mut processor,
            mut gossip_rx,
            keys,
            ..
        } = make_processor_for_testing(3, 0);

        // All three guardians sign, but we never saw the message ourselves:
        // no VAA can be assembled (we have no body to marshal).
        let digest = crypto::keccak256(b"unseen event");
        for key in &keys {
            processor
                .handle_observation(signed_observation_from(key, digest, b"tx"))
                .await
                .unwrap();
        }
        assert!(gossip_rx.try_recv().is_err());
        assert!(!processor
            .observation_state(&hex::encode(digest))
            .unwrap()
            .submitted);
    }

    #[tokio::test]
    async fn test_set_rotation_only_counts_new_set_for_new_digests() {
        let TestProcessorHarness {
            mut processor,
            mut gossip_rx,
            keys,
            ..
        } = make_processor_for_testing(4, 0);

        // Rotate to a new, smaller set: guardians 0 and 1 only.
        let new_set = GuardianSet::new(
            1,
            vec![guardian_address(&keys[0]), guardian_address(&keys[1])],
        )
        .unwrap();
        processor.set_guardian_set_for_test(new_set);

        let msg = get_test_message_publication();
        // The unsigned VAA now references set 1.
        let digest = msg.to_unsigned_vaa(1).signing_digest();
        processor.handle_message(msg.clone()).await.unwrap();
        let _ = gossip_rx.recv().await;

        // Old-set members 2 and 3 still pass membership via the previous
        // set's grace period, but their signatures do not count toward the
        // new set's quorum.
        processor
            .handle_observation(signed_observation_from(&keys[2], digest, b"tx"))
            .await
            .unwrap();
        processor
            .handle_observation(signed_observation_from(&keys[3], digest, b"tx"))
            .await
            .unwrap();
        assert!(gossip_rx.try_recv().is_err());

        // A new-set member completes the quorum of 2.
        processor
            .handle_observation(signed_observation_from(&keys[1], digest, b"tx"))
            .await
            .unwrap();
        let Some(GossipEnvelope::SignedVaaWithQuorum(signed)) = gossip_rx.recv().await else {
            panic!("expected the signed VAA");
        };
        let v = crate::vaa::Vaa::decode(&signed.vaa_bytes).unwrap();
        assert_eq!(v.guardian_set_index, 1);
        assert_eq!(v.signatures.len(), 2);
    }

    #[tokio::test]
    async fn test_inbound_signed_vaa_is_verified_and_stored() {
        let TestProcessorHarness {
            mut processor,
            keys,
            store,
            ..
        } = make_processor_for_testing(3, 0);

        let msg = get_test_message_publication();
        let mut v = msg.to_unsigned_vaa(0);
        for (i, key) in keys.iter().enumerate() {
            v.add_signature(key, i as u8);
        }
        processor.handle_signed_vaa_with_quorum(&v.encode()).unwrap();
        assert!(store.has_vaa(v.id()).unwrap());

        // Garbage and insufficiently signed VAAs are dropped without error.
        processor.handle_signed_vaa_with_quorum(&[1, 2, 3]).unwrap();
        let mut undersigned = msg.to_unsigned_vaa(0);
        undersigned.sequence += 1;
        undersigned.add_signature(&keys[0], 0);
        processor
            .handle_signed_vaa_with_quorum(&undersigned.encode())
            .unwrap();
        assert!(!store
            .has_vaa(VaaId::new(
                undersigned.emitter_chain,
                undersigned.emitter_address,
                undersigned.sequence
            ))
            .unwrap());
    }

    #[tokio::test]
    async fn test_inbound_signed_vaa_settles_matching_state() {
        let TestProcessorHarness {
            mut processor,
            mut gossip_rx,
            keys,
            ..
        } = make_processor_for_testing(3, 0);

        let msg = get_test_message_publication();
        let digest = msg.to_unsigned_vaa(0).signing_digest();
        processor.handle_message(msg.clone()).await.unwrap();
        let _ = gossip_rx.recv().await;

        let mut v = msg.to_unsigned_vaa(0);
        for (i, key) in keys.iter().enumerate() {
            v.add_signature(key, i as u8);
        }
        processor.handle_signed_vaa_with_quorum(&v.encode()).unwrap();

        assert!(processor
            .observation_state(&hex::encode(digest))
            .unwrap()
            .submitted);
    }
}
