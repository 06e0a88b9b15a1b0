// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

//! The query lane: signed query requests arrive from gossip, fan out to the
//! per-chain watchers, and the per-chain answers are assembled into a signed
//! response publication. Peer responses for the same request aggregate
//! through the same quorum logic as observations, applied to the response
//! digest family.

use crate::crypto::{self, GuardianKeyPair, SIGNATURE_LENGTH};
use crate::error::GuardianResult;
use crate::gossip::{GossipEnvelope, SignedQueryRequest, SignedQueryResponse};
use crate::metrics::GuardianMetrics;
use crate::processor::{count_set_signatures, ObservationState};
use crate::query::{
    query_request_digest, query_response_digest, ChainSpecificResponse, PerChainQueryRequest,
    PerChainQueryResponse, QueryRequest, QueryResponsePublication,
};
use crate::types::{GuardianSetState, Observation};
use ethers::types::Address as EthAddress;
use guardian_types::{ChainId, Environment};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long we wait for watchers before giving up on a request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Aggregation states for response digests are dropped after this age.
pub const AGGREGATION_RETENTION: Duration = Duration::from_secs(5 * 60);

const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

/// One per-chain query en route to a watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerChainQueryInternal {
    pub request_id: String,
    pub request_idx: usize,
    pub request: PerChainQueryRequest,
}

/// One watcher's answer to a [`PerChainQueryInternal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerChainQueryResponseInternal {
    pub request_id: String,
    pub request_idx: usize,
    pub chain_id: ChainId,
    pub response: ChainSpecificResponse,
}

struct PendingQuery {
    signed: SignedQueryRequest,
    responses: Vec<Option<PerChainQueryResponse>>,
    outstanding: usize,
    expires: Instant,
}

pub struct QueryHandler {
    env: Environment,
    /// Requesters allowed to use the lane. An empty list means the lane is
    /// open (devnet only; startup validation enforces this).
    allowed_requesters: Vec<EthAddress>,

    signed_req_rx: mpsc::Receiver<SignedQueryRequest>,
    signed_resp_rx: mpsc::Receiver<SignedQueryResponse>,
    watcher_resp_rx: mpsc::Receiver<PerChainQueryResponseInternal>,
    watcher_req_tx: HashMap<ChainId, mpsc::Sender<PerChainQueryInternal>>,
    gossip_tx: mpsc::Sender<GossipEnvelope>,

    guardian_key: GuardianKeyPair,
    our_addr: EthAddress,
    gst: Arc<GuardianSetState>,

    /// Requests waiting for watcher answers, by request id.
    pending: HashMap<String, PendingQuery>,
    /// Response aggregation by hex response digest; the same state type the
    /// VAA lane uses.
    aggregation: HashMap<String, ObservationState>,

    metrics: Arc<GuardianMetrics>,
    shutdown: CancellationToken,
}

#[allow(clippy::too_many_arguments)]
impl QueryHandler {
    pub fn new(
        env: Environment,
        allowed_requesters: Vec<EthAddress>,
        signed_req_rx: mpsc::Receiver<SignedQueryRequest>,
        signed_resp_rx: mpsc::Receiver<SignedQueryResponse>,
        watcher_resp_rx: mpsc::Receiver<PerChainQueryResponseInternal>,
        watcher_req_tx: HashMap<ChainId, mpsc::Sender<PerChainQueryInternal>>,
        gossip_tx: mpsc::Sender<GossipEnvelope>,
        guardian_key: GuardianKeyPair,
        gst: Arc<GuardianSetState>,
        metrics: Arc<GuardianMetrics>,
        shutdown: CancellationToken,
    ) -> Self {
        let our_addr = crypto::guardian_address(&guardian_key);
        Self {
            env,
            allowed_requesters,
            signed_req_rx,
            signed_resp_rx,
            watcher_resp_rx,
            watcher_req_tx,
            gossip_tx,
            guardian_key,
            our_addr,
            gst,
            pending: HashMap::new(),
            aggregation: HashMap::new(),
            metrics,
            shutdown,
        }
    }

    pub async fn run(mut self) -> GuardianResult<()> {
        let mut cleanup = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("query handler shutting down");
                    return Ok(());
                }
                Some(req) = self.signed_req_rx.recv() => {
                    self.handle_signed_request(req);
                }
                Some(resp) = self.watcher_resp_rx.recv() => {
                    self.handle_watcher_response(resp).await;
                }
                Some(resp) = self.signed_resp_rx.recv() => {
                    self.handle_peer_response(resp);
                }
                _ = cleanup.tick() => {
                    self.handle_cleanup(Instant::now());
                }
            }
        }
    }

    /// Validate a signed request and fan its per-chain bodies out to the
    /// watchers.
    pub(crate) fn handle_signed_request(&mut self, signed: SignedQueryRequest) {
        self.metrics.query_requests_received.inc();

        let digest = query_request_digest(self.env, &signed.query_request);
        let requester = match crypto::recover_signer(&digest, &signed.signature) {
            Ok(addr) => addr,
            Err(e) => {
                self.metrics.query_requests_invalid.inc();
                warn!("dropping query request with unrecoverable signature: {e:?}");
                return;
            }
        };
        if !self.allowed_requesters.is_empty() && !self.allowed_requesters.contains(&requester) {
            // Unauthorized requests are dropped silently, counter only.
            self.metrics.query_requests_unauthorized.inc();
            return;
        }

        let request = match QueryRequest::decode(&signed.query_request) {
            Ok(request) => request,
            Err(e) => {
                self.metrics.query_requests_invalid.inc();
                warn!("dropping malformed query request: {e:?}");
                return;
            }
        };

        let request_id = hex::encode(signed.signature);
        if self.pending.contains_key(&request_id) {
            debug!(request_id = %request_id, "duplicate query request already in flight");
            return;
        }

        let mut outstanding = 0usize;
        for (idx, per_chain) in request.per_chain_queries.iter().enumerate() {
            let Some(watcher) = self.watcher_req_tx.get(&per_chain.chain_id) else {
                warn!(
                    request_id = %request_id,
                    chain = %per_chain.chain_id,
                    "no watcher for queried chain, dropping request"
                );
                self.metrics.query_requests_invalid.inc();
                return;
            };
            if watcher
                .try_send(PerChainQueryInternal {
                    request_id: request_id.clone(),
                    request_idx: idx,
                    request: per_chain.clone(),
                })
                .is_err()
            {
                self.metrics.gossip_sends_dropped.inc();
                warn!(request_id = %request_id, "watcher query channel full, dropping request");
                return;
            }
            outstanding += 1;
        }

        debug!(
            request_id = %request_id,
            requester = %format!("{requester:#x}"),
            queries = outstanding,
            "query request fanned out to watchers"
        );
        self.pending.insert(
            request_id,
            PendingQuery {
                signed,
                responses: vec![None; request.per_chain_queries.len()],
                outstanding,
                expires: Instant::now() + REQUEST_TIMEOUT,
            },
        );
    }

    /// Fill in one watcher answer; once the request is complete, sign and
    /// broadcast the response publication.
    pub(crate) async fn handle_watcher_response(&mut self, resp: PerChainQueryResponseInternal) {
        let Some(pending) = self.pending.get_mut(&resp.request_id) else {
            debug!(
                request_id = %resp.request_id,
                "watcher response for unknown or expired request"
            );
            return;
        };
        let Some(slot) = pending.responses.get_mut(resp.request_idx) else {
            warn!(
                request_id = %resp.request_id,
                request_idx = resp.request_idx,
                "watcher response index out of range"
            );
            return;
        };
        if slot.is_none() {
            pending.outstanding -= 1;
        }
        *slot = Some(PerChainQueryResponse {
            chain_id: resp.chain_id,
            response: resp.response,
        });
        if pending.outstanding > 0 {
            return;
        }

        let pending = self.pending.remove(&resp.request_id).expect("checked above");
        let publication = QueryResponsePublication {
            request_bytes: pending.signed.query_request.clone(),
            request_signature: pending.signed.signature,
            per_chain_responses: pending.responses.into_iter().flatten().collect(),
        };

        let response_bytes = match publication.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("assembled query response failed to encode: {e:?}");
                return;
            }
        };
        let digest = query_response_digest(self.env, &response_bytes);
        let signature = crypto::sign_digest(&self.guardian_key, &digest);

        info!(
            request_id = %resp.request_id,
            digest = %hex::encode(digest),
            "query response assembled, signing and broadcasting"
        );
        self.metrics.query_responses_signed.inc();
        if self
            .gossip_tx
            .send(GossipEnvelope::SignedQueryResponse(SignedQueryResponse {
                query_response: response_bytes,
                signature,
            }))
            .await
            .is_err()
        {
            warn!("gossip channel closed while broadcasting query response");
            return;
        }

        // Track our own signature in the aggregation for this digest.
        let our_addr = self.our_addr;
        let state = self
            .aggregation
            .entry(hex::encode(digest))
            .or_insert_with(|| ObservationState::new(Instant::now()));
        state.our_observation = Some(Observation::QueryResponse(Box::new(publication)));
        state.source = "query";
        state.signatures.insert(our_addr, signature);
        self.check_response_quorum(&hex::encode(digest));
    }

    /// Absorb a peer's signed response into the aggregation for its digest.
    pub(crate) fn handle_peer_response(&mut self, signed: SignedQueryResponse) {
        self.metrics.query_responses_received.inc();

        let digest = query_response_digest(self.env, &signed.query_response);
        let signer = match crypto::recover_signer(&digest, &signed.signature) {
            Ok(addr) => addr,
            Err(e) => {
                self.metrics.observations_invalid.inc();
                warn!("dropping query response with unrecoverable signature: {e:?}");
                return;
            }
        };
        let in_current = self
            .gst
            .current()
            .map(|gs| gs.contains(&signer))
            .unwrap_or(false);
        let in_previous = self
            .gst
            .previous_if_valid()
            .map(|gs| gs.contains(&signer))
            .unwrap_or(false);
        if !in_current && !in_previous {
            self.metrics.observations_unknown_guardian.inc();
            return;
        }

        let hex_digest = hex::encode(digest);
        let state = self
            .aggregation
            .entry(hex_digest.clone())
            .or_insert_with(|| ObservationState::new(Instant::now()));
        state.signatures.insert(signer, signed.signature);
        self.check_response_quorum(&hex_digest);
    }

    fn check_response_quorum(&mut self, hex_digest: &str) {
        let Some(gs) = self.gst.current() else {
            return;
        };
        let Some(state) = self.aggregation.get_mut(hex_digest) else {
            return;
        };
        if state.submitted || state.our_observation.is_none() {
            return;
        }
        let have = count_set_signatures(&state.signatures, &gs);
        if have < gs.quorum() {
            return;
        }
        // Quorum is the terminal event in this lane: consumers assemble the
        // full proof from the individual signed responses.
        info!(
            digest = hex_digest,
            signatures = have,
            "query response reached quorum"
        );
        state.submitted = true;
        self.metrics.query_responses_quorum.inc();
    }

    pub(crate) fn handle_cleanup(&mut self, now: Instant) {
        self.pending.retain(|request_id, pending| {
            if now < pending.expires {
                return true;
            }
            warn!(request_id = %request_id, "query request expired waiting for watchers");
            false
        });
        self.aggregation.retain(|_, state| {
            now.saturating_duration_since(state.first_observed) < AGGREGATION_RETENTION
        });
    }

    /// The signature of a query request we would accept, for tests and the
    /// request tooling.
    pub fn sign_request(
        env: Environment,
        key: &GuardianKeyPair,
        request: &QueryRequest,
    ) -> GuardianResult<SignedQueryRequest> {
        let query_request = request.encode()?;
        let digest = query_request_digest(env, &query_request);
        let signature: [u8; SIGNATURE_LENGTH] = crypto::sign_digest(key, &digest);
        Ok(SignedQueryRequest {
            query_request,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::guardian_address;
    use crate::query::{
        ChainSpecificQuery, SolanaAccountQueryRequest, SolanaAccountQueryResponse,
        SolanaAccountResult,
    };
    use crate::test_utils::get_test_guardian_keys;
    use crate::types::GuardianSet;
    use fastcrypto::traits::ToFromBytes;

    struct TestQueryHarness {
        handler: QueryHandler,
        gossip_rx: mpsc::Receiver<GossipEnvelope>,
        watcher_rx: mpsc::Receiver<PerChainQueryInternal>,
        keys: Vec<GuardianKeyPair>,
        requester: GuardianKeyPair,
    }

    fn make_handler(num_guardians: usize, allow_requester: bool) -> TestQueryHarness {
        let keys = get_test_guardian_keys(num_guardians);
        let requester: GuardianKeyPair = guardian_types::crypto::get_key_pair();

        let gst = Arc::new(GuardianSetState::new());
        gst.set(Arc::new(
            GuardianSet::new(0, keys.iter().map(guardian_address).collect()).unwrap(),
        ));

        let (_req_tx, signed_req_rx) = mpsc::channel(8);
        let (_resp_tx, signed_resp_rx) = mpsc::channel(8);
        let (_wresp_tx, watcher_resp_rx) = mpsc::channel(8);
        let (watcher_tx, watcher_rx) = mpsc::channel(8);
        let (gossip_tx, gossip_rx) = mpsc::channel(8);

        let mut watcher_req_tx = HashMap::new();
        watcher_req_tx.insert(ChainId::SOLANA, watcher_tx);

        let allowed = if allow_requester {
            vec![guardian_address(&requester)]
        } else {
            vec![guardian_address(&keys[0])]
        };

        let our_key = GuardianKeyPair::from_bytes(keys[0].as_bytes()).unwrap();
        let handler = QueryHandler::new(
            Environment::UnsafeDevNet,
            allowed,
            signed_req_rx,
            signed_resp_rx,
            watcher_resp_rx,
            watcher_req_tx,
            gossip_tx,
            our_key,
            gst,
            GuardianMetrics::new_for_testing(),
            CancellationToken::new(),
        );
        TestQueryHarness {
            handler,
            gossip_rx,
            watcher_rx,
            keys,
            requester,
        }
    }

    fn test_request() -> QueryRequest {
        QueryRequest {
            nonce: 7,
            per_chain_queries: vec![PerChainQueryRequest {
                chain_id: ChainId::SOLANA,
                query: ChainSpecificQuery::SolAccount(SolanaAccountQueryRequest {
                    commitment: "finalized".to_string(),
                    accounts: vec![[3u8; 32]],
                    ..Default::default()
                }),
            }],
        }
    }

    fn test_response_for(idx: usize) -> ChainSpecificResponse {
        ChainSpecificResponse::SolAccount(SolanaAccountQueryResponse {
            slot_number: 1000 + idx as u64,
            block_time_us: 42,
            block_hash: [9u8; 32],
            results: vec![SolanaAccountResult {
                lamports: 5,
                ..Default::default()
            }],
        })
    }

    #[tokio::test]
    async fn test_request_fans_out_and_response_is_signed() {
        let TestQueryHarness {
            mut handler,
            mut gossip_rx,
            mut watcher_rx,
            requester,
            ..
        } = make_handler(1, true);

        let signed =
            QueryHandler::sign_request(Environment::UnsafeDevNet, &requester, &test_request())
                .unwrap();
        handler.handle_signed_request(signed.clone());

        // The per-chain body reached the watcher.
        let internal = watcher_rx.try_recv().unwrap();
        assert_eq!(internal.request_idx, 0);
        assert_eq!(internal.request.chain_id, ChainId::SOLANA);

        // Answer it; the handler signs and broadcasts the publication.
        handler
            .handle_watcher_response(PerChainQueryResponseInternal {
                request_id: internal.request_id.clone(),
                request_idx: 0,
                chain_id: ChainId::SOLANA,
                response: test_response_for(0),
            })
            .await;

        let Ok(GossipEnvelope::SignedQueryResponse(resp)) = gossip_rx.try_recv() else {
            panic!("expected a signed query response");
        };
        let publication = QueryResponsePublication::decode(&resp.query_response).unwrap();
        assert_eq!(publication.request_bytes, signed.query_request);
        assert_eq!(publication.per_chain_responses.len(), 1);

        // Quorum of 1: our own signature settles the aggregation.
        let digest = query_response_digest(Environment::UnsafeDevNet, &resp.query_response);
        assert!(handler.aggregation[&hex::encode(digest)].submitted);
    }

    #[tokio::test]
    async fn test_unauthorized_requester_is_dropped_silently() {
        let TestQueryHarness {
            mut handler,
            mut watcher_rx,
            requester,
            ..
        } = make_handler(1, false);

        let signed =
            QueryHandler::sign_request(Environment::UnsafeDevNet, &requester, &test_request())
                .unwrap();
        handler.handle_signed_request(signed);
        assert!(watcher_rx.try_recv().is_err());
        assert!(handler.pending.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_request_is_dropped() {
        let TestQueryHarness {
            mut handler,
            mut watcher_rx,
            requester,
            ..
        } = make_handler(1, true);

        // Correctly signed, but the payload is garbage.
        let bogus = b"not a query".to_vec();
        let digest = query_request_digest(Environment::UnsafeDevNet, &bogus);
        let signed = SignedQueryRequest {
            query_request: bogus,
            signature: crypto::sign_digest(&requester, &digest),
        };
        handler.handle_signed_request(signed);
        assert!(watcher_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_peer_responses_aggregate_to_quorum() {
        let TestQueryHarness {
            mut handler,
            mut gossip_rx,
            mut watcher_rx,
            keys,
            requester,
        } = make_handler(3, true);

        let signed =
            QueryHandler::sign_request(Environment::UnsafeDevNet, &requester, &test_request())
                .unwrap();
        handler.handle_signed_request(signed);
        let internal = watcher_rx.try_recv().unwrap();
        handler
            .handle_watcher_response(PerChainQueryResponseInternal {
                request_id: internal.request_id,
                request_idx: 0,
                chain_id: ChainId::SOLANA,
                response: test_response_for(0),
            })
            .await;

        let Ok(GossipEnvelope::SignedQueryResponse(our_resp)) = gossip_rx.try_recv() else {
            panic!("expected our signed response");
        };
        let digest =
            query_response_digest(Environment::UnsafeDevNet, &our_resp.query_response);
        let hex_digest = hex::encode(digest);
        assert!(!handler.aggregation[&hex_digest].submitted);

        // Two peers co-sign the identical response bytes: quorum of 3.
        for key in &keys[1..3] {
            handler.handle_peer_response(SignedQueryResponse {
                query_response: our_resp.query_response.clone(),
                signature: crypto::sign_digest(key, &digest),
            });
        }
        assert!(handler.aggregation[&hex_digest].submitted);
    }

    #[tokio::test]
    async fn test_peer_response_from_outsider_ignored() {
        let TestQueryHarness { mut handler, .. } = make_handler(3, true);

        let outsider: GuardianKeyPair = guardian_types::crypto::get_key_pair();
        let bytes = b"response bytes".to_vec();
        let digest = query_response_digest(Environment::UnsafeDevNet, &bytes);
        handler.handle_peer_response(SignedQueryResponse {
            query_response: bytes,
            signature: crypto::sign_digest(&outsider, &digest),
        });
        assert!(handler.aggregation.is_empty());
    }

    #[tokio::test]
    async fn test_expired_pending_requests_are_dropped() {
        let TestQueryHarness {
            mut handler,
            mut watcher_rx,
            requester,
            ..
        } = make_handler(1, true);

        let signed =
            QueryHandler::sign_request(Environment::UnsafeDevNet, &requester, &test_request())
                .unwrap();
        handler.handle_signed_request(signed);
        let _ = watcher_rx.try_recv().unwrap();
        assert_eq!(handler.pending.len(), 1);

        handler.handle_cleanup(Instant::now() + REQUEST_TIMEOUT + Duration::from_secs(1));
        assert!(handler.pending.is_empty());
    }
}
