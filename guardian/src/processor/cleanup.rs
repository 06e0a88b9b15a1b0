// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

//! Periodic maintenance of the observation map: settle aged states, count
//! quorum misses, emit re-observation requests with exponential backoff.

use super::{
    Processor, FIRST_RETRY_DELAY, MAX_RETRY_COUNT, MAX_RETRY_DELAY, SETTLEMENT_TIMEOUT,
};
use crate::gossip::{post_observation_request, ObservationRequest};
use guardian_types::ChainId;
use std::time::Instant;
use tracing::{debug, info, warn};

impl Processor {
    /// One cleanup pass over the observation map at time `now`.
    pub(crate) fn handle_cleanup(&mut self, now: Instant) {
        let mut settled_misses = 0usize;
        let mut destroyed = 0usize;
        let mut retries = Vec::new();
        let mut rebroadcasts = Vec::new();

        self.state.retain(|digest, state| {
            // Settled states are destroyed on the pass after they settle.
            if state.settled {
                destroyed += 1;
                return false;
            }

            let age = now.saturating_duration_since(state.first_observed);
            if age > SETTLEMENT_TIMEOUT {
                state.settled = true;
                if !state.submitted {
                    settled_misses += 1;
                    info!(
                        digest = %digest,
                        source = state.source,
                        signatures = state.signatures.len(),
                        "observation settled without reaching quorum"
                    );
                }
                return true;
            }

            if !state.submitted
                && state.reliable
                && now >= state.next_retry
                && state.retry_ctr < MAX_RETRY_COUNT
            {
                if state.our_observation.is_some() {
                    // We observed it but quorum is still outstanding:
                    // retransmit our signed observation for peers that
                    // missed the first broadcast.
                    if let Some(our_msg) = &state.our_msg {
                        rebroadcasts.push(our_msg.clone());
                    }
                } else if !state.tx_hash.is_empty() {
                    // Peers signed a digest we never observed ourselves:
                    // ask the watchers to look at the transaction again.
                    // The chain is unknown from the envelope alone, so the
                    // request addresses all watchers.
                    retries.push(ObservationRequest {
                        chain_id: ChainId::UNSET,
                        tx_hash: state.tx_hash.clone(),
                    });
                }
                state.retry_ctr += 1;
                let delay = (FIRST_RETRY_DELAY * 2u32.saturating_pow(state.retry_ctr))
                    .min(MAX_RETRY_DELAY);
                state.next_retry = now + delay;
                debug!(
                    digest = %digest,
                    retry_ctr = state.retry_ctr,
                    next_delay_secs = delay.as_secs(),
                    "retrying unsettled observation"
                );
            }

            true
        });

        for request in retries {
            match post_observation_request(&self.obsv_req_tx, request) {
                Ok(()) => self.metrics.reobservation_requests_sent.inc(),
                Err(_) => {
                    self.metrics.gossip_sends_dropped.inc();
                    warn!("re-observation request channel full, dropping request");
                }
            }
        }

        for envelope in rebroadcasts {
            if self
                .gossip_tx
                .try_send(crate::gossip::GossipEnvelope::SignedObservation(envelope))
                .is_err()
            {
                self.metrics.gossip_sends_dropped.inc();
            } else {
                self.metrics.observations_broadcast.inc();
            }
        }

        for _ in 0..settled_misses {
            self.metrics.observations_missed_quorum.inc();
        }
        if destroyed > 0 || settled_misses > 0 {
            debug!(destroyed, settled_misses, "cleanup pass finished");
        }
    }
}
