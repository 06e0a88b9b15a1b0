// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_vec_with_registry,
    register_int_gauge_with_registry, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Registry,
};

const PROCESSING_LATENCY_SEC_BUCKETS: &[f64] = &[
    0.00001, 0.00002, 0.00005, 0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
];

#[derive(Clone, Debug)]
#[allow(dead_code)]
pub struct GuardianMetrics {
    // Aggregation pipeline
    pub(crate) observations_received: IntCounter,
    pub(crate) observations_unknown_guardian: IntCounter,
    pub(crate) observations_invalid: IntCounter,
    pub(crate) observations_broadcast: IntCounter,
    pub(crate) observations_missed_quorum: IntCounter,
    pub(crate) observation_processing_seconds: Histogram,
    pub(crate) signed_vaas_assembled: IntCounter,
    pub(crate) signed_vaas_received: IntCounter,
    pub(crate) signed_vaas_invalid: IntCounter,
    pub(crate) reobservation_requests_sent: IntCounter,
    pub(crate) gossip_sends_dropped: IntCounter,
    pub(crate) guardian_set_index: IntGauge,

    // Governor
    pub(crate) governor_messages_enqueued: IntCounter,
    pub(crate) governor_messages_released: IntCounter,

    // Query lane
    pub(crate) query_requests_received: IntCounter,
    pub(crate) query_requests_invalid: IntCounter,
    pub(crate) query_requests_unauthorized: IntCounter,
    pub(crate) query_responses_signed: IntCounter,
    pub(crate) query_responses_received: IntCounter,
    pub(crate) query_responses_quorum: IntCounter,

    // Admin surface
    pub(crate) vaa_injections_total: IntCounter,
    pub(crate) requests_received: IntCounterVec,
    pub(crate) requests_ok: IntCounterVec,
    pub(crate) err_requests: IntCounterVec,
    pub(crate) requests_inflight: IntGaugeVec,

    pub(crate) server_uptime_seconds: IntGauge,
}

impl GuardianMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            observations_received: register_int_counter_with_registry!(
                "guardian_observations_received",
                "Total number of signed observations received from gossip",
                registry,
            )
            .unwrap(),
            observations_unknown_guardian: register_int_counter_with_registry!(
                "guardian_observations_unknown_guardian",
                "Signed observations whose signer is in no currently valid guardian set",
                registry,
            )
            .unwrap(),
            observations_invalid: register_int_counter_with_registry!(
                "guardian_observations_invalid",
                "Signed observations that failed signature recovery or verification",
                registry,
            )
            .unwrap(),
            observations_broadcast: register_int_counter_with_registry!(
                "guardian_observations_broadcast",
                "Own observations signed and broadcast on gossip",
                registry,
            )
            .unwrap(),
            observations_missed_quorum: register_int_counter_with_registry!(
                "guardian_observations_missed_quorum",
                "Observation states settled without ever reaching quorum",
                registry,
            )
            .unwrap(),
            observation_processing_seconds: register_histogram_with_registry!(
                "guardian_observation_processing_seconds",
                "Latency histogram for processing one signed observation",
                PROCESSING_LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
            signed_vaas_assembled: register_int_counter_with_registry!(
                "guardian_signed_vaas_assembled",
                "VAAs assembled and persisted after reaching quorum locally",
                registry,
            )
            .unwrap(),
            signed_vaas_received: register_int_counter_with_registry!(
                "guardian_signed_vaas_received",
                "Signed VAAs with quorum received from gossip or backfill",
                registry,
            )
            .unwrap(),
            signed_vaas_invalid: register_int_counter_with_registry!(
                "guardian_signed_vaas_invalid",
                "Inbound signed VAAs that failed decoding or verification",
                registry,
            )
            .unwrap(),
            reobservation_requests_sent: register_int_counter_with_registry!(
                "guardian_reobservation_requests_sent",
                "Re-observation requests emitted on gossip",
                registry,
            )
            .unwrap(),
            gossip_sends_dropped: register_int_counter_with_registry!(
                "guardian_gossip_sends_dropped",
                "Gossip sends dropped because the outbound channel was full",
                registry,
            )
            .unwrap(),
            guardian_set_index: register_int_gauge_with_registry!(
                "guardian_current_guardian_set_index",
                "Index of the currently installed guardian set",
                registry,
            )
            .unwrap(),
            governor_messages_enqueued: register_int_counter_with_registry!(
                "guardian_governor_messages_enqueued",
                "Messages held back by the chain governor",
                registry,
            )
            .unwrap(),
            governor_messages_released: register_int_counter_with_registry!(
                "guardian_governor_messages_released",
                "Pending messages released by the chain governor",
                registry,
            )
            .unwrap(),
            query_requests_received: register_int_counter_with_registry!(
                "guardian_query_requests_received",
                "Signed query requests received",
                registry,
            )
            .unwrap(),
            query_requests_invalid: register_int_counter_with_registry!(
                "guardian_query_requests_invalid",
                "Signed query requests dropped as malformed or invalid",
                registry,
            )
            .unwrap(),
            query_requests_unauthorized: register_int_counter_with_registry!(
                "guardian_query_requests_unauthorized",
                "Signed query requests from requesters not on the allowlist",
                registry,
            )
            .unwrap(),
            query_responses_signed: register_int_counter_with_registry!(
                "guardian_query_responses_signed",
                "Query response publications signed and broadcast",
                registry,
            )
            .unwrap(),
            query_responses_received: register_int_counter_with_registry!(
                "guardian_query_responses_received",
                "Peer query responses received from gossip",
                registry,
            )
            .unwrap(),
            query_responses_quorum: register_int_counter_with_registry!(
                "guardian_query_responses_quorum",
                "Query responses that accumulated a quorum of guardian signatures",
                registry,
            )
            .unwrap(),
            vaa_injections_total: register_int_counter_with_registry!(
                "guardian_vaa_injections_total",
                "Total number of injected VAAs queued for broadcast",
                registry,
            )
            .unwrap(),
            requests_received: register_int_counter_vec_with_registry!(
                "guardian_requests_received",
                "Total admin requests received, by request type",
                &["type"],
                registry,
            )
            .unwrap(),
            requests_ok: register_int_counter_vec_with_registry!(
                "guardian_requests_ok",
                "Total admin requests that succeeded, by request type",
                &["type"],
                registry,
            )
            .unwrap(),
            err_requests: register_int_counter_vec_with_registry!(
                "guardian_err_requests",
                "Total admin requests that failed, by request type",
                &["type"],
                registry,
            )
            .unwrap(),
            requests_inflight: register_int_gauge_vec_with_registry!(
                "guardian_requests_inflight",
                "In-flight admin requests, by request type",
                &["type"],
                registry,
            )
            .unwrap(),
            server_uptime_seconds: register_int_gauge_with_registry!(
                "guardian_server_uptime_seconds",
                "Process uptime in seconds",
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::new(&Registry::new()))
    }
}
