// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

//! Node wiring: opens the store, builds the channel mesh, spawns the
//! processor, the query lane and the admin server, and seeds the initial
//! guardian set. Watchers and the gossip transport are external
//! collaborators; they attach to the channel endpoints exposed in
//! [`GuardianNodeHandles`].

use crate::config::GuardianRuntimeConfig;
use crate::crypto::GuardianKeyPair;
use crate::gossip::{
    GossipEnvelope, ObservationRequest, SignedObservation, SignedQueryRequest,
    SignedQueryResponse, SignedVaaWithQuorum,
};
use crate::governor::ChainGovernor;
use crate::metrics::GuardianMetrics;
use crate::processor::Processor;
use crate::query::handler::{PerChainQueryInternal, PerChainQueryResponseInternal, QueryHandler};
use crate::server::{run_server, AdminRequestHandler, GuardianNodePublicMetadata};
use crate::store::VaaStore;
use crate::types::{GuardianSetState, MessagePublication};
use fastcrypto::traits::ToFromBytes;
use guardian_types::ChainId;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Capacity of the inter-task channels. Senders on the watcher side block
/// when the processor falls behind; gossip-bound sends are drop-on-full.
const CHANNEL_CAPACITY: usize = 1024;

/// The channel endpoints external collaborators attach to.
pub struct ExternalChannels {
    /// Watchers publish observed messages here.
    pub msg_tx: mpsc::Sender<MessagePublication>,
    /// The gossip transport delivers peer observations here.
    pub obsv_tx: mpsc::Sender<SignedObservation>,
    /// The gossip transport delivers signed VAAs with quorum here.
    pub signed_in_tx: mpsc::Sender<SignedVaaWithQuorum>,
    /// Watchers deliver guardian-set updates observed on chain here.
    pub set_tx: mpsc::Sender<crate::types::GuardianSet>,
    /// Everything the node wants broadcast on the bus.
    pub gossip_rx: mpsc::Receiver<GossipEnvelope>,
    /// Re-observation requests bound for the bus and our own watchers.
    pub obsv_req_rx: mpsc::Receiver<ObservationRequest>,
    /// The gossip transport delivers signed query requests here (when CCQ
    /// is enabled).
    pub query_req_tx: Option<mpsc::Sender<SignedQueryRequest>>,
    /// The gossip transport delivers peers' signed query responses here.
    pub query_resp_tx: Option<mpsc::Sender<SignedQueryResponse>>,
    /// Per-chain query bodies bound for the watchers.
    pub watcher_query_rx: HashMap<ChainId, mpsc::Receiver<PerChainQueryInternal>>,
    /// Watchers answer per-chain queries here.
    pub watcher_query_resp_tx: Option<mpsc::Sender<PerChainQueryResponseInternal>>,
}

pub struct GuardianNodeHandles {
    pub processor: JoinHandle<crate::error::GuardianResult<()>>,
    pub query_handler: Option<JoinHandle<crate::error::GuardianResult<()>>>,
    pub server: JoinHandle<()>,
    pub metrics_server: JoinHandle<()>,
    pub channels: ExternalChannels,
    pub shutdown: CancellationToken,
}

pub async fn run_guardian_node(
    runtime: GuardianRuntimeConfig,
    metadata: GuardianNodePublicMetadata,
    prometheus_registry: prometheus::Registry,
) -> anyhow::Result<GuardianNodeHandles> {
    let metrics = Arc::new(GuardianMetrics::new(&prometheus_registry));
    let start_time = std::time::Instant::now();

    // Server uptime tracking task
    let uptime_metrics = metrics.clone();
    tokio::spawn(async move {
        loop {
            uptime_metrics
                .server_uptime_seconds
                .set(start_time.elapsed().as_secs() as i64);
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        }
    });

    let shutdown = CancellationToken::new();

    let store = Arc::new(VaaStore::open(runtime.data_dir.join("vaas"))?);
    let gst = Arc::new(GuardianSetState::new());

    let governor = if runtime.chain_governor_enabled {
        Some(Arc::new(ChainGovernor::new(runtime.environment)?))
    } else {
        None
    };

    let (msg_tx, msg_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (set_tx, set_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (obsv_tx, obsv_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (signed_in_tx, signed_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (gossip_tx, gossip_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (obsv_req_tx, obsv_req_rx) = mpsc::channel(CHANNEL_CAPACITY);

    // Seed the configured guardian set; watchers replace it when they see a
    // rotation on chain.
    set_tx
        .send(runtime.initial_guardian_set.clone())
        .await
        .expect("set channel cannot be closed yet");

    let processor = Processor::new(
        runtime.environment,
        msg_rx,
        set_rx,
        obsv_rx,
        signed_rx,
        gossip_tx.clone(),
        obsv_req_tx.clone(),
        clone_key(&runtime.guardian_key),
        store.clone(),
        gst.clone(),
        governor.clone(),
        metrics.clone(),
        shutdown.clone(),
    );
    let processor_handle = tokio::spawn(processor.run());

    // The query lane, when enabled.
    let mut query_req_tx = None;
    let mut query_resp_tx = None;
    let mut watcher_query_rx = HashMap::new();
    let mut watcher_query_resp_tx = None;
    let query_handler_handle = if runtime.ccq_enabled {
        let (req_tx, req_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (resp_tx, resp_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (watcher_resp_tx, watcher_resp_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let mut watcher_req_tx = HashMap::new();
        for chain in [ChainId::SOLANA] {
            let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
            watcher_req_tx.insert(chain, tx);
            watcher_query_rx.insert(chain, rx);
        }

        let handler = QueryHandler::new(
            runtime.environment,
            runtime.ccq_allowed_requesters.clone(),
            req_rx,
            resp_rx,
            watcher_resp_rx,
            watcher_req_tx,
            gossip_tx.clone(),
            clone_key(&runtime.guardian_key),
            gst.clone(),
            metrics.clone(),
            shutdown.clone(),
        );
        query_req_tx = Some(req_tx);
        query_resp_tx = Some(resp_tx);
        watcher_query_resp_tx = Some(watcher_resp_tx);
        Some(tokio::spawn(handler.run()))
    } else {
        None
    };

    // Admin server.
    let admin_handler = AdminRequestHandler::new(
        store.clone(),
        msg_tx.clone(),
        obsv_req_tx.clone(),
        signed_in_tx.clone(),
        governor.clone(),
        clone_key(&runtime.guardian_key),
        gst.clone(),
        runtime.rpc_map.clone(),
        metrics.clone(),
    );
    let socket_address = SocketAddr::new(
        IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
        runtime.server_listen_port,
    );
    let server_handle = run_server(
        &socket_address,
        admin_handler,
        metrics.clone(),
        Arc::new(metadata),
    );
    info!("admin server listening on {socket_address}");

    let metrics_server_handle =
        start_metrics_server(runtime.metrics_port, prometheus_registry.clone());
    info!("metrics server listening on port {}", runtime.metrics_port);

    Ok(GuardianNodeHandles {
        processor: processor_handle,
        query_handler: query_handler_handle,
        server: server_handle,
        metrics_server: metrics_server_handle,
        channels: ExternalChannels {
            msg_tx,
            obsv_tx,
            signed_in_tx,
            set_tx,
            gossip_rx,
            obsv_req_rx,
            query_req_tx,
            query_resp_tx,
            watcher_query_rx,
            watcher_query_resp_tx,
        },
        shutdown,
    })
}

/// Serve the prometheus registry as text on `/metrics`.
fn start_metrics_server(port: u16, registry: prometheus::Registry) -> JoinHandle<()> {
    use axum::routing::get;

    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), port);
    tokio::spawn(async move {
        let app = axum::Router::new().route(
            "/metrics",
            get(move || {
                let registry = registry.clone();
                async move {
                    let metric_families = registry.gather();
                    prometheus::TextEncoder::new()
                        .encode_to_string(&metric_families)
                        .unwrap_or_default()
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        axum::serve(listener, app.into_make_service()).await.unwrap();
    })
}

// Secp256k1KeyPair does not implement Clone; copy through its secret bytes.
fn clone_key(key: &GuardianKeyPair) -> GuardianKeyPair {
    GuardianKeyPair::from_bytes(key.as_bytes()).expect("valid key bytes")
}
