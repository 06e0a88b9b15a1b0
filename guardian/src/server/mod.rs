// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::with_metrics;
use crate::{
    error::GuardianError,
    metrics::GuardianMetrics,
    server::handler::{
        FindMissingMessagesRequest, FindMissingMessagesResponse, GetAndObserveMissingVaasRequest,
        GovernorVaaRequest, InjectGovernanceVaaRequest, InjectGovernanceVaaResponse,
        SendObservationRequestRequest, SignExistingVaaRequest, SignExistingVaaResponse,
        TextResponse,
    },
};
use axum::{extract::State, Json};
use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use fastcrypto::ed25519::Ed25519PublicKey;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, instrument};

pub mod handler;

pub use handler::{AdminRequestHandler, AdminRequestHandlerTrait};

pub const PING_PATH: &str = "/ping";
pub const METRICS_KEY_PATH: &str = "/metrics_pub_key";

// Admin surface paths. These are the node operator's contract; tooling
// depends on them staying put.
pub const INJECT_GOVERNANCE_VAA_PATH: &str = "/admin/inject_governance_vaa";
pub const FIND_MISSING_MESSAGES_PATH: &str = "/admin/find_missing_messages";
pub const SEND_OBSERVATION_REQUEST_PATH: &str = "/admin/send_observation_request";
pub const GOVERNOR_STATUS_PATH: &str = "/admin/governor/status";
pub const GOVERNOR_RELOAD_PATH: &str = "/admin/governor/reload";
pub const GOVERNOR_DROP_PENDING_VAA_PATH: &str = "/admin/governor/drop_pending_vaa";
pub const GOVERNOR_RELEASE_PENDING_VAA_PATH: &str = "/admin/governor/release_pending_vaa";
pub const GOVERNOR_RESET_RELEASE_TIMER_PATH: &str = "/admin/governor/reset_release_timer";
pub const SIGN_EXISTING_VAA_PATH: &str = "/admin/sign_existing_vaa";
pub const DUMP_RPCS_PATH: &str = "/admin/dump_rpcs";
pub const GET_AND_OBSERVE_MISSING_VAAS_PATH: &str = "/admin/get_and_observe_missing_vaas";

// The node's public metadata, served on `/ping`. Be careful with what goes
// here, as it is public.
#[derive(serde::Serialize)]
pub struct GuardianNodePublicMetadata {
    pub version: &'static str,
    pub metrics_pubkey: Option<Arc<Ed25519PublicKey>>,
}

impl GuardianNodePublicMetadata {
    pub fn new(version: &'static str, metrics_pubkey: Ed25519PublicKey) -> Self {
        Self {
            version,
            metrics_pubkey: Some(metrics_pubkey.into()),
        }
    }

    pub fn empty_for_testing() -> Self {
        Self {
            version: "testing",
            metrics_pubkey: None,
        }
    }
}

type ServerState<H> = (Arc<H>, Arc<GuardianMetrics>, Arc<GuardianNodePublicMetadata>);

pub fn run_server(
    socket_address: &SocketAddr,
    handler: AdminRequestHandler,
    metrics: Arc<GuardianMetrics>,
    metadata: Arc<GuardianNodePublicMetadata>,
) -> tokio::task::JoinHandle<()> {
    let socket_address = *socket_address;
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(socket_address).await.unwrap();
        axum::serve(
            listener,
            make_router(Arc::new(handler), metrics, metadata).into_make_service(),
        )
        .await
        .unwrap();
    })
}

pub(crate) fn make_router<H: AdminRequestHandlerTrait + Sync + Send + 'static>(
    handler: Arc<H>,
    metrics: Arc<GuardianMetrics>,
    metadata: Arc<GuardianNodePublicMetadata>,
) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route(PING_PATH, get(ping))
        .route(METRICS_KEY_PATH, get(metrics_key_fetch))
        .route(INJECT_GOVERNANCE_VAA_PATH, post(inject_governance_vaa))
        .route(FIND_MISSING_MESSAGES_PATH, post(find_missing_messages))
        .route(SEND_OBSERVATION_REQUEST_PATH, post(send_observation_request))
        .route(GOVERNOR_STATUS_PATH, get(governor_status))
        .route(GOVERNOR_RELOAD_PATH, post(governor_reload))
        .route(GOVERNOR_DROP_PENDING_VAA_PATH, post(governor_drop_pending_vaa))
        .route(
            GOVERNOR_RELEASE_PENDING_VAA_PATH,
            post(governor_release_pending_vaa),
        )
        .route(
            GOVERNOR_RESET_RELEASE_TIMER_PATH,
            post(governor_reset_release_timer),
        )
        .route(SIGN_EXISTING_VAA_PATH, post(sign_existing_vaa))
        .route(DUMP_RPCS_PATH, get(dump_rpcs))
        .route(
            GET_AND_OBSERVE_MISSING_VAAS_PATH,
            post(get_and_observe_missing_vaas),
        )
        .with_state((handler, metrics, metadata))
}

impl axum::response::IntoResponse for GuardianError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            GuardianError::InvalidAdminRequest(_)
            | GuardianError::Malformed(_)
            | GuardianError::InvalidChainId
            | GuardianError::PendingVaaNotFound(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, format!("Something went wrong: {:?}", self)).into_response()
    }
}

impl<E> From<E> for GuardianError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Generic(err.into().to_string())
    }
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn ping<H: AdminRequestHandlerTrait + Sync + Send>(
    State((_, _, metadata)): State<ServerState<H>>,
) -> Result<Json<Arc<GuardianNodePublicMetadata>>, GuardianError> {
    Ok(Json(metadata))
}

async fn metrics_key_fetch<H: AdminRequestHandlerTrait + Sync + Send>(
    State((_, _, metadata)): State<ServerState<H>>,
) -> Result<Json<Option<Arc<Ed25519PublicKey>>>, GuardianError> {
    Ok(Json(metadata.metrics_pubkey.clone()))
}

#[instrument(level = "error", skip_all)]
async fn inject_governance_vaa<H: AdminRequestHandlerTrait + Sync + Send>(
    State((handler, metrics, _)): State<ServerState<H>>,
    Json(req): Json<InjectGovernanceVaaRequest>,
) -> Result<Json<InjectGovernanceVaaResponse>, GuardianError> {
    let future = async {
        let resp = handler.inject_governance_vaa(req).await?;
        Ok(Json(resp))
    };
    with_metrics!(metrics.clone(), "inject_governance_vaa", future).await
}

#[instrument(level = "error", skip_all)]
async fn find_missing_messages<H: AdminRequestHandlerTrait + Sync + Send>(
    State((handler, metrics, _)): State<ServerState<H>>,
    Json(req): Json<FindMissingMessagesRequest>,
) -> Result<Json<FindMissingMessagesResponse>, GuardianError> {
    let future = async {
        let resp = handler.find_missing_messages(req).await?;
        Ok(Json(resp))
    };
    with_metrics!(metrics.clone(), "find_missing_messages", future).await
}

#[instrument(level = "error", skip_all)]
async fn send_observation_request<H: AdminRequestHandlerTrait + Sync + Send>(
    State((handler, metrics, _)): State<ServerState<H>>,
    Json(req): Json<SendObservationRequestRequest>,
) -> Result<Json<TextResponse>, GuardianError> {
    let future = async {
        let resp = handler.send_observation_request(req).await?;
        Ok(Json(resp))
    };
    with_metrics!(metrics.clone(), "send_observation_request", future).await
}

#[instrument(level = "error", skip_all)]
async fn governor_status<H: AdminRequestHandlerTrait + Sync + Send>(
    State((handler, metrics, _)): State<ServerState<H>>,
) -> Result<Json<TextResponse>, GuardianError> {
    let future = async {
        let resp = handler.governor_status().await?;
        Ok(Json(resp))
    };
    with_metrics!(metrics.clone(), "governor_status", future).await
}

#[instrument(level = "error", skip_all)]
async fn governor_reload<H: AdminRequestHandlerTrait + Sync + Send>(
    State((handler, metrics, _)): State<ServerState<H>>,
) -> Result<Json<TextResponse>, GuardianError> {
    let future = async {
        let resp = handler.governor_reload().await?;
        Ok(Json(resp))
    };
    with_metrics!(metrics.clone(), "governor_reload", future).await
}

#[instrument(level = "error", skip_all)]
async fn governor_drop_pending_vaa<H: AdminRequestHandlerTrait + Sync + Send>(
    State((handler, metrics, _)): State<ServerState<H>>,
    Json(req): Json<GovernorVaaRequest>,
) -> Result<Json<TextResponse>, GuardianError> {
    let future = async {
        let resp = handler.governor_drop_pending_vaa(req).await?;
        Ok(Json(resp))
    };
    with_metrics!(metrics.clone(), "governor_drop_pending_vaa", future).await
}

#[instrument(level = "error", skip_all)]
async fn governor_release_pending_vaa<H: AdminRequestHandlerTrait + Sync + Send>(
    State((handler, metrics, _)): State<ServerState<H>>,
    Json(req): Json<GovernorVaaRequest>,
) -> Result<Json<TextResponse>, GuardianError> {
    let future = async {
        let resp = handler.governor_release_pending_vaa(req).await?;
        Ok(Json(resp))
    };
    with_metrics!(metrics.clone(), "governor_release_pending_vaa", future).await
}

#[instrument(level = "error", skip_all)]
async fn governor_reset_release_timer<H: AdminRequestHandlerTrait + Sync + Send>(
    State((handler, metrics, _)): State<ServerState<H>>,
    Json(req): Json<GovernorVaaRequest>,
) -> Result<Json<TextResponse>, GuardianError> {
    let future = async {
        let resp = handler.governor_reset_release_timer(req).await?;
        Ok(Json(resp))
    };
    with_metrics!(metrics.clone(), "governor_reset_release_timer", future).await
}

#[instrument(level = "error", skip_all)]
async fn sign_existing_vaa<H: AdminRequestHandlerTrait + Sync + Send>(
    State((handler, metrics, _)): State<ServerState<H>>,
    Json(req): Json<SignExistingVaaRequest>,
) -> Result<Json<SignExistingVaaResponse>, GuardianError> {
    let future = async {
        let resp = handler.sign_existing_vaa(req).await?;
        Ok(Json(resp))
    };
    with_metrics!(metrics.clone(), "sign_existing_vaa", future).await
}

#[instrument(level = "error", skip_all)]
async fn dump_rpcs<H: AdminRequestHandlerTrait + Sync + Send>(
    State((handler, metrics, _)): State<ServerState<H>>,
) -> Result<Json<HashMap<String, String>>, GuardianError> {
    let future = async {
        let resp = handler.dump_rpcs().await?;
        Ok(Json(resp))
    };
    with_metrics!(metrics.clone(), "dump_rpcs", future).await
}

#[instrument(level = "error", skip_all)]
async fn get_and_observe_missing_vaas<H: AdminRequestHandlerTrait + Sync + Send>(
    State((handler, metrics, _)): State<ServerState<H>>,
    Json(req): Json<GetAndObserveMissingVaasRequest>,
) -> Result<Json<TextResponse>, GuardianError> {
    let future = async {
        let resp = handler.get_and_observe_missing_vaas(req).await?;
        Ok(Json(resp))
    };
    with_metrics!(metrics.clone(), "get_and_observe_missing_vaas", future).await
}

#[macro_export]
macro_rules! with_metrics {
    ($metrics:expr, $type_:expr, $func:expr) => {
        async move {
            info!("Received {} request", $type_);
            $metrics
                .requests_received
                .with_label_values(&[$type_])
                .inc();
            $metrics
                .requests_inflight
                .with_label_values(&[$type_])
                .inc();

            let result = $func.await;

            match &result {
                Ok(_) => {
                    info!("{} request succeeded", $type_);
                    $metrics.requests_ok.with_label_values(&[$type_]).inc();
                }
                Err(e) => {
                    info!("{} request failed: {:?}", $type_, e);
                    $metrics.err_requests.with_label_values(&[$type_]).inc();
                }
            }

            $metrics
                .requests_inflight
                .with_label_values(&[$type_])
                .dec();
            result
        }
    };
}
