// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

//! Implementations of the privileged admin operations. The HTTP wiring
//! lives in the parent module; everything here is plain async methods so the
//! operations are testable without a socket.

use crate::crypto::{self, GuardianKeyPair};
use crate::error::{GuardianError, GuardianResult};
use crate::gossip::{post_observation_request, ObservationRequest, SignedVaaWithQuorum};
use crate::governance::{
    create_governance_vaa, BodyContractUpgrade, BodyGuardianSetUpdate, BodyRecoverChainId,
    BodyRelayerSetDefaultDeliveryProvider, BodyTokenBridgeRegisterChain,
    BodyTokenBridgeUpgradeContract, GovernanceEncoding, GovernancePayload,
};
use crate::governor::ChainGovernor;
use crate::metrics::GuardianMetrics;
use crate::store::VaaStore;
use crate::types::{GuardianSet, GuardianSetState, MessagePublication, VaaId, MAX_GUARDIAN_COUNT};
use crate::vaa::{calculate_quorum, Signature, Vaa};
use ethers::types::{Address as EthAddress, H256, U256};
use fastcrypto::encoding::{Base64, Encoding};
use guardian_types::{Address, ChainId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Per-node timeout for RPC backfill fetches.
const BACKFILL_NODE_TIMEOUT: Duration = Duration::from_secs(1);

/// `GetAndObserveMissingVAAs` processes at most this many keys per call and
/// rejects the rest.
const MAX_VAAS_TO_PROCESS: usize = 25;

//
// Request/response surface types.
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardianEntry {
    pub pubkey: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GovernancePayloadRequest {
    GuardianSetUpdate {
        guardians: Vec<GuardianEntry>,
    },
    ContractUpgrade {
        chain_id: u32,
        new_contract: String,
    },
    BridgeRegisterChain {
        module: String,
        chain_id: u32,
        emitter_address: String,
    },
    BridgeUpgradeContract {
        module: String,
        target_chain_id: u32,
        new_contract: String,
    },
    RecoverChainId {
        module: String,
        evm_chain_id: String,
        new_chain_id: u32,
    },
    RelayerSetDefaultDeliveryProvider {
        chain_id: u32,
        new_default_delivery_provider_address: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceMessage {
    pub sequence: u64,
    pub nonce: u32,
    pub payload: GovernancePayloadRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectGovernanceVaaRequest {
    pub current_set_index: u32,
    pub timestamp: u32,
    pub messages: Vec<GovernanceMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectGovernanceVaaResponse {
    /// Hex signing digests of the injected VAAs.
    pub digests: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindMissingMessagesRequest {
    pub emitter_chain: u16,
    pub emitter_address: String,
    #[serde(default)]
    pub rpc_backfill: bool,
    #[serde(default)]
    pub backfill_nodes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindMissingMessagesResponse {
    pub missing_messages: Vec<String>,
    pub first_sequence: u64,
    pub last_sequence: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendObservationRequestRequest {
    pub chain_id: u16,
    /// Hex encoded transaction hash.
    pub tx_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignExistingVaaRequest {
    /// Hex encoded VAA bytes.
    pub vaa: String,
    pub new_guardian_set_index: u32,
    pub new_guardian_addrs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignExistingVaaResponse {
    /// Hex encoded re-signed VAA.
    pub vaa: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetAndObserveMissingVaasRequest {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorVaaRequest {
    pub vaa_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextResponse {
    pub response: String,
}

/// Read-through cache of guardian sets by index, fed from the node's
/// guardian-set state. Owned by the admin service; a set index neither
/// cached nor known locally is an explicit error.
pub struct GuardianSetCache {
    cache: RwLock<HashMap<u32, Arc<GuardianSet>>>,
    gst: Arc<GuardianSetState>,
}

impl GuardianSetCache {
    pub fn new(gst: Arc<GuardianSetState>) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            gst,
        }
    }

    pub fn get(&self, index: u32) -> GuardianResult<Arc<GuardianSet>> {
        if let Some(gs) = self.cache.read().unwrap().get(&index) {
            return Ok(gs.clone());
        }
        let gs = self
            .gst
            .get(index)
            .ok_or(GuardianError::GuardianSetNotFound(index))?;
        self.cache.write().unwrap().insert(index, gs.clone());
        Ok(gs)
    }
}

#[async_trait::async_trait]
pub trait AdminRequestHandlerTrait {
    async fn inject_governance_vaa(
        &self,
        req: InjectGovernanceVaaRequest,
    ) -> GuardianResult<InjectGovernanceVaaResponse>;
    async fn find_missing_messages(
        &self,
        req: FindMissingMessagesRequest,
    ) -> GuardianResult<FindMissingMessagesResponse>;
    async fn send_observation_request(
        &self,
        req: SendObservationRequestRequest,
    ) -> GuardianResult<TextResponse>;
    async fn governor_status(&self) -> GuardianResult<TextResponse>;
    async fn governor_reload(&self) -> GuardianResult<TextResponse>;
    async fn governor_drop_pending_vaa(&self, req: GovernorVaaRequest)
        -> GuardianResult<TextResponse>;
    async fn governor_release_pending_vaa(
        &self,
        req: GovernorVaaRequest,
    ) -> GuardianResult<TextResponse>;
    async fn governor_reset_release_timer(
        &self,
        req: GovernorVaaRequest,
    ) -> GuardianResult<TextResponse>;
    async fn sign_existing_vaa(
        &self,
        req: SignExistingVaaRequest,
    ) -> GuardianResult<SignExistingVaaResponse>;
    async fn dump_rpcs(&self) -> GuardianResult<HashMap<String, String>>;
    async fn get_and_observe_missing_vaas(
        &self,
        req: GetAndObserveMissingVaasRequest,
    ) -> GuardianResult<TextResponse>;
}

pub struct AdminRequestHandler {
    store: Arc<VaaStore>,
    inject_tx: mpsc::Sender<MessagePublication>,
    obsv_req_tx: mpsc::Sender<ObservationRequest>,
    signed_in_tx: mpsc::Sender<SignedVaaWithQuorum>,
    governor: Option<Arc<ChainGovernor>>,
    guardian_key: GuardianKeyPair,
    guardian_address: EthAddress,
    gs_cache: GuardianSetCache,
    rpc_map: HashMap<String, String>,
    metrics: Arc<GuardianMetrics>,
    http: reqwest::Client,
}

#[allow(clippy::too_many_arguments)]
impl AdminRequestHandler {
    pub fn new(
        store: Arc<VaaStore>,
        inject_tx: mpsc::Sender<MessagePublication>,
        obsv_req_tx: mpsc::Sender<ObservationRequest>,
        signed_in_tx: mpsc::Sender<SignedVaaWithQuorum>,
        governor: Option<Arc<ChainGovernor>>,
        guardian_key: GuardianKeyPair,
        gst: Arc<GuardianSetState>,
        rpc_map: HashMap<String, String>,
        metrics: Arc<GuardianMetrics>,
    ) -> Self {
        let guardian_address = crypto::guardian_address(&guardian_key);
        Self {
            store,
            inject_tx,
            obsv_req_tx,
            signed_in_tx,
            governor,
            guardian_key,
            guardian_address,
            gs_cache: GuardianSetCache::new(gst),
            rpc_map,
            metrics,
            http: reqwest::Client::new(),
        }
    }

    fn governor(&self) -> GuardianResult<&Arc<ChainGovernor>> {
        self.governor
            .as_ref()
            .ok_or_else(|| GuardianError::InvalidAdminRequest("chain governor is not enabled".into()))
    }

    /// Try to backfill one missing VAA from the given public RPC nodes.
    /// Nodes are tried in the (already shuffled) given order with a short
    /// per-node timeout; a node failure means "try the next one".
    async fn fetch_missing(
        &self,
        nodes: &[String],
        chain: ChainId,
        emitter_hex: &str,
        sequence: u64,
    ) -> GuardianResult<bool> {
        for node in nodes {
            let url = format!("{node}/v1/signed_vaa/{}/{emitter_hex}/{sequence}", chain.0);
            let resp = match self
                .http
                .get(&url)
                .timeout(BACKFILL_NODE_TIMEOUT)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(node = %node, sequence, "failed to fetch missing VAA: {e}");
                    continue;
                }
            };

            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                continue;
            }
            if !resp.status().is_success() {
                warn!(node = %node, sequence, status = %resp.status(), "unexpected backfill response status");
                continue;
            }

            #[derive(Deserialize)]
            struct GetVaaResp {
                #[serde(rename = "vaaBytes")]
                vaa_bytes: String,
            }
            let body: GetVaaResp = match resp.json().await {
                Ok(body) => body,
                Err(e) => {
                    warn!(node = %node, sequence, "failed to decode VAA response: {e}");
                    continue;
                }
            };
            let vaa_bytes = match Base64::decode(&body.vaa_bytes) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(node = %node, sequence, "failed to decode VAA body: {e}");
                    continue;
                }
            };

            info!(
                chain = chain.0,
                emitter = emitter_hex,
                sequence,
                num_bytes = vaa_bytes.len(),
                "backfilled VAA"
            );

            // Inject into the signed-VAA receive path; this verifies and
            // stores exactly as if the VAA arrived from gossip.
            self.signed_in_tx
                .send(SignedVaaWithQuorum { vaa_bytes })
                .await
                .map_err(|_| GuardianError::Generic("signed VAA channel closed".into()))?;
            return Ok(true);
        }

        Ok(false)
    }
}

//
// Governance message construction. Each converter validates its request and
// produces the canonical unsigned governance VAA.
//

pub fn admin_guardian_set_update_to_vaa(
    guardians: &[GuardianEntry],
    timestamp: u32,
    guardian_set_index: u32,
    nonce: u32,
    sequence: u64,
) -> GuardianResult<Vaa> {
    if guardians.is_empty() {
        return Err(GuardianError::InvalidAdminRequest(
            "empty guardian set specified".into(),
        ));
    }
    if guardians.len() > MAX_GUARDIAN_COUNT {
        return Err(GuardianError::InvalidAdminRequest(format!(
            "too many guardians - {}, maximum is {}",
            guardians.len(),
            MAX_GUARDIAN_COUNT
        )));
    }

    let mut addrs: Vec<EthAddress> = Vec::with_capacity(guardians.len());
    for (i, g) in guardians.iter().enumerate() {
        let addr = EthAddress::from_str(&g.pubkey).map_err(|_| {
            GuardianError::InvalidAdminRequest(format!(
                "invalid pubkey format at index {i} ({})",
                g.name
            ))
        })?;
        if let Some(j) = addrs.iter().position(|a| *a == addr) {
            return Err(GuardianError::InvalidAdminRequest(format!(
                "duplicate pubkey at index {i} (duplicate of {j}): {}",
                g.name
            )));
        }
        addrs.push(addr);
    }

    Ok(create_governance_vaa(
        timestamp,
        nonce,
        sequence,
        guardian_set_index,
        BodyGuardianSetUpdate {
            keys: addrs,
            new_index: guardian_set_index + 1,
        }
        .serialize(),
    ))
}

fn parse_chain_id(chain_id: u32) -> GuardianResult<ChainId> {
    if chain_id > u16::MAX as u32 {
        return Err(GuardianError::InvalidChainId);
    }
    Ok(ChainId(chain_id as u16))
}

fn parse_address(hex_str: &str, what: &str) -> GuardianResult<Address> {
    Address::from_hex(hex_str)
        .map_err(|e| GuardianError::InvalidAdminRequest(format!("invalid {what}: {e}")))
}

pub fn admin_governance_msg_to_vaa(
    message: &GovernanceMessage,
    current_set_index: u32,
    timestamp: u32,
) -> GuardianResult<Vaa> {
    let payload: GovernancePayload = match &message.payload {
        GovernancePayloadRequest::GuardianSetUpdate { guardians } => {
            return admin_guardian_set_update_to_vaa(
                guardians,
                timestamp,
                current_set_index,
                message.nonce,
                message.sequence,
            );
        }
        GovernancePayloadRequest::ContractUpgrade {
            chain_id,
            new_contract,
        } => BodyContractUpgrade {
            chain_id: parse_chain_id(*chain_id)?,
            new_contract: parse_address(new_contract, "new contract address")?,
        }
        .into(),
        GovernancePayloadRequest::BridgeRegisterChain {
            module,
            chain_id,
            emitter_address,
        } => BodyTokenBridgeRegisterChain {
            module: module.clone(),
            chain_id: parse_chain_id(*chain_id)?,
            emitter_address: parse_address(emitter_address, "emitter address")?,
        }
        .into(),
        GovernancePayloadRequest::BridgeUpgradeContract {
            module,
            target_chain_id,
            new_contract,
        } => BodyTokenBridgeUpgradeContract {
            module: module.clone(),
            target_chain_id: parse_chain_id(*target_chain_id)?,
            new_contract: parse_address(new_contract, "new contract address")?,
        }
        .into(),
        GovernancePayloadRequest::RecoverChainId {
            module,
            evm_chain_id,
            new_chain_id,
        } => BodyRecoverChainId {
            module: module.clone(),
            evm_chain_id: U256::from_dec_str(evm_chain_id)
                .map_err(|_| GuardianError::InvalidAdminRequest("invalid evm_chain_id".into()))?,
            new_chain_id: parse_chain_id(*new_chain_id)?,
        }
        .into(),
        GovernancePayloadRequest::RelayerSetDefaultDeliveryProvider {
            chain_id,
            new_default_delivery_provider_address,
        } => BodyRelayerSetDefaultDeliveryProvider {
            chain_id: parse_chain_id(*chain_id)?,
            new_default_delivery_provider: parse_address(
                new_default_delivery_provider_address,
                "new default delivery provider address",
            )?,
        }
        .into(),
    };

    Ok(create_governance_vaa(
        timestamp,
        message.nonce,
        message.sequence,
        current_set_index,
        payload.serialize(),
    ))
}

#[async_trait::async_trait]
impl AdminRequestHandlerTrait for AdminRequestHandler {
    async fn inject_governance_vaa(
        &self,
        req: InjectGovernanceVaaRequest,
    ) -> GuardianResult<InjectGovernanceVaaResponse> {
        info!(messages = req.messages.len(), "governance VAA injected via admin surface");

        let mut digests = Vec::with_capacity(req.messages.len());
        for message in &req.messages {
            let v = admin_governance_msg_to_vaa(message, req.current_set_index, req.timestamp)?;
            let digest = v.signing_digest();

            info!(
                digest = %hex::encode(digest),
                sequence = v.sequence,
                "governance VAA constructed"
            );
            self.metrics.vaa_injections_total.inc();

            // Surface a full injection channel to the caller rather than
            // dropping governance traffic.
            self.inject_tx
                .try_send(MessagePublication {
                    tx_hash: H256::zero(),
                    timestamp: v.timestamp,
                    nonce: v.nonce,
                    sequence: v.sequence,
                    consistency_level: v.consistency_level,
                    emitter_chain: v.emitter_chain,
                    emitter_address: v.emitter_address,
                    payload: v.payload.clone(),
                    unreliable: false,
                })
                .map_err(|_| GuardianError::ChannelFull("governance injection channel"))?;

            digests.push(hex::encode(digest));
        }

        Ok(InjectGovernanceVaaResponse { digests })
    }

    async fn find_missing_messages(
        &self,
        req: FindMissingMessagesRequest,
    ) -> GuardianResult<FindMissingMessagesResponse> {
        let emitter_address = parse_address(&req.emitter_address, "emitter address")?;
        let emitter_chain = ChainId(req.emitter_chain);

        let gap = self
            .store
            .find_emitter_sequence_gap(emitter_chain, emitter_address)?;

        let mut missing = gap.missing;
        if req.rpc_backfill {
            use rand::seq::SliceRandom;
            let mut nodes = req.backfill_nodes.clone();
            nodes.shuffle(&mut rand::thread_rng());

            let emitter_hex = emitter_address.to_string();
            let mut unfilled = Vec::with_capacity(missing.len());
            for sequence in missing {
                if !self
                    .fetch_missing(&nodes, emitter_chain, &emitter_hex, sequence)
                    .await?
                {
                    unfilled.push(sequence);
                }
            }
            missing = unfilled;
        }

        Ok(FindMissingMessagesResponse {
            missing_messages: missing
                .iter()
                .map(|seq| VaaId::new(emitter_chain, emitter_address, *seq).to_string())
                .collect(),
            first_sequence: gap.first,
            last_sequence: gap.last,
        })
    }

    async fn send_observation_request(
        &self,
        req: SendObservationRequestRequest,
    ) -> GuardianResult<TextResponse> {
        let tx_hash = hex::decode(req.tx_hash.trim_start_matches("0x"))
            .map_err(|e| GuardianError::InvalidAdminRequest(format!("invalid tx hash: {e}")))?;
        let request = ObservationRequest {
            chain_id: ChainId(req.chain_id),
            tx_hash,
        };
        post_observation_request(&self.obsv_req_tx, request.clone())?;
        info!(?request, "sent observation request");
        Ok(TextResponse {
            response: "observation request sent".into(),
        })
    }

    async fn governor_status(&self) -> GuardianResult<TextResponse> {
        Ok(TextResponse {
            response: self.governor()?.status(),
        })
    }

    async fn governor_reload(&self) -> GuardianResult<TextResponse> {
        Ok(TextResponse {
            response: self.governor()?.reload()?,
        })
    }

    async fn governor_drop_pending_vaa(
        &self,
        req: GovernorVaaRequest,
    ) -> GuardianResult<TextResponse> {
        if req.vaa_id.is_empty() {
            return Err(GuardianError::InvalidAdminRequest(
                "the VAA id must be specified as \"chainId/emitterAddress/seqNum\"".into(),
            ));
        }
        Ok(TextResponse {
            response: self.governor()?.drop_pending_vaa(&req.vaa_id)?,
        })
    }

    async fn governor_release_pending_vaa(
        &self,
        req: GovernorVaaRequest,
    ) -> GuardianResult<TextResponse> {
        if req.vaa_id.is_empty() {
            return Err(GuardianError::InvalidAdminRequest(
                "the VAA id must be specified as \"chainId/emitterAddress/seqNum\"".into(),
            ));
        }
        Ok(TextResponse {
            response: self.governor()?.release_pending_vaa(&req.vaa_id)?,
        })
    }

    async fn governor_reset_release_timer(
        &self,
        req: GovernorVaaRequest,
    ) -> GuardianResult<TextResponse> {
        if req.vaa_id.is_empty() {
            return Err(GuardianError::InvalidAdminRequest(
                "the VAA id must be specified as \"chainId/emitterAddress/seqNum\"".into(),
            ));
        }
        Ok(TextResponse {
            response: self.governor()?.reset_release_timer(&req.vaa_id)?,
        })
    }

    async fn sign_existing_vaa(
        &self,
        req: SignExistingVaaRequest,
    ) -> GuardianResult<SignExistingVaaResponse> {
        let vaa_bytes = hex::decode(req.vaa.trim_start_matches("0x"))
            .map_err(|e| GuardianError::InvalidAdminRequest(format!("invalid VAA hex: {e}")))?;
        let v = Vaa::decode(&vaa_bytes)?;

        if req.new_guardian_set_index <= v.guardian_set_index {
            return Err(GuardianError::InvalidAdminRequest(
                "new guardian set index must be higher than provided VAA".into(),
            ));
        }

        // Resolve the old set through the cache, populating it from local
        // state on a miss.
        let gs = self.gs_cache.get(v.guardian_set_index)?;

        if gs.contains(&self.guardian_address) {
            return Err(GuardianError::InvalidAdminRequest(
                "local guardian is already on the old set".into(),
            ));
        }

        v.verify(&gs.keys)?;

        if req.new_guardian_addrs.len() > u8::MAX as usize {
            return Err(GuardianError::InvalidAdminRequest(
                "new guardian set has too many guardians".into(),
            ));
        }
        let mut new_keys: Vec<EthAddress> = Vec::with_capacity(req.new_guardian_addrs.len());
        for addr in &req.new_guardian_addrs {
            let addr = EthAddress::from_str(addr).map_err(|_| {
                GuardianError::InvalidAdminRequest(format!("invalid guardian address: {addr}"))
            })?;
            new_keys.push(addr);
        }
        let mut sorted = new_keys.clone();
        sorted.sort();
        sorted.dedup();
        if sorted.len() != new_keys.len() {
            return Err(GuardianError::InvalidAdminRequest(
                "duplicate guardians in the guardian set".into(),
            ));
        }

        let local_index = new_keys
            .iter()
            .position(|a| *a == self.guardian_address)
            .ok_or_else(|| {
                GuardianError::InvalidAdminRequest(
                    "local guardian is not a member of the new guardian set".into(),
                )
            })?;

        let mut new_vaa = Vaa {
            version: v.version,
            guardian_set_index: req.new_guardian_set_index,
            // Signatures are repopulated below.
            signatures: vec![],
            timestamp: v.timestamp,
            nonce: v.nonce,
            emitter_chain: v.emitter_chain,
            emitter_address: v.emitter_address,
            sequence: v.sequence,
            consistency_level: v.consistency_level,
            payload: v.payload.clone(),
        };

        // Carry over the original signatures of guardians that are also in
        // the new set, under their new indices.
        for sig in &v.signatures {
            let signer = gs.keys[sig.index as usize];
            let Some(new_index) = new_keys.iter().position(|a| *a == signer) else {
                continue;
            };
            new_vaa.signatures.push(Signature {
                index: new_index as u8,
                signature: sig.signature,
            });
        }

        // Adding our own signature must complete a quorum of the new set.
        if calculate_quorum(new_keys.len()) > new_vaa.signatures.len() + 1 {
            return Err(GuardianError::InvalidAdminRequest(
                "cannot reach quorum on new guardian set with the local signature".into(),
            ));
        }

        new_vaa.add_signature(&self.guardian_key, local_index as u8);
        new_vaa.signatures.sort_by_key(|s| s.index);

        Ok(SignExistingVaaResponse {
            vaa: hex::encode(new_vaa.encode()),
        })
    }

    async fn dump_rpcs(&self) -> GuardianResult<HashMap<String, String>> {
        Ok(self.rpc_map.clone())
    }

    async fn get_and_observe_missing_vaas(
        &self,
        req: GetAndObserveMissingVaasRequest,
    ) -> GuardianResult<TextResponse> {
        #[derive(Deserialize)]
        struct MissingVaa {
            chain: u16,
            #[serde(rename = "vaaKey")]
            vaa_key: String,
            txhash: String,
        }

        let resp = self
            .http
            .post(&req.url)
            .json(&serde_json::json!({ "apiKey": req.api_key }))
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| GuardianError::TransientPeerError(format!("request failed: {e}")))?;
        let missing: Vec<MissingVaa> = resp
            .json()
            .await
            .map_err(|e| GuardianError::TransientPeerError(format!("bad response body: {e}")))?;

        let total = missing.len();
        let processing = total.min(MAX_VAAS_TO_PROCESS);

        let mut observed = 0usize;
        let mut errors = 0usize;
        let mut error_msgs = String::from("Messages: ");
        for missing_vaa in missing.into_iter().take(MAX_VAAS_TO_PROCESS) {
            // The key is "chain/emitter_hex/sequence"; the emitter segment
            // is hex encoded and must be decoded as such.
            let id = match missing_vaa.vaa_key.parse::<VaaId>() {
                Ok(id) => id,
                Err(e) => {
                    error_msgs += &format!("\nerror parsing VAA key [{}]: {e:?}", missing_vaa.vaa_key);
                    errors += 1;
                    continue;
                }
            };
            match self.store.has_vaa(id) {
                Ok(false) => {}
                Ok(true) | Err(_) => {
                    error_msgs += &format!("\nerror checking for VAA {}", missing_vaa.vaa_key);
                    errors += 1;
                    continue;
                }
            }

            let tx_hash = match hex::decode(missing_vaa.txhash.trim_start_matches("0x")) {
                Ok(bytes) => bytes,
                Err(_) => match bs58::decode(&missing_vaa.txhash).into_vec() {
                    Ok(bytes) => bytes,
                    Err(_) => {
                        error_msgs += "Invalid transaction hash (neither hex nor base58)";
                        errors += 1;
                        continue;
                    }
                },
            };

            error_msgs += &format!("\nAttempting to observe {}", missing_vaa.txhash);
            if let Err(e) = post_observation_request(
                &self.obsv_req_tx,
                ObservationRequest {
                    chain_id: ChainId(missing_vaa.chain),
                    tx_hash,
                },
            ) {
                error_msgs += &format!("\nobservation request error {e:?}");
                errors += 1;
                continue;
            }
            observed += 1;
        }

        let mut response = if processing > 0 {
            let mut r = format!(
                "Successfully injected {observed} of {processing} VAAs. {errors} errors were encountered."
            );
            if total > MAX_VAAS_TO_PROCESS {
                r += &format!(
                    "\nOnly {MAX_VAAS_TO_PROCESS} of the {total} missing VAAs were processed.  Run the command again to process more."
                );
            }
            r
        } else {
            "There were no missing VAAs to recover.".to_string()
        };
        response += "\n";
        response += &error_msgs;

        Ok(TextResponse { response })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::guardian_address;
    use crate::test_utils::{get_test_guardian_keys, get_test_vaa};
    use fastcrypto::traits::ToFromBytes;

    fn entry(pubkey: &str) -> GuardianEntry {
        GuardianEntry {
            pubkey: pubkey.to_string(),
            name: String::new(),
        }
    }

    #[test]
    fn test_empty_guardian_set_update_rejected() {
        let err = admin_guardian_set_update_to_vaa(&[], 0, 0, 0, 0).unwrap_err();
        assert_eq!(
            err,
            GuardianError::InvalidAdminRequest("empty guardian set specified".into())
        );
    }

    #[test]
    fn test_guardian_set_update_rejects_duplicates_and_garbage() {
        let a = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
        assert!(matches!(
            admin_guardian_set_update_to_vaa(&[entry(a), entry(a)], 0, 0, 0, 0).unwrap_err(),
            GuardianError::InvalidAdminRequest(msg) if msg.contains("duplicate pubkey")
        ));
        assert!(matches!(
            admin_guardian_set_update_to_vaa(&[entry("zz")], 0, 0, 0, 0).unwrap_err(),
            GuardianError::InvalidAdminRequest(msg) if msg.contains("invalid pubkey format")
        ));
    }

    #[test]
    fn test_guardian_set_update_vaa_payload() {
        let v = admin_guardian_set_update_to_vaa(
            &[
                entry("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"),
                entry("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaee"),
            ],
            1000,
            0,
            5,
            7,
        )
        .unwrap();
        assert_eq!(
            hex::encode(&v.payload),
            "00000000000000000000000000000000000000000000000000000000436f726502000000000001025aaeb6053f3e94c9b9a09f33669435e7ef1beaed5aaeb6053f3e94c9b9a09f33669435e7ef1beaee"
        );
    }

    #[test]
    fn test_contract_upgrade_rejects_out_of_range_chain() {
        let message = GovernanceMessage {
            sequence: 0,
            nonce: 0,
            payload: GovernancePayloadRequest::ContractUpgrade {
                chain_id: 70_000,
                new_contract: "00".repeat(32),
            },
        };
        assert_eq!(
            admin_governance_msg_to_vaa(&message, 0, 0).unwrap_err(),
            GuardianError::InvalidChainId
        );
    }

    #[test]
    fn test_contract_upgrade_vaa_body() {
        let message = GovernanceMessage {
            sequence: 3,
            nonce: 1,
            payload: GovernancePayloadRequest::ContractUpgrade {
                chain_id: 1,
                new_contract:
                    "0000000000000000000000000000000000000000000000000000000000000004".into(),
            },
        };
        let v = admin_governance_msg_to_vaa(&message, 2, 999).unwrap();
        assert_eq!(v.guardian_set_index, 2);
        assert_eq!(
            hex::encode(&v.payload),
            "00000000000000000000000000000000000000000000000000000000436f72650100010000000000000000000000000000000000000000000000000000000000000004"
        );
    }

    fn make_handler_parts() -> (Arc<VaaStore>, Arc<GuardianSetState>, Vec<GuardianKeyPair>) {
        let dir = tempfile::tempdir().unwrap().into_path();
        let store = Arc::new(VaaStore::open(&dir).unwrap());
        let gst = Arc::new(GuardianSetState::new());
        let keys = get_test_guardian_keys(4);
        (store, gst, keys)
    }

    fn handler_with(
        store: Arc<VaaStore>,
        gst: Arc<GuardianSetState>,
        key: GuardianKeyPair,
    ) -> (
        AdminRequestHandler,
        mpsc::Receiver<MessagePublication>,
        mpsc::Receiver<ObservationRequest>,
    ) {
        let (inject_tx, inject_rx) = mpsc::channel(8);
        let (obsv_req_tx, obsv_req_rx) = mpsc::channel(8);
        let (signed_in_tx, _signed_rx) = mpsc::channel(8);
        let handler = AdminRequestHandler::new(
            store,
            inject_tx,
            obsv_req_tx,
            signed_in_tx,
            None,
            key,
            gst,
            HashMap::from([("solana".to_string(), "http://solana:8899".to_string())]),
            GuardianMetrics::new_for_testing(),
        );
        (handler, inject_rx, obsv_req_rx)
    }

    #[tokio::test]
    async fn test_inject_governance_vaa_queues_message() {
        let (store, gst, keys) = make_handler_parts();
        let key = GuardianKeyPair::from_bytes(keys[0].as_bytes()).unwrap();
        let (handler, mut inject_rx, _obsv) = handler_with(store, gst, key);

        let resp = handler
            .inject_governance_vaa(InjectGovernanceVaaRequest {
                current_set_index: 0,
                timestamp: 1000,
                messages: vec![GovernanceMessage {
                    sequence: 9,
                    nonce: 3,
                    payload: GovernancePayloadRequest::ContractUpgrade {
                        chain_id: 1,
                        new_contract: "00".repeat(32),
                    },
                }],
            })
            .await
            .unwrap();
        assert_eq!(resp.digests.len(), 1);

        let injected = inject_rx.try_recv().unwrap();
        assert_eq!(injected.sequence, 9);
        assert_eq!(injected.emitter_chain, crate::governance::GOVERNANCE_CHAIN);
        // Digest of the injected publication matches the reported digest.
        let digest = injected.to_unsigned_vaa(0).signing_digest();
        assert_eq!(hex::encode(digest), resp.digests[0]);
    }

    #[tokio::test]
    async fn test_find_missing_messages_without_backfill() {
        let (store, gst, keys) = make_handler_parts();

        // Store sequences 5, 6, 9 for the test emitter.
        for seq in [5u64, 6, 9] {
            let mut v = get_test_vaa();
            v.sequence = seq;
            v.add_signature(&keys[0], 0);
            store.store_signed_vaa(&v).unwrap();
        }

        let key = GuardianKeyPair::from_bytes(keys[0].as_bytes()).unwrap();
        let (handler, _i, _o) = handler_with(store, gst, key);
        let resp = handler
            .find_missing_messages(FindMissingMessagesRequest {
                emitter_chain: 1,
                emitter_address: get_test_vaa().emitter_address.to_string(),
                rpc_backfill: false,
                backfill_nodes: vec![],
            })
            .await
            .unwrap();

        assert_eq!(resp.first_sequence, 5);
        assert_eq!(resp.last_sequence, 9);
        assert_eq!(
            resp.missing_messages,
            vec![
                format!("1/{}/7", get_test_vaa().emitter_address),
                format!("1/{}/8", get_test_vaa().emitter_address),
            ]
        );
    }

    #[tokio::test]
    async fn test_send_observation_request_round_trip() {
        let (store, gst, keys) = make_handler_parts();
        let key = GuardianKeyPair::from_bytes(keys[0].as_bytes()).unwrap();
        let (handler, _i, mut obsv_rx) = handler_with(store, gst, key);

        handler
            .send_observation_request(SendObservationRequestRequest {
                chain_id: 1,
                tx_hash: "0xdeadbeef".into(),
            })
            .await
            .unwrap();
        let req = obsv_rx.try_recv().unwrap();
        assert_eq!(req.chain_id, ChainId::SOLANA);
        assert_eq!(req.tx_hash, vec![0xde, 0xad, 0xbe, 0xef]);

        // Garbage hex surfaces as a client error.
        assert!(handler
            .send_observation_request(SendObservationRequestRequest {
                chain_id: 1,
                tx_hash: "nope".into(),
            })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_governor_ops_require_governor() {
        let (store, gst, keys) = make_handler_parts();
        let key = GuardianKeyPair::from_bytes(keys[0].as_bytes()).unwrap();
        let (handler, _i, _o) = handler_with(store, gst, key);
        assert!(handler.governor_status().await.is_err());
        assert!(handler
            .governor_drop_pending_vaa(GovernorVaaRequest {
                vaa_id: "1/00/1".into()
            })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_sign_existing_vaa_resigns_for_new_set() {
        let (store, gst, keys) = make_handler_parts();

        // Old set: guardians 1, 2, 3. We are guardian 0, not a member.
        let old_keys = &keys[1..4];
        let old_addrs: Vec<_> = old_keys.iter().map(guardian_address).collect();
        gst.set(Arc::new(GuardianSet::new(0, old_addrs.clone()).unwrap()));

        let mut v = get_test_vaa();
        for (i, key) in old_keys.iter().enumerate() {
            v.add_signature(key, i as u8);
        }
        v.verify(&old_addrs).unwrap();

        // New set: guardians 1, 2 stay, we join, guardian 3 leaves.
        let our_addr = guardian_address(&keys[0]);
        let new_addrs = vec![
            format!("{:#x}", guardian_address(&keys[1])),
            format!("{:#x}", guardian_address(&keys[2])),
            format!("{:#x}", our_addr),
        ];

        let key = GuardianKeyPair::from_bytes(keys[0].as_bytes()).unwrap();
        let (handler, _i, _o) = handler_with(store, gst, key);
        let resp = handler
            .sign_existing_vaa(SignExistingVaaRequest {
                vaa: hex::encode(v.encode()),
                new_guardian_set_index: 1,
                new_guardian_addrs: new_addrs.clone(),
            })
            .await
            .unwrap();

        let new_vaa = Vaa::decode(&hex::decode(resp.vaa).unwrap()).unwrap();
        assert_eq!(new_vaa.guardian_set_index, 1);
        // Guardian 3's signature was dropped, ours was added: quorum of 3.
        assert_eq!(new_vaa.signatures.len(), 3);
        let new_set: Vec<EthAddress> = new_addrs.iter().map(|a| a.parse().unwrap()).collect();
        new_vaa.verify(&new_set).unwrap();
    }

    #[tokio::test]
    async fn test_sign_existing_vaa_rejects_bad_requests() {
        let (store, gst, keys) = make_handler_parts();
        let old_keys = &keys[1..4];
        let old_addrs: Vec<_> = old_keys.iter().map(guardian_address).collect();
        gst.set(Arc::new(GuardianSet::new(0, old_addrs).unwrap()));

        let mut v = get_test_vaa();
        for (i, key) in old_keys.iter().enumerate() {
            v.add_signature(key, i as u8);
        }
        let vaa_hex = hex::encode(v.encode());

        let key = GuardianKeyPair::from_bytes(keys[0].as_bytes()).unwrap();
        let (handler, _i, _o) = handler_with(store, gst, key);

        // New index must be above the VAA's.
        assert!(handler
            .sign_existing_vaa(SignExistingVaaRequest {
                vaa: vaa_hex.clone(),
                new_guardian_set_index: 0,
                new_guardian_addrs: vec![format!("{:#x}", guardian_address(&keys[0]))],
            })
            .await
            .is_err());

        // Unknown old guardian set index is an explicit error, not a crash.
        let mut v2 = get_test_vaa();
        v2.guardian_set_index = 7;
        for (i, key) in old_keys.iter().enumerate() {
            v2.add_signature(key, i as u8);
        }
        assert_eq!(
            handler
                .sign_existing_vaa(SignExistingVaaRequest {
                    vaa: hex::encode(v2.encode()),
                    new_guardian_set_index: 9,
                    new_guardian_addrs: vec![format!("{:#x}", guardian_address(&keys[0]))],
                })
                .await
                .unwrap_err(),
            GuardianError::GuardianSetNotFound(7)
        );

        // Local guardian must be in the new set.
        assert!(handler
            .sign_existing_vaa(SignExistingVaaRequest {
                vaa: vaa_hex,
                new_guardian_set_index: 1,
                new_guardian_addrs: vec![format!("{:#x}", guardian_address(&keys[1]))],
            })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_dump_rpcs() {
        let (store, gst, keys) = make_handler_parts();
        let key = GuardianKeyPair::from_bytes(keys[0].as_bytes()).unwrap();
        let (handler, _i, _o) = handler_with(store, gst, key);
        let rpcs = handler.dump_rpcs().await.unwrap();
        assert_eq!(rpcs["solana"], "http://solana:8899");
    }
}
