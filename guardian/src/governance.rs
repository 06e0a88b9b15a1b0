// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed payloads that ride inside governance VAAs. Each payload is a
//! 32-byte left-padded module identifier, a one-byte action code, a target
//! chain, then action-specific fields. Action codes overlap across modules;
//! the module prefix disambiguates.

use crate::vaa::{Vaa, SUPPORTED_VAA_VERSION};
use enum_dispatch::enum_dispatch;
use ethers::types::{Address as EthAddress, U256};
use guardian_types::{Address, ChainId};

/// Module identifier of the core contract ("Core" left-padded to 32 bytes).
pub const CORE_MODULE: &str = "Core";
pub const TOKEN_BRIDGE_MODULE: &str = "TokenBridge";
pub const NFT_BRIDGE_MODULE: &str = "NFTBridge";
pub const RELAYER_MODULE: &str = "WormholeRelayer";

// Core module actions
pub const ACTION_CONTRACT_UPGRADE: u8 = 1;
pub const ACTION_GUARDIAN_SET_UPDATE: u8 = 2;
pub const ACTION_CORE_RECOVER_CHAIN_ID: u8 = 5;

// Token bridge actions
pub const ACTION_REGISTER_CHAIN: u8 = 1;
pub const ACTION_UPGRADE_TOKEN_BRIDGE: u8 = 2;
pub const ACTION_TOKEN_BRIDGE_RECOVER_CHAIN_ID: u8 = 3;

// Relayer actions
pub const ACTION_RELAYER_SET_DEFAULT_DELIVERY_PROVIDER: u8 = 3;

/// All governance VAAs are emitted by this well-known emitter.
pub fn governance_emitter() -> Address {
    let mut addr = [0u8; 32];
    addr[31] = 4;
    Address::new(addr)
}

pub const GOVERNANCE_CHAIN: ChainId = ChainId::SOLANA;
pub const GOVERNANCE_CONSISTENCY_LEVEL: u8 = 32;

/// Left-pad an arbitrary module string to 32 bytes. Module strings are
/// build-time constants; an oversized one is a fatal configuration error.
pub fn left_pad_module(module: &str, length: usize) -> Vec<u8> {
    if module.len() > length {
        panic!("payload longer than {length} bytes");
    }
    let mut buf = vec![0u8; length - module.len()];
    buf.extend_from_slice(module.as_bytes());
    buf
}

#[enum_dispatch]
pub trait GovernanceEncoding {
    /// Serialize the payload body (module || action || chain || fields).
    fn serialize(&self) -> Vec<u8>;
}

/// Upgrade of the core contract on one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyContractUpgrade {
    pub chain_id: ChainId,
    pub new_contract: Address,
}

impl GovernanceEncoding for BodyContractUpgrade {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = left_pad_module(CORE_MODULE, 32);
        buf.push(ACTION_CONTRACT_UPGRADE);
        buf.extend_from_slice(&self.chain_id.to_be_bytes());
        buf.extend_from_slice(self.new_contract.as_bytes());
        buf
    }
}

/// Rotation to a new guardian set. Target chain is always 0 (universal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyGuardianSetUpdate {
    pub keys: Vec<EthAddress>,
    pub new_index: u32,
}

impl GovernanceEncoding for BodyGuardianSetUpdate {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = left_pad_module(CORE_MODULE, 32);
        buf.push(ACTION_GUARDIAN_SET_UPDATE);
        buf.extend_from_slice(&ChainId::UNSET.to_be_bytes());
        buf.extend_from_slice(&self.new_index.to_be_bytes());
        buf.push(self.keys.len() as u8);
        for key in &self.keys {
            buf.extend_from_slice(key.as_bytes());
        }
        buf
    }
}

/// Registration of a foreign chain's emitter on a bridge module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyTokenBridgeRegisterChain {
    pub module: String,
    pub chain_id: ChainId,
    pub emitter_address: Address,
}

impl GovernanceEncoding for BodyTokenBridgeRegisterChain {
    fn serialize(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(34);
        payload.extend_from_slice(&self.chain_id.to_be_bytes());
        payload.extend_from_slice(self.emitter_address.as_bytes());
        // target chain 0 = universal
        serialize_bridge_governance_body(
            &self.module,
            ACTION_REGISTER_CHAIN,
            ChainId::UNSET,
            &payload,
        )
    }
}

/// Upgrade of a bridge module contract on one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyTokenBridgeUpgradeContract {
    pub module: String,
    pub target_chain_id: ChainId,
    pub new_contract: Address,
}

impl GovernanceEncoding for BodyTokenBridgeUpgradeContract {
    fn serialize(&self) -> Vec<u8> {
        serialize_bridge_governance_body(
            &self.module,
            ACTION_UPGRADE_TOKEN_BRIDGE,
            self.target_chain_id,
            self.new_contract.as_bytes(),
        )
    }
}

/// Recovery of a chain id after an EVM chain-id change. `evm_chain_id` is a
/// 256-bit value serialized as 32 big-endian bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyRecoverChainId {
    pub module: String,
    pub evm_chain_id: U256,
    pub new_chain_id: ChainId,
}

impl GovernanceEncoding for BodyRecoverChainId {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = left_pad_module(&self.module, 32);
        let action = if self.module == CORE_MODULE {
            ACTION_CORE_RECOVER_CHAIN_ID
        } else {
            ACTION_TOKEN_BRIDGE_RECOVER_CHAIN_ID
        };
        buf.push(action);
        let mut evm_chain_id = [0u8; 32];
        self.evm_chain_id.to_big_endian(&mut evm_chain_id);
        buf.extend_from_slice(&evm_chain_id);
        buf.extend_from_slice(&self.new_chain_id.to_be_bytes());
        buf
    }
}

/// Switch of the relayer module's default delivery provider on one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyRelayerSetDefaultDeliveryProvider {
    pub chain_id: ChainId,
    pub new_default_delivery_provider: Address,
}

impl GovernanceEncoding for BodyRelayerSetDefaultDeliveryProvider {
    fn serialize(&self) -> Vec<u8> {
        serialize_bridge_governance_body(
            RELAYER_MODULE,
            ACTION_RELAYER_SET_DEFAULT_DELIVERY_PROVIDER,
            self.chain_id,
            self.new_default_delivery_provider.as_bytes(),
        )
    }
}

/// The closed set of governance payloads this node can construct.
#[enum_dispatch(GovernanceEncoding)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GovernancePayload {
    ContractUpgrade(BodyContractUpgrade),
    GuardianSetUpdate(BodyGuardianSetUpdate),
    TokenBridgeRegisterChain(BodyTokenBridgeRegisterChain),
    TokenBridgeUpgradeContract(BodyTokenBridgeUpgradeContract),
    RecoverChainId(BodyRecoverChainId),
    RelayerSetDefaultDeliveryProvider(BodyRelayerSetDefaultDeliveryProvider),
}

fn serialize_bridge_governance_body(
    module: &str,
    action: u8,
    chain_id: ChainId,
    payload: &[u8],
) -> Vec<u8> {
    let mut buf = left_pad_module(module, 32);
    buf.push(action);
    buf.extend_from_slice(&chain_id.to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Build the unsigned governance VAA carrying `payload`.
pub fn create_governance_vaa(
    timestamp: u32,
    nonce: u32,
    sequence: u64,
    guardian_set_index: u32,
    payload: Vec<u8>,
) -> Vaa {
    Vaa {
        version: SUPPORTED_VAA_VERSION,
        guardian_set_index,
        signatures: vec![],
        timestamp,
        nonce,
        emitter_chain: GOVERNANCE_CHAIN,
        emitter_address: governance_emitter(),
        sequence,
        consistency_level: GOVERNANCE_CONSISTENCY_LEVEL,
        payload,
    }
}
