// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::crypto::GuardianKeyPair;
use crate::types::{GuardianSet, MAX_GUARDIAN_COUNT};
use anyhow::anyhow;
use ethers::types::Address as EthAddress;
use guardian_config::Config;
use guardian_keys::keypair_file::{read_key, read_network_keypair_from_file};
use guardian_keys::GuardianKey;
use guardian_types::Environment;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

#[serde_as]
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GuardianNodeConfig {
    /// Execution environment; drives CCQ prefixes, dev defaults and process
    /// hardening.
    #[serde(default)]
    pub environment: Environment,
    // The port the admin server listens on.
    pub server_listen_port: u16,
    // The port for the metrics server.
    pub metrics_port: u16,
    // Path of the file where the guardian signing key (Secp256k1) is stored.
    pub guardian_key_path: PathBuf,
    // Path of the node identity key (Ed25519). Optional in devnet, where a
    // deterministic key is generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_key_path: Option<PathBuf>,
    // Directory holding the signed-VAA store.
    pub data_dir: PathBuf,
    // Run the chain governor.
    #[serde(default)]
    pub chain_governor_enabled: bool,
    // Enable the cross-chain query lane.
    #[serde(default)]
    pub ccq_enabled: bool,
    // Signers allowed to submit cross chain queries, hex addresses.
    #[serde(default)]
    pub ccq_allowed_requesters: Vec<String>,
    // The guardian set to start from until the first on-chain update is
    // observed.
    pub initial_guardian_set_index: u32,
    pub initial_guardian_keys: Vec<String>,
    // Named RPC endpoints, surfaced verbatim by the admin DumpRPCs call.
    #[serde(default)]
    pub rpc_map: BTreeMap<String, String>,
}

impl Config for GuardianNodeConfig {}

/// The validated runtime view of [`GuardianNodeConfig`]: keys loaded, lists
/// parsed, impossible combinations rejected.
pub struct GuardianRuntimeConfig {
    pub environment: Environment,
    pub server_listen_port: u16,
    pub metrics_port: u16,
    pub guardian_key: GuardianKeyPair,
    pub network_key: fastcrypto::ed25519::Ed25519KeyPair,
    pub data_dir: PathBuf,
    pub chain_governor_enabled: bool,
    pub ccq_enabled: bool,
    pub ccq_allowed_requesters: Vec<EthAddress>,
    pub initial_guardian_set: GuardianSet,
    pub rpc_map: BTreeMap<String, String>,
}

impl GuardianNodeConfig {
    pub fn validate(&self) -> anyhow::Result<GuardianRuntimeConfig> {
        info!("Starting config validation");

        if self.server_listen_port == self.metrics_port {
            return Err(anyhow!(
                "server-listen-port and metrics-port must not be equal"
            ));
        }

        // In devnet a missing guardian key is generated in place; everywhere
        // else it is a fatal configuration error.
        if !self.guardian_key_path.exists() {
            if self.environment.is_dev() {
                info!(
                    "generating devnet guardian key at {:?}",
                    self.guardian_key_path
                );
                guardian_keys::keygen::generate_guardian_key_and_write_to_file(
                    &self.guardian_key_path,
                )?;
            } else {
                return Err(anyhow!(
                    "guardian key not found at {:?}",
                    self.guardian_key_path
                ));
            }
        }
        let guardian_key = match read_key(&self.guardian_key_path, true) {
            Ok(GuardianKey::Secp256k1(key)) => {
                info!(
                    "Successfully loaded Secp256k1 guardian key from {:?}",
                    self.guardian_key_path
                );
                key
            }
            Ok(_) => {
                return Err(anyhow!(
                    "Guardian key at {:?} is not a Secp256k1 key. \
                    Observation signatures require Secp256k1 keys.",
                    self.guardian_key_path
                ));
            }
            Err(e) => {
                return Err(anyhow!(
                    "Failed to read guardian key from {:?}: {}. \
                    You can generate a new key using: keygen guardian --output <path>",
                    self.guardian_key_path,
                    e
                ));
            }
        };

        let network_key = match &self.node_key_path {
            Some(path) => {
                if !path.exists() && self.environment.is_dev() {
                    info!("generating devnet node key at {:?}", path);
                    guardian_keys::keygen::generate_node_key_and_write_to_file(path)?;
                }
                read_network_keypair_from_file(path)?
            }
            None if self.environment.is_dev() => guardian_types::crypto::get_key_pair(),
            None => return Err(anyhow!("node-key-path is required outside devnet")),
        };

        if self.ccq_enabled
            && self.ccq_allowed_requesters.is_empty()
            && !self.environment.is_dev()
        {
            return Err(anyhow!(
                "ccq-allowed-requesters must not be empty when ccq is enabled outside devnet"
            ));
        }
        let mut ccq_allowed_requesters = Vec::with_capacity(self.ccq_allowed_requesters.len());
        for addr in &self.ccq_allowed_requesters {
            ccq_allowed_requesters.push(
                EthAddress::from_str(addr)
                    .map_err(|_| anyhow!("invalid ccq allowed requester: {addr}"))?,
            );
        }

        if self.initial_guardian_keys.is_empty() {
            return Err(anyhow!("initial-guardian-keys must not be empty"));
        }
        if self.initial_guardian_keys.len() > MAX_GUARDIAN_COUNT {
            return Err(anyhow!(
                "initial-guardian-keys holds more than {MAX_GUARDIAN_COUNT} keys"
            ));
        }
        let mut keys = Vec::with_capacity(self.initial_guardian_keys.len());
        for key in &self.initial_guardian_keys {
            keys.push(
                EthAddress::from_str(key)
                    .map_err(|_| anyhow!("invalid initial guardian key: {key}"))?,
            );
        }
        let initial_guardian_set = GuardianSet::new(self.initial_guardian_set_index, keys)
            .map_err(|e| anyhow!("invalid initial guardian set: {e:?}"))?;

        info!("Config validation complete");
        Ok(GuardianRuntimeConfig {
            environment: self.environment,
            server_listen_port: self.server_listen_port,
            metrics_port: self.metrics_port,
            guardian_key,
            network_key,
            data_dir: self.data_dir.clone(),
            chain_governor_enabled: self.chain_governor_enabled,
            ccq_enabled: self.ccq_enabled,
            ccq_allowed_requesters,
            initial_guardian_set,
            rpc_map: self.rpc_map.clone(),
        })
    }
}
