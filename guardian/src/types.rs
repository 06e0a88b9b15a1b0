// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::error::{GuardianError, GuardianResult};
use crate::query::QueryResponsePublication;
use crate::vaa::{calculate_quorum, Vaa};
use ethers::types::{Address as EthAddress, H256};
use guardian_types::{Address, ChainId, Environment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// How long signatures from the previous guardian set remain acceptable
/// after a rotation.
pub const PREVIOUS_SET_GRACE_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Hard cap on guardian set size; indices are a u8 on the wire.
pub const MAX_GUARDIAN_COUNT: usize = 19;

/// An indexed, ordered list of guardian addresses. Index 0 is the genesis
/// set; the index is monotonic across rotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardianSet {
    pub index: u32,
    pub keys: Vec<EthAddress>,
}

impl GuardianSet {
    pub fn new(index: u32, keys: Vec<EthAddress>) -> GuardianResult<Self> {
        if keys.is_empty() {
            return Err(GuardianError::InvalidGuardianSet(
                "empty guardian set specified".into(),
            ));
        }
        if keys.len() > MAX_GUARDIAN_COUNT {
            return Err(GuardianError::InvalidGuardianSet(format!(
                "too many guardians - {}, maximum is {}",
                keys.len(),
                MAX_GUARDIAN_COUNT
            )));
        }
        let distinct: BTreeSet<_> = keys.iter().collect();
        if distinct.len() != keys.len() {
            return Err(GuardianError::InvalidGuardianSet(
                "duplicate guardian key".into(),
            ));
        }
        Ok(Self { index, keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn quorum(&self) -> usize {
        calculate_quorum(self.keys.len())
    }

    pub fn contains(&self, addr: &EthAddress) -> bool {
        self.keys.contains(addr)
    }

    pub fn key_index(&self, addr: &EthAddress) -> Option<usize> {
        self.keys.iter().position(|k| k == addr)
    }

    pub fn keys_as_hex_strings(&self) -> Vec<String> {
        self.keys.iter().map(|k| format!("{k:#x}")).collect()
    }
}

impl fmt::Display for GuardianSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.keys.iter().enumerate() {
            writeln!(f, "index: {}, guardian: {:#x}", i, key)?;
        }
        Ok(())
    }
}

/// Shared view of the current (and, during rotations, previous) guardian
/// set. The processor is the only writer; everything else reads snapshots.
#[derive(Debug, Default)]
pub struct GuardianSetState {
    inner: RwLock<GuardianSetStateInner>,
}

#[derive(Debug, Default)]
struct GuardianSetStateInner {
    current: Option<Arc<GuardianSet>>,
    previous: Option<(Arc<GuardianSet>, Instant)>,
}

impl GuardianSetState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new set. The outgoing set stays valid for verification for
    /// the grace period; older sets are forgotten.
    pub fn set(&self, gs: Arc<GuardianSet>) {
        let mut inner = self.inner.write().unwrap();
        if let Some(old) = inner.current.take() {
            if old.index != gs.index {
                inner.previous = Some((old, Instant::now() + PREVIOUS_SET_GRACE_PERIOD));
            }
        }
        inner.current = Some(gs);
    }

    pub fn current(&self) -> Option<Arc<GuardianSet>> {
        self.inner.read().unwrap().current.clone()
    }

    /// Previous set, if its grace period has not yet elapsed.
    pub fn previous_if_valid(&self) -> Option<Arc<GuardianSet>> {
        let inner = self.inner.read().unwrap();
        match &inner.previous {
            Some((gs, expires)) if Instant::now() < *expires => Some(gs.clone()),
            _ => None,
        }
    }

    /// Look up a set by index among the sets we still hold.
    pub fn get(&self, index: u32) -> Option<Arc<GuardianSet>> {
        let inner = self.inner.read().unwrap();
        if let Some(current) = &inner.current {
            if current.index == index {
                return Some(current.clone());
            }
        }
        if let Some((previous, _)) = &inner.previous {
            if previous.index == index {
                return Some(previous.clone());
            }
        }
        None
    }
}

/// The key of a signed VAA: the emitter tuple plus sequence. Renders as
/// `chain/emitter_hex/sequence`, the form used by the admin surface and the
/// governor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VaaId {
    pub emitter_chain: ChainId,
    pub emitter_address: Address,
    pub sequence: u64,
}

impl VaaId {
    pub fn new(emitter_chain: ChainId, emitter_address: Address, sequence: u64) -> Self {
        Self {
            emitter_chain,
            emitter_address,
            sequence,
        }
    }
}

impl fmt::Display for VaaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.emitter_chain.0, self.emitter_address, self.sequence
        )
    }
}

impl FromStr for VaaId {
    type Err = GuardianError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let (Some(chain), Some(addr), Some(seq), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(GuardianError::Malformed(format!(
                "VAA id must be \"chainId/emitterAddress/seqNum\", got {s:?}"
            )));
        };
        let chain = chain
            .parse::<u16>()
            .map_err(|_| GuardianError::InvalidChainId)?;
        let addr = Address::from_hex(addr)
            .map_err(|e| GuardianError::Malformed(format!("invalid emitter address: {e}")))?;
        let seq = seq
            .parse::<u64>()
            .map_err(|e| GuardianError::Malformed(format!("invalid sequence: {e}")))?;
        Ok(VaaId::new(ChainId(chain), addr, seq))
    }
}

/// A watcher's output: one message emitted on a source chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePublication {
    pub tx_hash: H256,
    pub timestamp: u32,
    pub nonce: u32,
    pub sequence: u64,
    pub consistency_level: u8,
    pub emitter_chain: ChainId,
    pub emitter_address: Address,
    pub payload: Vec<u8>,
    /// Unreliable messages may never be re-observed; their state is simply
    /// dropped when settlement passes without quorum.
    pub unreliable: bool,
}

impl MessagePublication {
    pub fn vaa_id(&self) -> VaaId {
        VaaId::new(self.emitter_chain, self.emitter_address, self.sequence)
    }

    pub fn message_id_string(&self) -> String {
        self.vaa_id().to_string()
    }

    /// The unsigned VAA this message will become once quorum is reached.
    pub fn to_unsigned_vaa(&self, guardian_set_index: u32) -> Vaa {
        Vaa {
            version: crate::vaa::SUPPORTED_VAA_VERSION,
            guardian_set_index,
            signatures: vec![],
            timestamp: self.timestamp,
            nonce: self.nonce,
            emitter_chain: self.emitter_chain,
            emitter_address: self.emitter_address,
            sequence: self.sequence,
            consistency_level: self.consistency_level,
            payload: self.payload.clone(),
        }
    }
}

/// What the local node saw for an in-flight digest. Each variant carries only
/// the data its quorum round needs.
#[derive(Debug, Clone)]
pub enum Observation {
    /// A source-chain message that will be assembled into a signed VAA.
    Vaa(Box<Vaa>),
    /// A cross-chain query response awaiting co-signatures from peers.
    QueryResponse(Box<QueryResponsePublication>),
}

impl Observation {
    /// The digest each guardian signs for this observation. VAAs use the
    /// double-keccak body digest; query responses use the environment-scoped
    /// prefixed digest, which keeps the two families disjoint.
    pub fn signing_digest(&self, env: Environment) -> [u8; 32] {
        match self {
            Observation::Vaa(v) => v.signing_digest(),
            Observation::QueryResponse(r) => r.signing_digest(env),
        }
    }

    pub fn message_id(&self) -> String {
        match self {
            Observation::Vaa(v) => v.id().to_string(),
            Observation::QueryResponse(r) => r.request_id(),
        }
    }

    pub fn emitter_chain(&self) -> ChainId {
        match self {
            Observation::Vaa(v) => v.emitter_chain,
            Observation::QueryResponse(_) => ChainId::UNSET,
        }
    }
}
