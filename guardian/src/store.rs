// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

//! Persistent store for signed VAAs, keyed by `(chain, emitter, sequence)`.
//!
//! Keys are the big-endian concatenation `chain (2) || emitter (32) ||
//! sequence (8)`, so lexicographic iteration under an emitter prefix yields
//! ascending sequence numbers.

use crate::error::{GuardianError, GuardianResult};
use crate::types::VaaId;
use crate::vaa::Vaa;
use guardian_types::{Address, ChainId};
use rocksdb::{Direction, IteratorMode, Options, DB};
use std::path::Path;
use tracing::{debug, info};

const KEY_LENGTH: usize = 2 + 32 + 8;
const EMITTER_PREFIX_LENGTH: usize = 2 + 32;

impl VaaId {
    /// The store key: `chain || emitter || sequence`, all big-endian.
    pub fn store_key(&self) -> [u8; KEY_LENGTH] {
        let mut key = [0u8; KEY_LENGTH];
        key[..2].copy_from_slice(&self.emitter_chain.to_be_bytes());
        key[2..34].copy_from_slice(self.emitter_address.as_bytes());
        key[34..].copy_from_slice(&self.sequence.to_be_bytes());
        key
    }

    pub fn emitter_prefix(emitter_chain: ChainId, emitter_address: Address) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(EMITTER_PREFIX_LENGTH);
        prefix.extend_from_slice(&emitter_chain.to_be_bytes());
        prefix.extend_from_slice(emitter_address.as_bytes());
        prefix
    }

    fn from_store_key(key: &[u8]) -> Option<VaaId> {
        if key.len() != KEY_LENGTH {
            return None;
        }
        let chain = u16::from_be_bytes([key[0], key[1]]);
        let mut addr = [0u8; 32];
        addr.copy_from_slice(&key[2..34]);
        let mut seq = [0u8; 8];
        seq.copy_from_slice(&key[34..]);
        Some(VaaId::new(
            ChainId(chain),
            Address::new(addr),
            u64::from_be_bytes(seq),
        ))
    }
}

/// Result of a gap scan over one emitter: the missing sequence numbers
/// between the first and last stored sequence. `missing` is empty iff there
/// is no gap.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SequenceGap {
    pub first: u64,
    pub last: u64,
    pub missing: Vec<u64>,
}

/// Thread-safe store of marshaled signed VAAs. Concurrent reads and writes
/// from any task are permitted; write ordering to a single key is not
/// guaranteed across tasks, which is fine because stores are idempotent.
pub struct VaaStore {
    db: DB,
}

impl VaaStore {
    pub fn open<P: AsRef<Path>>(path: P) -> GuardianResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path.as_ref())
            .map_err(|e| GuardianError::StorageError(format!("failed to open store: {e}")))?;
        info!("vaa store opened at {:?}", path.as_ref());
        Ok(Self { db })
    }

    /// Idempotent put of the marshaled VAA under its key.
    pub fn store_signed_vaa(&self, v: &Vaa) -> GuardianResult<()> {
        let key = v.id().store_key();
        self.db
            .put(key, v.encode())
            .map_err(|e| GuardianError::StorageError(format!("failed to store VAA: {e}")))?;
        debug!("stored signed VAA {}", v.id());
        Ok(())
    }

    pub fn has_vaa(&self, id: VaaId) -> GuardianResult<bool> {
        self.db
            .get(id.store_key())
            .map(|v| v.is_some())
            .map_err(|e| GuardianError::StorageError(format!("failed to look up VAA: {e}")))
    }

    pub fn get_signed_vaa_bytes(&self, id: VaaId) -> GuardianResult<Option<Vec<u8>>> {
        self.db
            .get(id.store_key())
            .map_err(|e| GuardianError::StorageError(format!("failed to read VAA: {e}")))
    }

    /// Scan one emitter and report the missing sequence numbers between the
    /// first and last stored sequence. An emitter with no stored VAAs
    /// reports `first = 0, last = 0, missing = []`.
    pub fn find_emitter_sequence_gap(
        &self,
        emitter_chain: ChainId,
        emitter_address: Address,
    ) -> GuardianResult<SequenceGap> {
        let prefix = VaaId::emitter_prefix(emitter_chain, emitter_address);
        let mut sequences = Vec::new();
        for entry in self
            .db
            .iterator(IteratorMode::From(prefix.as_slice(), Direction::Forward))
        {
            let (key, _) = entry
                .map_err(|e| GuardianError::StorageError(format!("iteration failed: {e}")))?;
            if !key.starts_with(&prefix) {
                break;
            }
            let Some(id) = VaaId::from_store_key(&key) else {
                continue;
            };
            sequences.push(id.sequence);
        }

        let (Some(&first), Some(&last)) = (sequences.first(), sequences.last()) else {
            return Ok(SequenceGap::default());
        };

        // The iterator yields ascending sequences; walk the range once.
        let mut missing = Vec::new();
        let mut expected = first;
        for seq in sequences {
            while expected < seq {
                missing.push(expected);
                expected += 1;
            }
            expected = seq + 1;
        }

        Ok(SequenceGap {
            first,
            last,
            missing,
        })
    }

    /// Delete (or, with `dry_run`, merely count) every VAA under the prefix
    /// whose timestamp is strictly before `older_than` seconds since epoch.
    /// The prefix is a whole chain, or one emitter when `emitter_address` is
    /// given.
    pub fn purge_vaas(
        &self,
        emitter_chain: ChainId,
        emitter_address: Option<Address>,
        older_than: u32,
        dry_run: bool,
    ) -> GuardianResult<usize> {
        let prefix = match emitter_address {
            Some(addr) => VaaId::emitter_prefix(emitter_chain, addr),
            None => emitter_chain.to_be_bytes().to_vec(),
        };

        let mut affected = 0usize;
        for entry in self
            .db
            .iterator(IteratorMode::From(prefix.as_slice(), Direction::Forward))
        {
            let (key, value) = entry
                .map_err(|e| GuardianError::StorageError(format!("iteration failed: {e}")))?;
            if !key.starts_with(&prefix) {
                break;
            }
            let v = match Vaa::decode(&value) {
                Ok(v) => v,
                Err(e) => {
                    return Err(GuardianError::StorageError(format!(
                        "failed to unmarshal VAA for {}: {e:?}",
                        hex::encode(&key)
                    )))
                }
            };
            if v.timestamp < older_than {
                affected += 1;
                if !dry_run {
                    self.db.delete(&key).map_err(|e| {
                        GuardianError::StorageError(format!("failed to delete VAA: {e}"))
                    })?;
                }
            }
        }

        info!(
            "purge of chain {} ({}): {} VAAs {}",
            emitter_chain,
            emitter_address
                .map(|a| a.to_string())
                .unwrap_or_else(|| "all emitters".to_string()),
            affected,
            if dry_run { "would be deleted" } else { "deleted" }
        );
        Ok(affected)
    }

    /// Distinct `(chain, emitter)` pairs present in the store.
    pub fn list_emitters(&self) -> GuardianResult<Vec<(ChainId, Address)>> {
        let mut emitters = Vec::new();
        let mut last: Option<(ChainId, Address)> = None;
        for entry in self.db.iterator(IteratorMode::Start) {
            let (key, _) = entry
                .map_err(|e| GuardianError::StorageError(format!("iteration failed: {e}")))?;
            let Some(id) = VaaId::from_store_key(&key) else {
                continue;
            };
            let emitter = (id.emitter_chain, id.emitter_address);
            if last != Some(emitter) {
                emitters.push(emitter);
                last = Some(emitter);
            }
        }
        Ok(emitters)
    }
}
