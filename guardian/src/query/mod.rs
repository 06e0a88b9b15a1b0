// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

//! Cross-chain query (CCQ) request and response codecs. Queries are a
//! separate signed-message lane through the same gossip: a requester signs a
//! `QueryRequest`, guardians fan the per-chain bodies out to their watchers
//! and sign the aggregated `QueryResponsePublication`. Both signing digests
//! are scoped by the environment prefix so signatures can never cross
//! networks.

pub mod handler;

use crate::crypto::keccak256;
use crate::error::{GuardianError, GuardianResult};
use crate::vaa::Reader;
use guardian_types::{ChainId, Environment};

pub const QUERY_MSG_VERSION: u8 = 1;

/// The only commitment level currently supported.
pub const REQUIRED_COMMITMENT: &str = "finalized";

/// Longest commitment string we will read.
pub const MAX_COMMITMENT_LENGTH: usize = 12;

pub const SOLANA_PUBLIC_KEY_LENGTH: usize = 32;

/// The supported chain's RPC accepts at most this many accounts per query.
pub const MAX_ACCOUNTS_PER_QUERY: usize = 100;

/// A program-derived address may carry 1..=16 seeds of 1..=32 bytes.
pub const MAX_SEEDS: usize = 16;
pub const MAX_SEED_LENGTH: usize = 32;

pub const SOL_ACCOUNT_QUERY_TYPE: u8 = 4;
pub const SOL_PDA_QUERY_TYPE: u8 = 5;

/// A cross-chain query request: a nonce plus one query per target chain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryRequest {
    pub nonce: u32,
    pub per_chain_queries: Vec<PerChainQueryRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerChainQueryRequest {
    pub chain_id: ChainId,
    pub query: ChainSpecificQuery,
}

/// The closed set of chain-specific query bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainSpecificQuery {
    SolAccount(SolanaAccountQueryRequest),
    SolPda(SolanaPdaQueryRequest),
}

impl ChainSpecificQuery {
    pub fn query_type(&self) -> u8 {
        match self {
            ChainSpecificQuery::SolAccount(_) => SOL_ACCOUNT_QUERY_TYPE,
            ChainSpecificQuery::SolPda(_) => SOL_PDA_QUERY_TYPE,
        }
    }
}

/// Read the account data of a list of accounts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SolanaAccountQueryRequest {
    pub commitment: String,
    /// The minimum slot that the request can be evaluated at. Zero means
    /// unused.
    pub min_context_slot: u64,
    /// Offset of the start of data to be returned. Unused if the length is
    /// zero.
    pub data_slice_offset: u64,
    /// Length of the data to be returned. Zero means all data.
    pub data_slice_length: u64,
    pub accounts: Vec<[u8; SOLANA_PUBLIC_KEY_LENGTH]>,
}

/// Read the account data of a list of program-derived addresses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SolanaPdaQueryRequest {
    pub commitment: String,
    pub min_context_slot: u64,
    pub data_slice_offset: u64,
    pub data_slice_length: u64,
    pub pdas: Vec<SolanaPdaEntry>,
}

/// A single program-derived address: the program plus its seeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolanaPdaEntry {
    pub program_address: [u8; SOLANA_PUBLIC_KEY_LENGTH],
    pub seeds: Vec<Vec<u8>>,
}

/// The request signing digest: `keccak256(env_prefix || bytes)`.
pub fn query_request_digest(env: Environment, bytes: &[u8]) -> [u8; 32] {
    let mut buf = Vec::with_capacity(35 + bytes.len());
    buf.extend_from_slice(env.query_request_prefix());
    buf.extend_from_slice(bytes);
    keccak256(&buf)
}

/// The response signing digest: `keccak256(env_prefix || bytes)`.
pub fn query_response_digest(env: Environment, bytes: &[u8]) -> [u8; 32] {
    let mut buf = Vec::with_capacity(35 + bytes.len());
    buf.extend_from_slice(env.query_response_prefix());
    buf.extend_from_slice(bytes);
    keccak256(&buf)
}

impl QueryRequest {
    /// Serialize. Refuses invalid requests through the same validator used
    /// on decode, so `decode(encode(x)) == x` holds exactly for valid `x`.
    pub fn encode(&self) -> GuardianResult<Vec<u8>> {
        self.validate()?;

        let mut buf = Vec::new();
        buf.push(QUERY_MSG_VERSION);
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.push(self.per_chain_queries.len() as u8);
        for per_chain_query in &self.per_chain_queries {
            buf.extend_from_slice(&per_chain_query.encode()?);
        }
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> GuardianResult<Self> {
        let mut r = Reader::new(data);

        let version = r.u8("message version")?;
        if version != QUERY_MSG_VERSION {
            return Err(GuardianError::Malformed(format!(
                "unsupported message version: {version}"
            )));
        }

        let nonce = r.u32("request nonce")?;
        let num_per_chain_queries = r.u8("number of per chain queries")?;

        let mut per_chain_queries = Vec::with_capacity(num_per_chain_queries as usize);
        for _ in 0..num_per_chain_queries {
            per_chain_queries.push(PerChainQueryRequest::decode_from_reader(&mut r)?);
        }

        if !r.is_empty() {
            return Err(GuardianError::Malformed("excess bytes in query".into()));
        }

        let request = QueryRequest {
            nonce,
            per_chain_queries,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> GuardianResult<()> {
        // Nothing to validate on the nonce.
        if self.per_chain_queries.is_empty() {
            return Err(GuardianError::InvalidQuery(
                "request does not contain any per chain queries".into(),
            ));
        }
        if self.per_chain_queries.len() > u8::MAX as usize {
            return Err(GuardianError::InvalidQuery(
                "too many per chain queries".into(),
            ));
        }
        for (idx, per_chain_query) in self.per_chain_queries.iter().enumerate() {
            per_chain_query.validate().map_err(|e| {
                GuardianError::InvalidQuery(format!(
                    "failed to validate per chain query {idx}: {e:?}"
                ))
            })?;
        }
        Ok(())
    }
}

impl PerChainQueryRequest {
    pub fn encode(&self) -> GuardianResult<Vec<u8>> {
        self.validate()?;

        let mut buf = Vec::new();
        buf.extend_from_slice(&self.chain_id.to_be_bytes());
        buf.push(self.query.query_type());

        let query_buf = match &self.query {
            ChainSpecificQuery::SolAccount(q) => q.encode()?,
            ChainSpecificQuery::SolPda(q) => q.encode()?,
        };
        // The body length is written to facilitate on-chain parsing.
        if query_buf.len() > u32::MAX as usize {
            return Err(GuardianError::InvalidQuery("query too long".into()));
        }
        buf.extend_from_slice(&(query_buf.len() as u32).to_be_bytes());
        buf.extend_from_slice(&query_buf);
        Ok(buf)
    }

    fn decode_from_reader(r: &mut Reader<'_>) -> GuardianResult<Self> {
        let chain_id = ChainId(r.u16("request chain")?);
        let query_type = r.u8("request type")?;
        // Skip the query length; bodies are self-describing.
        let _query_length = r.u32("query length")?;

        let query = match query_type {
            SOL_ACCOUNT_QUERY_TYPE => {
                ChainSpecificQuery::SolAccount(SolanaAccountQueryRequest::decode_from_reader(r)?)
            }
            SOL_PDA_QUERY_TYPE => {
                ChainSpecificQuery::SolPda(SolanaPdaQueryRequest::decode_from_reader(r)?)
            }
            _ => {
                return Err(GuardianError::Malformed(format!(
                    "unsupported query type: {query_type}"
                )))
            }
        };

        Ok(PerChainQueryRequest { chain_id, query })
    }

    pub fn validate(&self) -> GuardianResult<()> {
        if !self.chain_id.is_known() {
            return Err(GuardianError::InvalidQuery(format!(
                "invalid chain id: {}",
                self.chain_id.0
            )));
        }
        match &self.query {
            ChainSpecificQuery::SolAccount(q) => q.validate(),
            ChainSpecificQuery::SolPda(q) => q.validate(),
        }
    }
}

fn validate_commitment_and_slice(
    commitment: &str,
    data_slice_offset: u64,
    data_slice_length: u64,
) -> GuardianResult<()> {
    if commitment.len() > MAX_COMMITMENT_LENGTH {
        return Err(GuardianError::InvalidQuery("commitment too long".into()));
    }
    if commitment != REQUIRED_COMMITMENT {
        return Err(GuardianError::InvalidQuery(format!(
            "commitment must be \"{REQUIRED_COMMITMENT}\""
        )));
    }
    if data_slice_length == 0 && data_slice_offset != 0 {
        return Err(GuardianError::InvalidQuery(
            "data slice offset may not be set if data slice length is zero".into(),
        ));
    }
    Ok(())
}

fn decode_commitment(r: &mut Reader<'_>) -> GuardianResult<String> {
    let len = r.u32("commitment len")? as usize;
    if len > MAX_COMMITMENT_LENGTH {
        return Err(GuardianError::Malformed(format!(
            "commitment string is too long, may not be more than {MAX_COMMITMENT_LENGTH} characters"
        )));
    }
    let bytes = r.bytes(len, "commitment")?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| GuardianError::Malformed("commitment is not utf-8".into()))
}

impl SolanaAccountQueryRequest {
    pub fn encode(&self) -> GuardianResult<Vec<u8>> {
        self.validate()?;

        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.commitment.len() as u32).to_be_bytes());
        buf.extend_from_slice(self.commitment.as_bytes());
        buf.extend_from_slice(&self.min_context_slot.to_be_bytes());
        buf.extend_from_slice(&self.data_slice_offset.to_be_bytes());
        buf.extend_from_slice(&self.data_slice_length.to_be_bytes());
        buf.push(self.accounts.len() as u8);
        for account in &self.accounts {
            buf.extend_from_slice(account);
        }
        Ok(buf)
    }

    fn decode_from_reader(r: &mut Reader<'_>) -> GuardianResult<Self> {
        let commitment = decode_commitment(r)?;
        let min_context_slot = r.u64("min slot")?;
        let data_slice_offset = r.u64("data slice offset")?;
        let data_slice_length = r.u64("data slice length")?;

        let num_accounts = r.u8("number of account entries")?;
        let mut accounts = Vec::with_capacity(num_accounts as usize);
        for _ in 0..num_accounts {
            let mut account = [0u8; SOLANA_PUBLIC_KEY_LENGTH];
            account.copy_from_slice(r.bytes(SOLANA_PUBLIC_KEY_LENGTH, "account")?);
            accounts.push(account);
        }

        Ok(SolanaAccountQueryRequest {
            commitment,
            min_context_slot,
            data_slice_offset,
            data_slice_length,
            accounts,
        })
    }

    pub fn validate(&self) -> GuardianResult<()> {
        validate_commitment_and_slice(
            &self.commitment,
            self.data_slice_offset,
            self.data_slice_length,
        )?;
        if self.accounts.is_empty() {
            return Err(GuardianError::InvalidQuery(
                "does not contain any account entries".into(),
            ));
        }
        if self.accounts.len() > MAX_ACCOUNTS_PER_QUERY {
            return Err(GuardianError::InvalidQuery(format!(
                "too many account entries, may not be more than {MAX_ACCOUNTS_PER_QUERY}"
            )));
        }
        Ok(())
    }
}

impl SolanaPdaQueryRequest {
    pub fn encode(&self) -> GuardianResult<Vec<u8>> {
        self.validate()?;

        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.commitment.len() as u32).to_be_bytes());
        buf.extend_from_slice(self.commitment.as_bytes());
        buf.extend_from_slice(&self.min_context_slot.to_be_bytes());
        buf.extend_from_slice(&self.data_slice_offset.to_be_bytes());
        buf.extend_from_slice(&self.data_slice_length.to_be_bytes());
        buf.push(self.pdas.len() as u8);
        for pda in &self.pdas {
            buf.extend_from_slice(&pda.program_address);
            buf.push(pda.seeds.len() as u8);
            for seed in &pda.seeds {
                buf.extend_from_slice(&(seed.len() as u32).to_be_bytes());
                buf.extend_from_slice(seed);
            }
        }
        Ok(buf)
    }

    fn decode_from_reader(r: &mut Reader<'_>) -> GuardianResult<Self> {
        let commitment = decode_commitment(r)?;
        let min_context_slot = r.u64("min slot")?;
        let data_slice_offset = r.u64("data slice offset")?;
        let data_slice_length = r.u64("data slice length")?;

        let num_pdas = r.u8("number of PDAs")?;
        let mut pdas = Vec::with_capacity(num_pdas as usize);
        for _ in 0..num_pdas {
            let mut program_address = [0u8; SOLANA_PUBLIC_KEY_LENGTH];
            program_address.copy_from_slice(r.bytes(SOLANA_PUBLIC_KEY_LENGTH, "program address")?);

            let num_seeds = r.u8("number of seeds")?;
            let mut seeds = Vec::with_capacity(num_seeds as usize);
            for _ in 0..num_seeds {
                let seed_len = r.u32("seed len")? as usize;
                seeds.push(r.bytes(seed_len, "seed")?.to_vec());
            }
            pdas.push(SolanaPdaEntry {
                program_address,
                seeds,
            });
        }

        Ok(SolanaPdaQueryRequest {
            commitment,
            min_context_slot,
            data_slice_offset,
            data_slice_length,
            pdas,
        })
    }

    pub fn validate(&self) -> GuardianResult<()> {
        validate_commitment_and_slice(
            &self.commitment,
            self.data_slice_offset,
            self.data_slice_length,
        )?;
        if self.pdas.is_empty() {
            return Err(GuardianError::InvalidQuery(
                "does not contain any PDA entries".into(),
            ));
        }
        if self.pdas.len() > MAX_ACCOUNTS_PER_QUERY {
            return Err(GuardianError::InvalidQuery(format!(
                "too many PDA entries, may not be more than {MAX_ACCOUNTS_PER_QUERY}"
            )));
        }
        for pda in &self.pdas {
            if pda.seeds.is_empty() {
                return Err(GuardianError::InvalidQuery(
                    "PDA does not contain any seeds".into(),
                ));
            }
            if pda.seeds.len() > MAX_SEEDS {
                return Err(GuardianError::InvalidQuery(
                    "PDA contains too many seeds".into(),
                ));
            }
            for seed in &pda.seeds {
                if seed.is_empty() {
                    return Err(GuardianError::InvalidQuery("seed is empty".into()));
                }
                if seed.len() > MAX_SEED_LENGTH {
                    return Err(GuardianError::InvalidQuery("seed is too long".into()));
                }
            }
        }
        Ok(())
    }
}

//
// Responses. A response publication embeds the signed request it answers and
// one response per per-chain query, in request order.
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponsePublication {
    /// The raw signed request this publication answers.
    pub request_bytes: Vec<u8>,
    pub request_signature: [u8; 65],
    pub per_chain_responses: Vec<PerChainQueryResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerChainQueryResponse {
    pub chain_id: ChainId,
    pub response: ChainSpecificResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainSpecificResponse {
    SolAccount(SolanaAccountQueryResponse),
    SolPda(SolanaPdaQueryResponse),
}

impl ChainSpecificResponse {
    pub fn response_type(&self) -> u8 {
        match self {
            ChainSpecificResponse::SolAccount(_) => SOL_ACCOUNT_QUERY_TYPE,
            ChainSpecificResponse::SolPda(_) => SOL_PDA_QUERY_TYPE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SolanaAccountQueryResponse {
    pub slot_number: u64,
    /// Block time in microseconds since the epoch.
    pub block_time_us: u64,
    pub block_hash: [u8; 32],
    pub results: Vec<SolanaAccountResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SolanaAccountResult {
    pub lamports: u64,
    pub rent_epoch: u64,
    pub executable: bool,
    pub owner: [u8; 32],
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SolanaPdaQueryResponse {
    pub slot_number: u64,
    pub block_time_us: u64,
    pub block_hash: [u8; 32],
    pub results: Vec<SolanaPdaResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SolanaPdaResult {
    /// The account the PDA derived to.
    pub account: [u8; 32],
    pub bump: u8,
    pub lamports: u64,
    pub rent_epoch: u64,
    pub executable: bool,
    pub owner: [u8; 32],
    pub data: Vec<u8>,
}

impl QueryResponsePublication {
    /// A short identifier of the request being answered: the hex of its
    /// signature.
    pub fn request_id(&self) -> String {
        hex::encode(self.request_signature)
    }

    pub fn signing_digest(&self, env: Environment) -> [u8; 32] {
        // encode() only fails on invalid publications, which are never built
        // by this node; fall back to hashing an empty body in that case.
        let bytes = self.encode().unwrap_or_default();
        query_response_digest(env, &bytes)
    }

    pub fn encode(&self) -> GuardianResult<Vec<u8>> {
        self.validate()?;

        let mut buf = Vec::new();
        buf.push(QUERY_MSG_VERSION);
        buf.extend_from_slice(&self.request_signature);
        buf.extend_from_slice(&(self.request_bytes.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.request_bytes);
        buf.push(self.per_chain_responses.len() as u8);
        for per_chain_response in &self.per_chain_responses {
            buf.extend_from_slice(&per_chain_response.encode()?);
        }
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> GuardianResult<Self> {
        let mut r = Reader::new(data);

        let version = r.u8("response version")?;
        if version != QUERY_MSG_VERSION {
            return Err(GuardianError::Malformed(format!(
                "unsupported response version: {version}"
            )));
        }

        let mut request_signature = [0u8; 65];
        request_signature.copy_from_slice(r.bytes(65, "request signature")?);
        let request_len = r.u32("request length")? as usize;
        let request_bytes = r.bytes(request_len, "request bytes")?.to_vec();

        let num_responses = r.u8("number of per chain responses")?;
        let mut per_chain_responses = Vec::with_capacity(num_responses as usize);
        for _ in 0..num_responses {
            per_chain_responses.push(PerChainQueryResponse::decode_from_reader(&mut r)?);
        }

        if !r.is_empty() {
            return Err(GuardianError::Malformed("excess bytes in response".into()));
        }

        let publication = QueryResponsePublication {
            request_bytes,
            request_signature,
            per_chain_responses,
        };
        publication.validate()?;
        Ok(publication)
    }

    pub fn validate(&self) -> GuardianResult<()> {
        if self.per_chain_responses.is_empty() {
            return Err(GuardianError::InvalidQuery(
                "response does not contain any per chain responses".into(),
            ));
        }
        if self.per_chain_responses.len() > u8::MAX as usize {
            return Err(GuardianError::InvalidQuery(
                "too many per chain responses".into(),
            ));
        }
        if self.request_bytes.len() > u32::MAX as usize {
            return Err(GuardianError::InvalidQuery("request too long".into()));
        }
        Ok(())
    }
}

impl PerChainQueryResponse {
    fn encode(&self) -> GuardianResult<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.chain_id.to_be_bytes());
        buf.push(self.response.response_type());

        let body = match &self.response {
            ChainSpecificResponse::SolAccount(resp) => resp.encode(),
            ChainSpecificResponse::SolPda(resp) => resp.encode(),
        };
        if body.len() > u32::MAX as usize {
            return Err(GuardianError::InvalidQuery("response too long".into()));
        }
        buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    fn decode_from_reader(r: &mut Reader<'_>) -> GuardianResult<Self> {
        let chain_id = ChainId(r.u16("response chain")?);
        let response_type = r.u8("response type")?;
        let _response_length = r.u32("response length")?;

        let response = match response_type {
            SOL_ACCOUNT_QUERY_TYPE => ChainSpecificResponse::SolAccount(
                SolanaAccountQueryResponse::decode_from_reader(r)?,
            ),
            SOL_PDA_QUERY_TYPE => {
                ChainSpecificResponse::SolPda(SolanaPdaQueryResponse::decode_from_reader(r)?)
            }
            _ => {
                return Err(GuardianError::Malformed(format!(
                    "unsupported response type: {response_type}"
                )))
            }
        };

        Ok(PerChainQueryResponse { chain_id, response })
    }
}

fn encode_account_result_common(buf: &mut Vec<u8>, result: &SolanaAccountResult) {
    buf.extend_from_slice(&result.lamports.to_be_bytes());
    buf.extend_from_slice(&result.rent_epoch.to_be_bytes());
    buf.push(result.executable as u8);
    buf.extend_from_slice(&result.owner);
    buf.extend_from_slice(&(result.data.len() as u32).to_be_bytes());
    buf.extend_from_slice(&result.data);
}

fn decode_account_result_common(r: &mut Reader<'_>) -> GuardianResult<SolanaAccountResult> {
    let lamports = r.u64("lamports")?;
    let rent_epoch = r.u64("rent epoch")?;
    let executable = r.u8("executable")? != 0;
    let mut owner = [0u8; 32];
    owner.copy_from_slice(r.bytes(32, "owner")?);
    let data_len = r.u32("data length")? as usize;
    let data = r.bytes(data_len, "account data")?.to_vec();
    Ok(SolanaAccountResult {
        lamports,
        rent_epoch,
        executable,
        owner,
        data,
    })
}

impl SolanaAccountQueryResponse {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.slot_number.to_be_bytes());
        buf.extend_from_slice(&self.block_time_us.to_be_bytes());
        buf.extend_from_slice(&self.block_hash);
        buf.push(self.results.len() as u8);
        for result in &self.results {
            encode_account_result_common(&mut buf, result);
        }
        buf
    }

    fn decode_from_reader(r: &mut Reader<'_>) -> GuardianResult<Self> {
        let slot_number = r.u64("slot number")?;
        let block_time_us = r.u64("block time")?;
        let mut block_hash = [0u8; 32];
        block_hash.copy_from_slice(r.bytes(32, "block hash")?);
        let num_results = r.u8("number of results")?;
        let mut results = Vec::with_capacity(num_results as usize);
        for _ in 0..num_results {
            results.push(decode_account_result_common(r)?);
        }
        Ok(SolanaAccountQueryResponse {
            slot_number,
            block_time_us,
            block_hash,
            results,
        })
    }
}

impl SolanaPdaQueryResponse {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.slot_number.to_be_bytes());
        buf.extend_from_slice(&self.block_time_us.to_be_bytes());
        buf.extend_from_slice(&self.block_hash);
        buf.push(self.results.len() as u8);
        for result in &self.results {
            buf.extend_from_slice(&result.account);
            buf.push(result.bump);
            encode_account_result_common(
                &mut buf,
                &SolanaAccountResult {
                    lamports: result.lamports,
                    rent_epoch: result.rent_epoch,
                    executable: result.executable,
                    owner: result.owner,
                    data: result.data.clone(),
                },
            );
        }
        buf
    }

    fn decode_from_reader(r: &mut Reader<'_>) -> GuardianResult<Self> {
        let slot_number = r.u64("slot number")?;
        let block_time_us = r.u64("block time")?;
        let mut block_hash = [0u8; 32];
        block_hash.copy_from_slice(r.bytes(32, "block hash")?);
        let num_results = r.u8("number of results")?;
        let mut results = Vec::with_capacity(num_results as usize);
        for _ in 0..num_results {
            let mut account = [0u8; 32];
            account.copy_from_slice(r.bytes(32, "pda account")?);
            let bump = r.u8("bump")?;
            let common = decode_account_result_common(r)?;
            results.push(SolanaPdaResult {
                account,
                bump,
                lamports: common.lamports,
                rent_epoch: common.rent_epoch,
                executable: common.executable,
                owner: common.owner,
                data: common.data,
            });
        }
        Ok(SolanaPdaQueryResponse {
            slot_number,
            block_time_us,
            block_hash,
            results,
        })
    }
}
