// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution environment of the node. This is a first-class input: it selects
/// the CCQ signing prefixes, decides whether development defaults are applied
/// and whether memory locking and the root-uid refusal are enforced.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum Environment {
    /// Deterministic local development network. Insecure by design.
    UnsafeDevNet,
    /// Public test network.
    TestNet,
    #[default]
    MainNet,
}

impl Environment {
    /// Whether development defaults (deterministic keys, relaxed process
    /// hardening) apply.
    pub fn is_dev(&self) -> bool {
        matches!(self, Environment::UnsafeDevNet)
    }

    /// The fixed 35-byte prefix prepended to query request bytes before
    /// hashing for signature purposes. Scoping the digest by environment
    /// keeps a testnet signature from ever validating on mainnet.
    pub fn query_request_prefix(&self) -> &'static [u8; 35] {
        match self {
            Environment::MainNet => b"mainnet_query_request_000000000000|",
            Environment::TestNet => b"testnet_query_request_000000000000|",
            Environment::UnsafeDevNet => b"devnet_query_request_0000000000000|",
        }
    }

    /// The response-side counterpart of [`Self::query_request_prefix`].
    pub fn query_response_prefix(&self) -> &'static [u8; 35] {
        match self {
            Environment::MainNet => b"mainnet_query_response_00000000000|",
            Environment::TestNet => b"testnet_query_response_00000000000|",
            Environment::UnsafeDevNet => b"devnet_query_response_000000000000|",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Environment::UnsafeDevNet => "unsafe-dev-net",
            Environment::TestNet => "test-net",
            Environment::MainNet => "main-net",
        };
        write!(f, "{s}")
    }
}
