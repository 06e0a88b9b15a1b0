// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

// Token and chain tables for the chain governor, one set per environment.
//
// These tables are maintained by hand. Add / remove / update entries as
// appropriate.

use guardian_types::{ChainId, Environment};

#[derive(Debug, Clone)]
pub struct ChainConfigEntry {
    pub emitter_chain: ChainId,
    /// The chain's token-bridge emitter, hex encoded.
    pub emitter_address: &'static str,
    /// Rolling 24-hour notional limit, whole USD.
    pub daily_limit: u64,
    /// Transfers at or above this notional get the 24-hour delay, whole USD.
    pub big_transaction_size: u64,
}

#[derive(Debug, Clone)]
pub struct TokenConfigEntry {
    pub chain: ChainId,
    /// Canonical 32-byte token address, hex encoded.
    pub addr: &'static str,
    pub symbol: &'static str,
    pub coin_gecko_id: &'static str,
    pub decimals: u8,
    pub price: f64,
}

/// Length of the governor's sliding window, in minutes.
pub fn day_length_minutes(env: Environment) -> u32 {
    match env {
        // Short window so local tests do not wait a day.
        Environment::UnsafeDevNet => 5,
        _ => 24 * 60,
    }
}

pub fn chain_list(env: Environment) -> Vec<ChainConfigEntry> {
    match env {
        Environment::MainNet => vec![ChainConfigEntry {
            emitter_chain: ChainId::SOLANA,
            emitter_address: "ec7372995d5cc8732397fb0ad35c0121e0eaa90d26f828a534cab54391b3a4f5",
            daily_limit: 25_000_000,
            big_transaction_size: 2_500_000,
        }],
        Environment::TestNet => vec![ChainConfigEntry {
            emitter_chain: ChainId::SOLANA,
            emitter_address: "3b26409f8aaded3f5ddca184695aa6a0fa829b0c85caf84856324896d214ca98",
            daily_limit: 25_000_000,
            big_transaction_size: 2_500_000,
        }],
        Environment::UnsafeDevNet => vec![ChainConfigEntry {
            emitter_chain: ChainId::SOLANA,
            emitter_address: "c69a1b1a65dd336bf1df6a77afb501fc25db7fc0938cb08595a9ef473265cb4f",
            daily_limit: 100,
            big_transaction_size: 75,
        }],
    }
}

pub fn token_list(env: Environment) -> Vec<TokenConfigEntry> {
    match env {
        Environment::UnsafeDevNet => vec![
            // Addr: So11111111111111111111111111111111111111112
            TokenConfigEntry {
                chain: ChainId::SOLANA,
                addr: "069b8857feab8184fb687f634618c035dac439dc1aeb3b5598a0f00000000001",
                symbol: "SOL",
                coin_gecko_id: "wrapped-solana",
                decimals: 8,
                price: 34.94,
            },
        ],
        _ => vec![
            TokenConfigEntry {
                chain: ChainId::SOLANA,
                addr: "069b8857feab8184fb687f634618c035dac439dc1aeb3b5598a0f00000000001",
                symbol: "SOL",
                coin_gecko_id: "wrapped-solana",
                decimals: 8,
                price: 34.94,
            },
            TokenConfigEntry {
                chain: ChainId::SOLANA,
                addr: "c6fa7af3bedbad3a3d65f36aabc97431b1bbe4c2d2f6e0e47ca60203452f5d61",
                symbol: "USDC",
                coin_gecko_id: "usd-coin",
                decimals: 6,
                price: 1.0,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardian_types::Address;

    #[test]
    fn test_config_tables_are_well_formed() {
        for env in [
            Environment::UnsafeDevNet,
            Environment::TestNet,
            Environment::MainNet,
        ] {
            for chain in chain_list(env) {
                assert!(Address::from_hex(chain.emitter_address).is_ok());
                assert!(chain.daily_limit > 0);
                assert!(chain.big_transaction_size <= chain.daily_limit);
            }
            for token in token_list(env) {
                assert!(Address::from_hex(token.addr).is_ok());
                assert!(token.price > 0.0);
                assert!(!token.symbol.is_empty());
            }
            assert!(day_length_minutes(env) > 0);
        }
    }
}
