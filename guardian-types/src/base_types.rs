// Copyright (c) Guardian Network Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of a canonical emitter/contract address.
pub const ADDRESS_LENGTH: usize = 32;

/// A 16-bit chain identifier. The zero value is reserved for
/// "unset/universal" and is what governance messages addressed to every
/// chain carry as their target.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ChainId(pub u16);

impl ChainId {
    pub const UNSET: ChainId = ChainId(0);
    pub const SOLANA: ChainId = ChainId(1);
    pub const ETHEREUM: ChainId = ChainId(2);

    pub fn is_unset(&self) -> bool {
        self.0 == 0
    }

    /// Whether this id has a fixed assignment in the network.
    pub fn is_known(&self) -> bool {
        matches!(*self, ChainId::SOLANA | ChainId::ETHEREUM)
    }

    pub fn name(&self) -> &'static str {
        match *self {
            ChainId::UNSET => "unset",
            ChainId::SOLANA => "solana",
            ChainId::ETHEREUM => "ethereum",
            _ => "unknown",
        }
    }

    pub fn to_be_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() || self.is_unset() {
            write!(f, "{}", self.name())
        } else {
            write!(f, "chain-{}", self.0)
        }
    }
}

impl From<u16> for ChainId {
    fn from(id: u16) -> Self {
        ChainId(id)
    }
}

impl FromStr for ChainId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unset" => Ok(ChainId::UNSET),
            "solana" => Ok(ChainId::SOLANA),
            "ethereum" => Ok(ChainId::ETHEREUM),
            _ => match s.parse::<u16>() {
                Ok(id) => Ok(ChainId(id)),
                Err(_) => Err(anyhow::anyhow!("unknown chain name: {s}")),
            },
        }
    }
}

/// A 32-byte opaque address. Chains whose native addresses are shorter are
/// left-zero-padded; longer-address chains hash down to 32 bytes per
/// chain-specific rules before they reach this type.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Address(pub [u8; ADDRESS_LENGTH]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    pub fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Parse from hex. Accepts exactly 64 hex characters, with or without a
    /// `0x` prefix.
    pub fn from_hex(s: &str) -> anyhow::Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)
            .map_err(|e| anyhow::anyhow!("invalid address encoding (expected hex): {e}"))?;
        if bytes.len() != ADDRESS_LENGTH {
            return Err(anyhow::anyhow!(
                "invalid address (expected {ADDRESS_LENGTH} bytes, got {})",
                bytes.len()
            ));
        }
        let mut out = [0u8; ADDRESS_LENGTH];
        out.copy_from_slice(&bytes);
        Ok(Address(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_hex(s)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_round_trip() {
        assert_eq!("solana".parse::<ChainId>().unwrap(), ChainId::SOLANA);
        assert_eq!("ethereum".parse::<ChainId>().unwrap(), ChainId::ETHEREUM);
        assert_eq!("42".parse::<ChainId>().unwrap(), ChainId(42));
        assert_eq!(ChainId::SOLANA.to_string(), "solana");
        assert_eq!(ChainId(9999).to_string(), "chain-9999");
        assert!(ChainId::UNSET.is_unset());
        assert!(!ChainId(9999).is_known());
    }

    #[test]
    fn test_address_hex_round_trip() {
        let hex = "000000000000000000000000000000000000000000000000000000000000beef";
        let addr = Address::from_hex(hex).unwrap();
        assert_eq!(addr.to_string(), hex);
        // 0x prefix is accepted
        assert_eq!(Address::from_hex(&format!("0x{hex}")).unwrap(), addr);
    }

    #[test]
    fn test_address_rejects_bad_lengths() {
        assert!(Address::from_hex("beef").is_err());
        assert!(Address::from_hex(&"00".repeat(33)).is_err());
        assert!(Address::from_hex("not-hex").is_err());
    }
}
