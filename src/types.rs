//! Core type definitions for the token ledger.
//!
//! This module contains the account identifier, the amount type and the
//! construction-time configuration shared by the ledger, its storage layer
//! and the CLI harness.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token quantity in the smallest indivisible unit.
pub type Amount = u128;

/// Conventional number of display decimals for ERC20-style tokens.
pub const DEFAULT_DECIMALS: u8 = 18;

/// Errors raised while parsing identifiers or loading configuration.
#[derive(Debug, Error)]
pub enum TypeError {
    #[error("Invalid address length: expected 32 bytes, got {0}")]
    InvalidAddressLength(usize),
    #[error("Invalid address encoding: {0}")]
    InvalidAddressEncoding(#[from] hex::FromHexError),
    #[error("Config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Opaque 32-byte account identifier.
///
/// Two addresses are equal only when their bytes are identical. Ordering is
/// lexicographic over the raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 32]);

impl Address {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Address(bytes)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<VerifyingKey> for Address {
    fn from(vk: VerifyingKey) -> Self {
        Address(vk.to_bytes())
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Address(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_hex(&self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", format_hex(&self.0))
    }
}

impl FromStr for Address {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed)?;
        let len = bytes.len();
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| TypeError::InvalidAddressLength(len))?;
        Ok(Address(array))
    }
}

// Addresses travel as hex strings so JSON output stays readable.
impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(serde::de::Error::custom)
    }
}

/// Format a 32-byte value as a lowercase hexadecimal string.
pub fn format_hex(bytes: &[u8; 32]) -> String {
    hex::encode(bytes)
}

fn default_decimals() -> u8 {
    DEFAULT_DECIMALS
}

/// Construction-time ledger configuration.
///
/// Every field is required except `decimals`, which is display-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    pub initial_supply: Amount,
    pub owner: Address,
}

impl TokenConfig {
    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        initial_supply: Amount,
        owner: Address,
    ) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            decimals: DEFAULT_DECIMALS,
            initial_supply,
            owner,
        }
    }

    pub fn with_decimals(mut self, decimals: u8) -> Self {
        self.decimals = decimals;
        self
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TypeError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
