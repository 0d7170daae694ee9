/// Chain identifiers and the target network definition.
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Numeric chain identifier (EIP-155).
///
/// Providers report it as a hex quantity (`"0x279f"`), config files often carry
/// the hex form in upper case, and some tools print it in decimal. All of them
/// normalize to the same `u64` so comparisons are numeric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(u64);

#[derive(Debug, Error, PartialEq)]
#[error("Invalid chain id '{0}'")]
pub struct ParseChainIdError(pub String);

impl ChainId {
    pub const MONAD_TESTNET: ChainId = ChainId(10143);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// Lowercase `0x`-prefixed hex, the form providers expect in requests.
    pub fn to_hex(self) -> String {
        format!("{:#x}", self.0)
    }

    /// Parse a chain id as delivered by a provider: a JSON string (hex or
    /// decimal) or a JSON number.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ParseChainIdError> {
        match value {
            serde_json::Value::String(s) => s.parse(),
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(Self)
                .ok_or_else(|| ParseChainIdError(n.to_string())),
            other => Err(ParseChainIdError(other.to_string())),
        }
    }
}

impl std::str::FromStr for ChainId {
    type Err = ParseChainIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parsed = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => trimmed.parse::<u64>(),
        };
        parsed.map(Self).map_err(|_| ParseChainIdError(s.to_string()))
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.to_hex(), self.0)
    }
}

impl Serialize for ChainId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        ChainId::from_json(&value).map_err(serde::de::Error::custom)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Network definition in the shape `wallet_addEthereumChain` expects.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub block_explorer_urls: Vec<String>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::monad_testnet()
    }
}

impl ChainConfig {
    pub fn monad_testnet() -> Self {
        Self {
            chain_id: ChainId::MONAD_TESTNET,
            chain_name: "Monad Testnet".to_string(),
            native_currency: NativeCurrency {
                name: "MON".to_string(),
                symbol: "MON".to_string(),
                decimals: 18,
            },
            rpc_urls: vec!["https://testnet-rpc.monad.xyz".to_string()],
            block_explorer_urls: vec!["https://testnet.monadexplorer.com".to_string()],
        }
    }

    /// Load a chain definition from a JSON file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read chain config {}", path.display()))?;
        let config: ChainConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid chain config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain_name.trim().is_empty() {
            bail!("Chain name cannot be empty.");
        }
        if self.rpc_urls.is_empty() {
            bail!("Chain '{}' needs at least one RPC URL.", self.chain_name);
        }
        if self.native_currency.decimals > 36 {
            bail!(
                "Native currency decimals must be at most 36, got {}.",
                self.native_currency.decimals
            );
        }
        for url in self.rpc_urls.iter().chain(&self.block_explorer_urls) {
            validate_url(url)?;
        }
        Ok(())
    }
}

/// Reject non-HTTPS URLs; wallets refuse to register them anyway.
fn validate_url(url: &str) -> Result<()> {
    if url.starts_with("https://") {
        return Ok(());
    }
    if url.starts_with("http://") {
        bail!("Refusing plain HTTP URL in chain config: {url}");
    }
    bail!("Invalid URL scheme: {url}\nExpected an https:// URL.");
}
