use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AddressError {
    #[error("Address must start with 0x: '{0}'")]
    MissingPrefix(String),
    #[error("Address must be 40 hex characters after 0x: '{0}'")]
    InvalidLength(String),
    #[error("Address contains non-hex characters: '{0}'")]
    InvalidHex(String),
}

/// Account address as handed out by the wallet.
///
/// The provider's casing (often an EIP-55 checksum) is kept for display;
/// equality ignores case.
#[derive(Debug, Clone, Eq, Serialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let input = input.trim();
        let hex = input
            .strip_prefix("0x")
            .or_else(|| input.strip_prefix("0X"))
            .ok_or_else(|| AddressError::MissingPrefix(input.to_string()))?;
        if hex.len() != 40 {
            return Err(AddressError::InvalidLength(input.to_string()));
        }
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AddressError::InvalidHex(input.to_string()));
        }
        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for prompts and status lines: `0x1234...abcd`.
    pub fn short(&self) -> String {
        let s = &self.0;
        format!("{}...{}", &s[..6], &s[s.len() - 4..])
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl std::str::FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0xAbC0000000000000000000000000000000001234";

    #[test]
    fn parse_valid() {
        let addr = Address::parse(ADDR).unwrap();
        assert_eq!(addr.as_str(), ADDR);
    }

    #[test]
    fn equality_ignores_case() {
        let upper = Address::parse(ADDR).unwrap();
        let lower = Address::parse(&ADDR.to_lowercase()).unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.to_string(), ADDR);
    }

    #[test]
    fn short_form() {
        let addr = Address::parse(ADDR).unwrap();
        assert_eq!(addr.short(), "0xAbC0...1234");
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(matches!(
            Address::parse("abc0000000000000000000000000000000001234"),
            Err(AddressError::MissingPrefix(_))
        ));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            Address::parse("0x1234"),
            Err(AddressError::InvalidLength(_))
        ));
    }

    #[test]
    fn rejects_non_hex() {
        assert!(matches!(
            Address::parse("0xZZC0000000000000000000000000000000001234"),
            Err(AddressError::InvalidHex(_))
        ));
    }
}
