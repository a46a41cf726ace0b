use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Canonical EVM contract address: lowercase, `0x`-prefixed, 40 hex digits.
///
/// Every address entering the pipeline is normalized through [`ContractAddress::new`]
/// before any cache lookup or remote call is made.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ContractAddress(String);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AddressError {
    #[error("{0} is not a valid contract address")]
    Match(String),
    #[error("Address regex error")]
    Regex(#[from] regex::Error),
}

impl ContractAddress {
    const PATTERN: &'static str = r"^0x[0-9a-f]{40}$";

    /// # Errors
    ///
    /// Will fail if `raw`, after lowercasing and `0x`-prefixing, doesn't
    /// match the canonical address pattern.
    pub fn new(raw: &str) -> Result<Self, AddressError> {
        let re = Regex::new(Self::PATTERN)?;

        let lower = raw.trim().to_lowercase();
        let normalized = if lower.starts_with("0x") {
            lower
        } else {
            format!("0x{lower}")
        };

        if re.is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(AddressError::Match(raw.to_string()))
        }
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ContractAddress {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl<'de> Deserialize<'de> for ContractAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_address_canonical() {
        let valid = "0xb47e3cd837ddf8e4c57f05d70ab865de6e193bbb";
        assert!(ContractAddress::new(valid).is_ok());
    }

    #[test]
    fn test_uppercase_is_normalized() {
        let checksummed = "0xB47e3cd837dDF8e4c57F05d70Ab865de6e193BBB";
        let address = ContractAddress::new(checksummed).unwrap();
        assert_eq!(
            address.as_ref(),
            "0xb47e3cd837ddf8e4c57f05d70ab865de6e193bbb"
        );
    }

    #[test]
    fn test_missing_prefix_is_added() {
        let bare = "b47e3cd837ddf8e4c57f05d70ab865de6e193bbb";
        let address = ContractAddress::new(bare).unwrap();
        assert_eq!(
            address.as_ref(),
            "0xb47e3cd837ddf8e4c57f05d70ab865de6e193bbb"
        );
    }

    #[test]
    fn test_invalid_address_pattern() {
        assert!(ContractAddress::new("0xnot-an-address").is_err());
    }

    #[test]
    fn test_invalid_address_too_short() {
        assert!(ContractAddress::new("0xb47e3cd8").is_err());
    }

    #[test]
    fn test_invalid_address_too_long() {
        let too_long = "0xb47e3cd837ddf8e4c57f05d70ab865de6e193bbb12";
        assert!(ContractAddress::new(too_long).is_err());
    }

    #[test]
    fn test_empty_address() {
        assert!(ContractAddress::new("").is_err());
    }

    #[test]
    fn test_address_display() {
        let raw = "0xb47e3cd837ddf8e4c57f05d70ab865de6e193bbb";
        let address = ContractAddress::new(raw).unwrap();
        assert_eq!(format!("{address}"), raw);
    }

    #[test]
    fn test_address_serde_roundtrip() {
        let raw = "0xb47e3cd837ddf8e4c57f05d70ab865de6e193bbb";
        let address = ContractAddress::new(raw).unwrap();
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{raw}\""));
        let back: ContractAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }

    #[test]
    fn test_address_deserialize_rejects_invalid() {
        let result: Result<ContractAddress, _> = serde_json::from_str("\"0x1234\"");
        assert!(result.is_err());
    }
}
