//! Deterministic parsers over raw Solidity source text and corpus file
//! names. Everything here is pure so the extraction rules stay unit
//! testable away from the filesystem and the network.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::address::{AddressError, ContractAddress};

/// Substituted when no parsable `pragma solidity` declaration is present.
pub const DEFAULT_COMPILER_VERSION: &str = "0.8.17";

/// Prepended to sources carrying no SPDX tag, so the submitted text matches
/// what the compiler actually saw.
pub const UNLICENSED_HEADER: &str = "// SPDX-License-Identifier: UNLICENSED";

lazy_static! {
    static ref PRAGMA_VERSION: Regex =
        Regex::new(r"pragma\s+solidity\s*[\^>=<~]*\s*(\d+\.\d+\.\d+)").expect("valid regex");
    static ref SPDX_TAG: Regex =
        Regex::new(r"(?m)^\s*//\s*SPDX-License-Identifier:\s*(\S+)").expect("valid regex");
    static ref CONTRACT_DECL: Regex = Regex::new(
        r"(?m)^\s*(?:abstract\s+)?(?:contract|library|interface)\s+([A-Za-z_][A-Za-z0-9_]*)"
    )
    .expect("valid regex");
}

#[derive(Debug, Error, PartialEq)]
pub enum SourceError {
    #[error("{0} doesn't follow the <address>[_<ContractName>].sol naming convention")]
    FileName(String),

    #[error(transparent)]
    Address(#[from] AddressError),
}

/// Compiler version pinned by the first `pragma solidity` declaration,
/// if one is present and parsable.
pub fn pragma_version(source: &str) -> Option<String> {
    PRAGMA_VERSION
        .captures(source)
        .map(|caps| caps[1].to_string())
}

/// SPDX license identifier declared in the source, if any.
pub fn spdx_license(source: &str) -> Option<String> {
    SPDX_TAG.captures(source).map(|caps| caps[1].to_string())
}

/// Returns the source with an `UNLICENSED` SPDX header prepended when none
/// is declared. The returned text is what gets compiled *and* submitted, so
/// the content hash in the metadata document stays consistent.
pub fn ensure_spdx(source: &str) -> (String, String) {
    match spdx_license(source) {
        Some(license) => (source.to_string(), license),
        None => (
            format!("{UNLICENSED_HEADER}\n{source}"),
            "UNLICENSED".to_string(),
        ),
    }
}

/// First top-level contract/library/interface identifier declared in the
/// source.
pub fn declared_contract_name(source: &str) -> Option<String> {
    CONTRACT_DECL
        .captures(source)
        .map(|caps| caps[1].to_string())
}

/// Derives `(address, contract_name)` from a corpus file name, either
/// `<address>.sol` or `<address>_<ContractName>.sol`. When the name part is
/// absent the declared identifier from the source is used, falling back to
/// the file stem.
///
/// # Errors
///
/// Fails on a missing `.sol` extension or an address part that doesn't
/// normalize to a canonical contract address.
pub fn parse_corpus_file(
    file_name: &str,
    source: &str,
) -> Result<(ContractAddress, String), SourceError> {
    let stem = file_name
        .strip_suffix(".sol")
        .ok_or_else(|| SourceError::FileName(file_name.to_string()))?;

    let (raw_address, name) = match stem.split_once('_') {
        Some((address, name)) if !name.is_empty() => (address, Some(name.to_string())),
        Some((address, _)) => (address, None),
        None => (stem, None),
    };

    let address = ContractAddress::new(raw_address)?;
    let contract_name = name
        .or_else(|| declared_contract_name(source))
        .unwrap_or_else(|| stem.to_string());

    Ok((address, contract_name))
}

/// Keccak-256 hash of the exact source text, `0x`-prefixed. Embedded into
/// the metadata document and recomputable by the registry.
pub fn content_hash(source: &str) -> String {
    format!("{:#x}", keccak_hash::keccak(source.as_bytes()))
}
