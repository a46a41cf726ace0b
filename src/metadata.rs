//! Synthesized metadata document attached to every submission. Mirrors the
//! shape of solc's own metadata output closely enough for the registry to
//! recompile and classify the match, and embeds a keccak256 hash of the
//! exact source text that was compiled.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::source;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct MetadataDocument {
    pub compiler: CompilerInfo,
    pub language: String,
    pub settings: SettingsInfo,
    pub sources: BTreeMap<String, SourceInfo>,
    pub version: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct CompilerInfo {
    pub version: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsInfo {
    pub compilation_target: BTreeMap<String, String>,
    pub evm_version: String,
    pub optimizer: OptimizerInfo,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct OptimizerInfo {
    pub enabled: bool,
    pub runs: u32,
}

impl Default for OptimizerInfo {
    fn default() -> Self {
        Self {
            enabled: false,
            runs: 200,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct SourceInfo {
    pub keccak256: String,
    pub license: String,
}

impl MetadataDocument {
    /// Builds the document for a single-file submission. `source` must be
    /// the exact (already SPDX-normalized) text being submitted, so the
    /// embedded hash reproduces on the registry side.
    pub fn single_file(
        file_name: &str,
        contract_name: &str,
        source: &str,
        license: &str,
        compiler_version: &str,
        evm_version: &str,
        optimizer: OptimizerInfo,
    ) -> Self {
        let mut compilation_target = BTreeMap::new();
        compilation_target.insert(file_name.to_string(), contract_name.to_string());

        let mut sources = BTreeMap::new();
        sources.insert(
            file_name.to_string(),
            SourceInfo {
                keccak256: source::content_hash(source),
                license: license.to_string(),
            },
        );

        Self {
            compiler: CompilerInfo {
                version: compiler_version.to_string(),
            },
            language: "Solidity".to_string(),
            settings: SettingsInfo {
                compilation_target,
                evm_version: evm_version.to_string(),
                optimizer,
            },
            sources,
            version: 1,
        }
    }

    /// # Errors
    ///
    /// Will return `Err` if the document can't be serialized, which would
    /// indicate a bug in the document construction.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.17;\ncontract Token {}\n";

    fn document() -> MetadataDocument {
        MetadataDocument::single_file(
            "0xb47e3cd837ddf8e4c57f05d70ab865de6e193bbb_Token.sol",
            "Token",
            SOURCE,
            "MIT",
            "0.8.17",
            "shanghai",
            OptimizerInfo::default(),
        )
    }

    #[test]
    fn test_embedded_hash_matches_source() {
        let document = document();
        let info = document
            .sources
            .get("0xb47e3cd837ddf8e4c57f05d70ab865de6e193bbb_Token.sol")
            .unwrap();
        assert_eq!(info.keccak256, crate::source::content_hash(SOURCE));
        assert_eq!(info.license, "MIT");
    }

    #[test]
    fn test_compilation_target() {
        let document = document();
        assert_eq!(
            document
                .settings
                .compilation_target
                .get("0xb47e3cd837ddf8e4c57f05d70ab865de6e193bbb_Token.sol")
                .map(String::as_str),
            Some("Token")
        );
    }

    #[test]
    fn test_serialized_field_casing() {
        let json = document().to_json().unwrap();
        assert!(json.contains("\"evmVersion\":\"shanghai\""));
        assert!(json.contains("\"compilationTarget\""));
        assert!(json.contains("\"version\":1"));
    }

    #[test]
    fn test_json_roundtrip() {
        let document = document();
        let json = document.to_json().unwrap();
        let back: MetadataDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, document);
    }
}
