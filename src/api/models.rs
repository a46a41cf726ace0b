use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Registry classification of a contract's verification state.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    FullMatch,
    PartialMatch,
    FilesExist,
    NotFound,
}

impl MatchStatus {
    /// A positive signal from any check tier.
    pub const fn is_verified(self) -> bool {
        !matches!(self, Self::NotFound)
    }
}

impl Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FullMatch => write!(f, "full_match"),
            Self::PartialMatch => write!(f, "partial_match"),
            Self::FilesExist => write!(f, "files_exist"),
            Self::NotFound => write!(f, "not_found"),
        }
    }
}

/// Match level requested on a submission attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatchKind {
    Full,
    Partial,
}

impl MatchKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full_match",
            Self::Partial => "partial_match",
        }
    }
}

/// Everything needed to build one multipart submission. Both the full and
/// the partial attempt reuse the same payload.
#[derive(Clone, Debug)]
pub struct SubmissionPayload {
    pub file_name: String,
    /// Exact (SPDX-normalized) source text that was compiled.
    pub source: String,
    /// Synthesized metadata document, see [`crate::metadata`].
    pub metadata_json: String,
}

/// Successful submission, reporting which match level the registry granted.
#[derive(Clone, Debug)]
pub struct SubmitOutcome {
    pub status: MatchStatus,
    pub response: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct Error {
    pub error: String,
}

/// `files/any/{chain}/{address}` response; `status` is `full` or `partial`.
#[derive(Debug, Deserialize)]
pub struct FilesAnyResponse {
    pub status: String,
}

/// One entry of the `check-by-addresses` bulk response. `status` is
/// `perfect`, `partial` or `false`.
#[derive(Debug, Deserialize)]
pub struct CheckByAddressesEntry {
    pub address: String,
    pub status: Option<String>,
}

/// Body of a verification `POST`. The registry answers either with per
/// contract results or a single error message.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum VerifyResponse {
    Verified { result: Vec<VerifyResultItem> },
    Error { error: String },
}

#[derive(Debug, Deserialize)]
pub struct VerifyResultItem {
    pub address: String,
    pub status: String,
}
