//! # Sourcify Sync
//!
//! A Rust library for reconciling a local corpus of Solidity contract
//! sources against a Sourcify-compatible verification registry, and for
//! recompiling and submitting the contracts the registry is missing.
//!
//! ## Features
//!
//! - **Corpus Discovery**: Scan address-named source files and diff them
//!   against the registry's verification state
//! - **Verification Cache**: Remember definitive registry answers so
//!   repeated runs cost no redundant remote calls
//! - **Rate-limited Client**: Throttled, retrying HTTP client with separate
//!   budgets for transient failures and 429 responses
//! - **Batch Submission**: Compile with `solc` and submit missing contracts
//!   in bounded concurrent batches with checkpointed progress
//! - **Type Safety**: Strong typing for contract addresses and match status
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sourcify_sync::{
//!     address::ContractAddress,
//!     api::{ApiClient, ClientOptions},
//! };
//! use url::Url;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Create an API client for mainnet
//! let client = ApiClient::new(
//!     Url::parse("https://sourcify.dev/server")?,
//!     1,
//!     ClientOptions::default(),
//! )?;
//!
//! // Check a contract's verification state
//! let address = ContractAddress::new("0xB47e3cd837dDF8e4c57F05d70Ab865de6e193BBB")?;
//! let status = client.check_verified(&address).await?;
//! println!("Status: {status}");
//! # Ok(())
//! # }
//! ```

/// Type-safe contract address handling and validation
pub mod address;

/// Registry API client, rate limiting and response models
pub mod api;

/// Local cache of definitive registry answers
pub mod cache;

/// Chain id to EVM version and display name mapping
pub mod chain;

/// External `solc` toolchain adapter
pub mod compiler;

/// Shared request failure type
pub mod errors;

/// Corpus scanner producing the missing-contract set
pub mod finder;

/// Metadata document synthesis for submissions
pub mod metadata;

/// Compile-and-submit batch processor
pub mod processor;

/// Console progress reporting
pub mod progress;

/// Solidity source and corpus file name parsing
pub mod source;

/// Persisted pipeline state and submission log
pub mod state;
