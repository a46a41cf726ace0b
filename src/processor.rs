//! Contract Processor: takes the missing set produced by the Finder,
//! recompiles each contract and submits it to the registry in bounded
//! concurrent batches. Progress, cache and the submission log are persisted
//! after every batch, and a shutdown signal is honored at batch boundaries
//! so an interrupted run can resume from its last checkpoint.

use futures::future::join_all;
use log::{debug, info, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use thiserror::Error;

use crate::{
    api::{ApiClient, MatchStatus, SubmissionPayload},
    cache::{CacheError, VerificationCache},
    chain,
    compiler::{Compile, CompileInput},
    metadata::{MetadataDocument, OptimizerInfo},
    progress::FileProcessingProgress,
    source,
    state::{BatchProgress, ContractRecord, StateError, StateStore, SubmissionRecord},
};

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Clone, Debug)]
pub struct ProcessorOptions {
    /// Contracts processed concurrently per batch.
    pub batch_size: usize,
    /// Pause between batches, easing pressure on the registry.
    pub batch_delay: Duration,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay: Duration::from_secs(1),
        }
    }
}

/// Final state of one processing run. `interrupted` means a shutdown signal
/// cut the run short after a completed, fully persisted batch. The progress
/// counters partition the work: `successful + failed + matching + errors`
/// always equals `processed`.
#[derive(Debug)]
pub struct ProcessOutcome {
    pub progress: BatchProgress,
    pub interrupted: bool,
}

/// What happened to a single record. Computed concurrently; all bookkeeping
/// that needs `&mut` state happens serially after the batch settles.
enum RecordOutcome {
    AlreadyVerified(MatchStatus),
    Submitted(MatchStatus, serde_json::Value),
    Failed(String),
    Inconclusive(String),
}

pub struct Processor<'a, C: Compile> {
    client: &'a ApiClient,
    compiler: &'a C,
    cache: &'a mut VerificationCache,
    store: &'a StateStore,
    options: ProcessorOptions,
    shutdown: Arc<AtomicBool>,
}

impl<'a, C: Compile + Sync> Processor<'a, C> {
    pub fn new(
        client: &'a ApiClient,
        compiler: &'a C,
        cache: &'a mut VerificationCache,
        store: &'a StateStore,
        options: ProcessorOptions,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            client,
            compiler,
            cache,
            store,
            options,
            shutdown,
        }
    }

    /// Processes `records` batch by batch. Per-record failures are logged
    /// and counted; only unwritable state aborts the run.
    ///
    /// # Errors
    ///
    /// Will return `Err` if a state or cache checkpoint can't be written.
    pub async fn process_missing(
        &mut self,
        records: &[ContractRecord],
    ) -> Result<ProcessOutcome, ProcessorError> {
        let mut progress = BatchProgress::new(records.len() as u64);
        self.store.save_processor_progress(&progress)?;

        info!(
            "processing {} missing contracts in batches of {}",
            records.len(),
            self.options.batch_size
        );
        let bar = FileProcessingProgress::new(records.len());

        let mut interrupted = false;
        let mut first_batch = true;

        for batch in records.chunks(self.options.batch_size.max(1)) {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("shutdown requested, stopping before the next batch");
                interrupted = true;
                break;
            }
            if !first_batch {
                tokio::time::sleep(self.options.batch_delay).await;
            }
            first_batch = false;

            // Warm-cache skips cost nothing and don't occupy a batch slot
            let mut pending: Vec<&ContractRecord> = Vec::with_capacity(batch.len());
            for record in batch {
                if self.cache.is_verified(&record.address) {
                    debug!("{}: verified per cache, skipping", record.address);
                    progress.record_processed(&record.address);
                    progress.record_matching();
                    bar.process_file(&record.file_name);
                } else {
                    pending.push(record);
                }
            }

            let client = self.client;
            let compiler = self.compiler;
            let outcomes = join_all(pending.iter().map(|record| async move {
                let outcome = process_record(client, compiler, record).await;
                (*record, outcome)
            }))
            .await;

            let mut submissions: Vec<SubmissionRecord> = Vec::new();
            for (record, outcome) in outcomes {
                progress.record_processed(&record.address);
                bar.process_file(&record.file_name);
                match outcome {
                    RecordOutcome::AlreadyVerified(status) => {
                        debug!("{}: registry already has {status}", record.address);
                        progress.record_matching();
                        self.cache.mark_verified(record.address.clone(), status);
                    }
                    RecordOutcome::Submitted(status, response) => {
                        info!("{}: verified as {status}", record.address);
                        progress.record_success();
                        self.cache.mark_verified(record.address.clone(), status);
                        submissions.push(SubmissionRecord::success(record, response));
                    }
                    RecordOutcome::Failed(error) => {
                        warn!("{}: {error}", record.address);
                        progress.record_failure();
                        submissions.push(SubmissionRecord::failed(record, error));
                    }
                    RecordOutcome::Inconclusive(error) => {
                        // Left for a future run; never logged as a failed submission
                        warn!("{}: inconclusive: {error}", record.address);
                        progress.record_error();
                    }
                }
            }

            progress.rate_limited = self.client.rate_limited_count();
            if !submissions.is_empty() {
                self.store.append_submissions(&submissions)?;
            }
            self.store.save_processor_progress(&progress)?;
            self.cache.save()?;
        }

        bar.finish();
        info!(
            "processing done: {} processed, {} submitted, {} failed, {} matching, {} errors",
            progress.processed,
            progress.successful,
            progress.failed,
            progress.matching,
            progress.errors
        );

        Ok(ProcessOutcome {
            progress,
            interrupted,
        })
    }
}

/// Checks, compiles and submits one contract. Pure with respect to shared
/// state so any number of these can run concurrently.
async fn process_record<C: Compile>(
    client: &ApiClient,
    compiler: &C,
    record: &ContractRecord,
) -> RecordOutcome {
    match client.check_verified(&record.address).await {
        Ok(status) if status.is_verified() => return RecordOutcome::AlreadyVerified(status),
        Ok(_) => {}
        Err(err) => return RecordOutcome::Inconclusive(err.to_string()),
    }

    let (input, license) = compile_input_for(record);

    let compiled = match compiler.compile(&input).await {
        Ok(compiled) => compiled,
        Err(err) => return RecordOutcome::Failed(format!("compilation failed: {err}")),
    };

    // Prefer the compiler's own metadata document; synthesize one only when
    // the toolchain didn't emit any
    let metadata_json = match compiled.metadata {
        Some(metadata) => metadata,
        None => {
            let document = MetadataDocument::single_file(
                &input.file_name,
                &input.contract_name,
                &input.source,
                &license,
                &compiled.compiler_version,
                &input.evm_version,
                input.optimizer.clone(),
            );
            match document.to_json() {
                Ok(json) => json,
                Err(err) => {
                    return RecordOutcome::Failed(format!("metadata serialization failed: {err}"))
                }
            }
        }
    };

    let payload = SubmissionPayload {
        file_name: input.file_name,
        source: input.source,
        metadata_json,
    };
    match client.submit(&record.address, &payload).await {
        Ok(outcome) => RecordOutcome::Submitted(outcome.status, outcome.response),
        Err(err) if err.is_transient() || err.is_rate_limited() => {
            RecordOutcome::Inconclusive(err.to_string())
        }
        Err(err) => RecordOutcome::Failed(err.to_string()),
    }
}

/// Resolves the effective compiler input for a record: SPDX-normalized
/// source, pragma-derived compiler version and the chain's EVM version,
/// unless the record pins either explicitly.
fn compile_input_for(record: &ContractRecord) -> (CompileInput, String) {
    let (normalized, license) = source::ensure_spdx(&record.source);

    let compiler_version = record
        .compiler_version
        .clone()
        .or_else(|| source::pragma_version(&record.source))
        .unwrap_or_else(|| source::DEFAULT_COMPILER_VERSION.to_string());
    let evm_version = record
        .evm_version
        .clone()
        .unwrap_or_else(|| chain::evm_version(record.chain_id).to_string());

    let input = CompileInput {
        file_name: record.file_name.clone(),
        contract_name: record.contract_name.clone(),
        source: normalized,
        compiler_version,
        evm_version,
        optimizer: OptimizerInfo::default(),
    };
    (input, license)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::address::ContractAddress;
    use crate::source::UNLICENSED_HEADER;
    use std::path::PathBuf;

    fn record(source: &str) -> ContractRecord {
        ContractRecord {
            address: ContractAddress::new("0xb47e3cd837ddf8e4c57f05d70ab865de6e193bbb").unwrap(),
            contract_name: "Token".to_string(),
            source_path: PathBuf::from("corpus/00/token.sol"),
            file_name: "token.sol".to_string(),
            source: source.to_string(),
            chain_id: 1,
            compiler_version: None,
            evm_version: None,
        }
    }

    #[test]
    fn test_compile_input_uses_pragma_version() {
        let (input, license) =
            compile_input_for(&record("pragma solidity ^0.8.19;\ncontract Token {}\n"));
        assert_eq!(input.compiler_version, "0.8.19");
        assert_eq!(input.evm_version, "shanghai");
        assert_eq!(license, "UNLICENSED");
        assert!(input.source.starts_with(UNLICENSED_HEADER));
    }

    #[test]
    fn test_compile_input_defaults_without_pragma() {
        let (input, _) = compile_input_for(&record("contract Token {}\n"));
        assert_eq!(input.compiler_version, source::DEFAULT_COMPILER_VERSION);
    }

    #[test]
    fn test_compile_input_keeps_declared_license() {
        let src = "// SPDX-License-Identifier: MIT\npragma solidity 0.8.17;\ncontract Token {}\n";
        let (input, license) = compile_input_for(&record(src));
        assert_eq!(license, "MIT");
        assert_eq!(input.source, src);
    }

    #[test]
    fn test_pinned_versions_win_over_source() {
        let mut rec = record("pragma solidity ^0.8.19;\ncontract Token {}\n");
        rec.compiler_version = Some("0.8.21".to_string());
        rec.evm_version = Some("paris".to_string());
        let (input, _) = compile_input_for(&rec);
        assert_eq!(input.compiler_version, "0.8.21");
        assert_eq!(input.evm_version, "paris");
    }
}
