//! Persisted pipeline state: the missing-contract set handed from the
//! Finder to the Processor, progress snapshots, and the append-only
//! submission log. One directory per chain namespace; every file is plain
//! JSON so a human can review discovery output before enabling submission.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::address::ContractAddress;

const MISSING_CONTRACTS: &str = "missing_contracts.json";
const MISSING_CONTRACTS_BACKUP: &str = "missing_contracts.backup.json";
const CONTRACT_STATS: &str = "contract_stats.json";
const PROCESSING_STATS: &str = "processing_stats.json";
const SUBMITTED_CONTRACTS: &str = "submitted_contracts.json";
const SUBMISSION_STATS: &str = "submission_stats.json";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to access state file: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("No missing-contract set at {0}. Run the find phase first")]
    MissingSet(PathBuf),
}

/// One discovered local contract, carrying everything the Processor needs
/// to recompile and submit without touching the corpus again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractRecord {
    pub address: ContractAddress,
    pub contract_name: String,
    pub source_path: PathBuf,
    pub file_name: String,
    /// Raw source text; mutated only by SPDX-header normalization.
    pub source: String,
    pub chain_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evm_version: Option<String>,
}

/// Run-time counters for one Finder or Processor invocation. Persisted
/// after every folder/batch so a crash loses at most one batch of work.
///
/// Every processed record lands in exactly one bucket, so
/// `successful + failed + matching + errors == processed` holds at every
/// checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProgress {
    pub total: u64,
    pub processed: u64,
    pub missing: u64,
    pub matching: u64,
    pub errors: u64,
    pub successful: u64,
    pub failed: u64,
    pub rate_limited: u64,
    pub start_time: DateTime<Utc>,
    pub last_processed: Option<String>,
}

impl BatchProgress {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            processed: 0,
            missing: 0,
            matching: 0,
            errors: 0,
            successful: 0,
            failed: 0,
            rate_limited: 0,
            start_time: Utc::now(),
            last_processed: None,
        }
    }

    pub fn record_processed(&mut self, address: &ContractAddress) {
        self.processed += 1;
        self.last_processed = Some(address.to_string());
    }

    pub fn record_missing(&mut self) {
        self.missing += 1;
    }

    pub fn record_matching(&mut self) {
        self.matching += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn record_success(&mut self) {
        self.successful += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Success,
    Failed,
}

/// Append-only record of one submission attempt; never mutated after write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub address: ContractAddress,
    pub contract_name: String,
    pub file_name: String,
    pub timestamp: DateTime<Utc>,
    pub status: SubmissionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
}

impl SubmissionRecord {
    pub fn success(record: &ContractRecord, response: serde_json::Value) -> Self {
        Self {
            address: record.address.clone(),
            contract_name: record.contract_name.clone(),
            file_name: record.file_name.clone(),
            timestamp: Utc::now(),
            status: SubmissionStatus::Success,
            error: None,
            response: Some(response),
        }
    }

    pub fn failed(record: &ContractRecord, error: impl Into<String>) -> Self {
        Self {
            address: record.address.clone(),
            contract_name: record.contract_name.clone(),
            file_name: record.file_name.clone(),
            timestamp: Utc::now(),
            status: SubmissionStatus::Failed,
            error: Some(error.into()),
            response: None,
        }
    }
}

/// Aggregate counts maintained alongside the submission log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
}

/// Storage port for all per-chain pipeline state.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(data_dir: &Path, chain_id: u64) -> Self {
        Self {
            dir: data_dir.join(chain_id.to_string()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn missing_contracts_path(&self) -> PathBuf {
        self.dir.join(MISSING_CONTRACTS)
    }

    pub fn verification_cache_path(&self) -> PathBuf {
        self.dir.join("verification_cache.json")
    }

    pub fn contract_stats_path(&self) -> PathBuf {
        self.dir.join(CONTRACT_STATS)
    }

    pub fn processing_stats_path(&self) -> PathBuf {
        self.dir.join(PROCESSING_STATS)
    }

    pub fn submitted_contracts_path(&self) -> PathBuf {
        self.dir.join(SUBMITTED_CONTRACTS)
    }

    pub fn submission_stats_path(&self) -> PathBuf {
        self.dir.join(SUBMISSION_STATS)
    }

    /// # Errors
    ///
    /// Will return `Err` if the state directory can't be created.
    pub fn ensure_dir(&self) -> Result<(), StateError> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Writes the missing-contract set, keeping a backup of the previous
    /// file so a crash mid-write never loses the only copy.
    ///
    /// # Errors
    ///
    /// Will return `Err` on I/O or serialization failure.
    pub fn save_missing(&self, records: &[ContractRecord]) -> Result<(), StateError> {
        self.ensure_dir()?;
        let path = self.missing_contracts_path();
        if path.exists() {
            fs::copy(&path, self.dir.join(MISSING_CONTRACTS_BACKUP))?;
        }
        self.write_json(&path, records)
    }

    /// # Errors
    ///
    /// Will return `Err` if no missing-contract set exists, or the file is
    /// corrupt.
    pub fn load_missing(&self) -> Result<Vec<ContractRecord>, StateError> {
        let path = self.missing_contracts_path();
        match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| StateError::Corrupt {
                path,
                source,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StateError::MissingSet(path))
            }
            Err(err) => Err(StateError::Io(err)),
        }
    }

    /// # Errors
    ///
    /// Will return `Err` on I/O or serialization failure.
    pub fn save_finder_progress(&self, progress: &BatchProgress) -> Result<(), StateError> {
        self.ensure_dir()?;
        self.write_json(&self.contract_stats_path(), progress)
    }

    /// # Errors
    ///
    /// Will return `Err` on I/O or serialization failure.
    pub fn save_processor_progress(&self, progress: &BatchProgress) -> Result<(), StateError> {
        self.ensure_dir()?;
        self.write_json(&self.processing_stats_path(), progress)
    }

    /// # Errors
    ///
    /// Will return `Err` on I/O failure or a corrupt snapshot.
    pub fn load_processor_progress(&self) -> Result<Option<BatchProgress>, StateError> {
        self.read_json_opt(&self.processing_stats_path())
    }

    /// # Errors
    ///
    /// Will return `Err` on I/O failure or a corrupt snapshot.
    pub fn load_finder_progress(&self) -> Result<Option<BatchProgress>, StateError> {
        self.read_json_opt(&self.contract_stats_path())
    }

    /// Appends to the submission log and refreshes the aggregate stats
    /// file. Existing entries are never rewritten.
    ///
    /// # Errors
    ///
    /// Will return `Err` on I/O failure or a corrupt log file.
    pub fn append_submissions(&self, new_records: &[SubmissionRecord]) -> Result<(), StateError> {
        self.ensure_dir()?;
        let mut log: Vec<SubmissionRecord> = self
            .read_json_opt(&self.submitted_contracts_path())?
            .unwrap_or_default();
        log.extend(new_records.iter().cloned());

        let stats = SubmissionStats {
            total: log.len() as u64,
            successful: log
                .iter()
                .filter(|r| r.status == SubmissionStatus::Success)
                .count() as u64,
            failed: log
                .iter()
                .filter(|r| r.status == SubmissionStatus::Failed)
                .count() as u64,
        };

        self.write_json(&self.submitted_contracts_path(), &log)?;
        self.write_json(&self.submission_stats_path(), &stats)
    }

    /// # Errors
    ///
    /// Will return `Err` on I/O failure or a corrupt log file.
    pub fn load_submissions(&self) -> Result<Vec<SubmissionRecord>, StateError> {
        Ok(self
            .read_json_opt(&self.submitted_contracts_path())?
            .unwrap_or_default())
    }

    /// # Errors
    ///
    /// Will return `Err` on I/O failure or a corrupt stats file.
    pub fn load_submission_stats(&self) -> Result<Option<SubmissionStats>, StateError> {
        self.read_json_opt(&self.submission_stats_path())
    }

    fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), StateError> {
        let raw = serde_json::to_string_pretty(value)?;
        fs::write(path, raw)?;
        debug!("saved {}", path.display());
        Ok(())
    }

    fn read_json_opt<T: serde::de::DeserializeOwned>(
        &self,
        path: &Path,
    ) -> Result<Option<T>, StateError> {
        match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StateError::Corrupt {
                    path: path.to_path_buf(),
                    source,
                }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StateError::Io(err)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(last: char) -> ContractRecord {
        let raw: String = "0x".chars()
            .chain(std::iter::repeat(last).take(40))
            .collect();
        ContractRecord {
            address: ContractAddress::new(&raw).unwrap(),
            contract_name: "Token".to_string(),
            source_path: PathBuf::from("corpus/00/test.sol"),
            file_name: "test.sol".to_string(),
            source: "contract Token {}".to_string(),
            chain_id: 1,
            compiler_version: None,
            evm_version: None,
        }
    }

    #[test]
    fn test_missing_set_roundtrip_and_backup() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path(), 1);

        assert!(matches!(
            store.load_missing(),
            Err(StateError::MissingSet(_))
        ));

        store.save_missing(&[record('a')]).unwrap();
        assert!(!store.dir().join(MISSING_CONTRACTS_BACKUP).exists());

        store.save_missing(&[record('a'), record('b')]).unwrap();
        let backup_path = store.dir().join(MISSING_CONTRACTS_BACKUP);
        assert!(backup_path.exists());

        let loaded = store.load_missing().unwrap();
        assert_eq!(loaded.len(), 2);

        // backup holds the previous generation
        let backup: Vec<ContractRecord> =
            serde_json::from_str(&fs::read_to_string(backup_path).unwrap()).unwrap();
        assert_eq!(backup.len(), 1);
    }

    #[test]
    fn test_progress_snapshots() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path(), 1);

        let mut progress = BatchProgress::new(10);
        progress.record_processed(&record('a').address);
        progress.record_missing();
        store.save_finder_progress(&progress).unwrap();
        store.save_processor_progress(&progress).unwrap();

        let finder = store.load_finder_progress().unwrap().unwrap();
        assert_eq!(finder.total, 10);
        assert_eq!(finder.processed, 1);
        assert_eq!(finder.missing, 1);
        assert_eq!(
            finder.last_processed.as_deref(),
            Some("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
        );

        assert!(store.load_processor_progress().unwrap().is_some());
    }

    #[test]
    fn test_submission_log_appends_and_aggregates() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path(), 1);

        store
            .append_submissions(&[SubmissionRecord::success(
                &record('a'),
                serde_json::json!({"status": "perfect"}),
            )])
            .unwrap();
        store
            .append_submissions(&[SubmissionRecord::failed(&record('b'), "compilation failed")])
            .unwrap();

        let log = store.load_submissions().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].status, SubmissionStatus::Success);
        assert_eq!(log[1].error.as_deref(), Some("compilation failed"));

        let stats = store.load_submission_stats().unwrap().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_per_chain_namespacing() {
        let dir = TempDir::new().unwrap();
        let mainnet = StateStore::new(dir.path(), 1);
        let sepolia = StateStore::new(dir.path(), 11155111);

        mainnet.save_missing(&[record('a')]).unwrap();
        assert!(matches!(
            sepolia.load_missing(),
            Err(StateError::MissingSet(_))
        ));
    }
}
