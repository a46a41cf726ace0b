//! Contract Finder: walks the local corpus, asks the registry which
//! contracts it already knows, and accumulates the missing set. One run per
//! invocation: `INIT → SCANNING(folder)… → FINALIZING → DONE`, with state
//! checkpointed at every folder boundary so a crash loses at most one
//! folder of work.

use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::{
    address::ContractAddress,
    api::{ApiClient, MatchStatus},
    cache::{CacheError, VerificationCache},
    progress::FileProcessingProgress,
    source,
    state::{BatchProgress, ContractRecord, StateError, StateStore},
};

#[derive(Debug, Error)]
pub enum FinderError {
    #[error("Cannot read corpus directory {path}: {source}")]
    Corpus {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// The Finder's entire observable contract with the Processor: the missing
/// set plus the counters describing how it was produced.
#[derive(Debug)]
pub struct ScanOutcome {
    pub progress: BatchProgress,
    pub missing: Vec<ContractRecord>,
}

pub struct Finder<'a> {
    client: &'a ApiClient,
    cache: &'a mut VerificationCache,
    store: &'a StateStore,
}

impl<'a> Finder<'a> {
    pub fn new(
        client: &'a ApiClient,
        cache: &'a mut VerificationCache,
        store: &'a StateStore,
    ) -> Self {
        Self {
            client,
            cache,
            store,
        }
    }

    /// Scans `corpus_root` and returns the contracts the registry doesn't
    /// know about. Per-file problems (unreadable file, bad filename,
    /// inconclusive remote check) are counted and skipped; only an
    /// unreadable corpus or unwritable state aborts the phase.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the corpus root can't be listed or a state
    /// checkpoint can't be written.
    pub async fn scan(&mut self, corpus_root: &Path) -> Result<ScanOutcome, FinderError> {
        let folders = corpus_folders(corpus_root)?;
        let total: usize = folders.iter().map(|(_, files)| files.len()).sum();

        info!(
            "scanning {} source files across {} folders under {}",
            total,
            folders.len(),
            corpus_root.display()
        );

        // INIT: a crash right after start must still leave a readable state file
        let mut progress = BatchProgress::new(total as u64);
        self.store.save_finder_progress(&progress)?;

        let mut missing: Vec<ContractRecord> = Vec::new();
        let bar = FileProcessingProgress::new(total);

        for (folder, files) in &folders {
            debug!("scanning folder {}", folder.display());
            for path in files {
                self.scan_file(path, &mut progress, &mut missing).await;
                bar.process_file(&file_name_of(path));
            }

            // checkpoint at every folder boundary
            progress.rate_limited = self.client.rate_limited_count();
            self.store.save_missing(&missing)?;
            self.store.save_finder_progress(&progress)?;
            self.cache.save()?;
        }

        // FINALIZING
        progress.rate_limited = self.client.rate_limited_count();
        self.store.save_missing(&missing)?;
        self.store.save_finder_progress(&progress)?;
        self.cache.save()?;
        bar.finish();

        info!(
            "scan done: {} processed, {} matching, {} missing, {} errors",
            progress.processed, progress.matching, progress.missing, progress.errors
        );

        Ok(ScanOutcome { progress, missing })
    }

    async fn scan_file(
        &mut self,
        path: &Path,
        progress: &mut BatchProgress,
        missing: &mut Vec<ContractRecord>,
    ) {
        let file_name = file_name_of(path);

        let source_text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                warn!("skipping unreadable file {}: {err}", path.display());
                progress.record_error();
                return;
            }
        };

        // Malformed names never reach the network
        let (address, contract_name) = match source::parse_corpus_file(&file_name, &source_text) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("skipping {}: {err}", path.display());
                progress.record_error();
                return;
            }
        };

        progress.record_processed(&address);

        // Warm-cache fast path: a definitive answer from an earlier run
        // costs no remote call at all
        if let Some(entry) = self.cache.get(&address) {
            if entry.verified {
                debug!("{address}: verified per cache");
                progress.record_matching();
                return;
            }
            if entry.status == Some(MatchStatus::NotFound) {
                debug!("{address}: known missing per cache");
                progress.record_missing();
                missing.push(self.record(path, &file_name, address, contract_name, source_text));
                return;
            }
        }

        match self.client.check_verified(&address).await {
            Ok(status) if status.is_verified() => {
                debug!("{address}: registry reports {status}");
                progress.record_matching();
                self.cache.mark_verified(address, status);
            }
            Ok(status) => {
                debug!("{address}: not in registry");
                progress.record_missing();
                self.cache.mark_verified(address.clone(), status);
                missing.push(self.record(path, &file_name, address, contract_name, source_text));
            }
            Err(err) => {
                // Inconclusive: count it, leave the cache alone, retry on
                // a later run
                warn!("{address}: check failed: {err}");
                progress.record_error();
            }
        }
    }

    fn record(
        &self,
        path: &Path,
        file_name: &str,
        address: ContractAddress,
        contract_name: String,
        source_text: String,
    ) -> ContractRecord {
        ContractRecord {
            address,
            contract_name,
            source_path: path.to_path_buf(),
            file_name: file_name.to_string(),
            source: source_text,
            chain_id: self.client.chain_id(),
            compiler_version: None,
            evm_version: None,
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Lists the corpus as `(folder, sorted .sol files)` pairs, folders sorted
/// for deterministic scan order. Source files directly under the root are
/// treated as one extra folder.
fn corpus_folders(root: &Path) -> Result<Vec<(PathBuf, Vec<PathBuf>)>, FinderError> {
    let entries = fs::read_dir(root).map_err(|source| FinderError::Corpus {
        path: root.to_path_buf(),
        source,
    })?;

    let mut subdirs: Vec<PathBuf> = Vec::new();
    let mut root_files: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| FinderError::Corpus {
            path: root.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if is_sol_file(&path) {
            root_files.push(path);
        }
    }
    subdirs.sort();
    root_files.sort();

    let mut folders = Vec::new();
    if !root_files.is_empty() {
        folders.push((root.to_path_buf(), root_files));
    }
    for dir in subdirs {
        let files = sol_files_in(&dir);
        if !files.is_empty() {
            folders.push((dir, files));
        }
    }
    Ok(folders)
}

fn sol_files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_sol_file(path))
        .collect();
    files.sort();
    files
}

fn is_sol_file(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "sol")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_corpus_folders_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("01")).unwrap();
        fs::create_dir(dir.path().join("00")).unwrap();
        fs::write(
            dir.path().join("01").join("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb.sol"),
            "contract B {}",
        )
        .unwrap();
        fs::write(
            dir.path().join("00").join("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa.sol"),
            "contract A {}",
        )
        .unwrap();
        fs::write(dir.path().join("00").join("README.md"), "not solidity").unwrap();

        let folders = corpus_folders(dir.path()).unwrap();
        assert_eq!(folders.len(), 2);
        assert!(folders[0].0.ends_with("00"));
        assert_eq!(folders[0].1.len(), 1);
        assert!(folders[1].0.ends_with("01"));
    }

    #[test]
    fn test_corpus_root_files_form_a_folder() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("0xcccccccccccccccccccccccccccccccccccccccc.sol"),
            "contract C {}",
        )
        .unwrap();

        let folders = corpus_folders(dir.path()).unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].0, dir.path());
    }

    #[test]
    fn test_missing_corpus_root_is_error() {
        let dir = TempDir::new().unwrap();
        let gone = dir.path().join("nope");
        assert!(matches!(
            corpus_folders(&gone),
            Err(FinderError::Corpus { .. })
        ));
    }
}
