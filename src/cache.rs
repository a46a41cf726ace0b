use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::address::ContractAddress;
use crate::api::MatchStatus;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to access cache file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize cache: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Per-address memo of the last known remote verification state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub verified: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MatchStatus>,
}

/// JSON-file-backed address → [`CacheEntry`] map. An entry with
/// `verified == true` exempts its address from any further remote check
/// until the cache is explicitly cleared.
#[derive(Debug)]
pub struct VerificationCache {
    path: PathBuf,
    entries: HashMap<ContractAddress, CacheEntry>,
}

impl VerificationCache {
    /// Loads the cache from `path`. A missing backing file is a first run,
    /// not an error; a present-but-unreadable one is fatal.
    ///
    /// # Errors
    ///
    /// Will return `Err` on I/O failure other than not-found, or on a
    /// corrupt backing file.
    pub fn load(path: PathBuf) -> Result<Self, CacheError> {
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| CacheError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no verification cache at {}, starting empty", path.display());
                HashMap::new()
            }
            Err(err) => return Err(CacheError::Io(err)),
        };

        Ok(Self { path, entries })
    }

    /// Full overwrite of the backing store; last writer wins. All writers
    /// run through a single in-process pipeline, so this is sufficient.
    ///
    /// # Errors
    ///
    /// Will return `Err` on I/O or serialization failure.
    pub fn save(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }

    /// Drops all entries and removes the backing file.
    ///
    /// # Errors
    ///
    /// Will return `Err` on I/O failure other than not-found.
    pub fn clear(&mut self) -> Result<(), CacheError> {
        self.entries.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CacheError::Io(err)),
        }
    }

    pub fn mark_verified(&mut self, address: ContractAddress, status: MatchStatus) {
        self.entries.insert(
            address,
            CacheEntry {
                verified: status.is_verified(),
                timestamp: Utc::now(),
                status: Some(status),
            },
        );
    }

    /// Pure lookup; the first filter applied before any component considers
    /// an address.
    pub fn is_verified(&self, address: &ContractAddress) -> bool {
        self.entries
            .get(address)
            .map(|entry| entry.verified)
            .unwrap_or(false)
    }

    pub fn get(&self, address: &ContractAddress) -> Option<&CacheEntry> {
        self.entries.get(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn address(last: char) -> ContractAddress {
        let raw: String = "0x".chars()
            .chain(std::iter::repeat(last).take(40))
            .collect();
        ContractAddress::new(&raw).unwrap()
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache = VerificationCache::load(dir.path().join("verification_cache.json")).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("verification_cache.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            VerificationCache::load(path),
            Err(CacheError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_mark_verified_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("verification_cache.json");

        let mut cache = VerificationCache::load(path.clone()).unwrap();
        cache.mark_verified(address('a'), MatchStatus::FullMatch);
        cache.save().unwrap();

        let reloaded = VerificationCache::load(path).unwrap();
        assert!(reloaded.is_verified(&address('a')));
        assert!(!reloaded.is_verified(&address('b')));
        assert_eq!(
            reloaded.get(&address('a')).unwrap().status,
            Some(MatchStatus::FullMatch)
        );
    }

    #[test]
    fn test_not_found_entry_is_not_verified() {
        let dir = TempDir::new().unwrap();
        let mut cache =
            VerificationCache::load(dir.path().join("verification_cache.json")).unwrap();
        cache.mark_verified(address('c'), MatchStatus::NotFound);
        assert!(!cache.is_verified(&address('c')));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear_removes_file_and_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("verification_cache.json");

        let mut cache = VerificationCache::load(path.clone()).unwrap();
        cache.mark_verified(address('a'), MatchStatus::PartialMatch);
        cache.save().unwrap();
        assert!(path.exists());

        cache.clear().unwrap();
        assert!(cache.is_empty());
        assert!(!path.exists());
        // clearing twice is fine
        cache.clear().unwrap();
    }
}
