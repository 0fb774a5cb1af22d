// Soldep - EVM Contract Deployer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Build artifact cache.
//!
//! Compiled contracts are cached on disk keyed by the Keccak-256 hash of the
//! source file contents, so identical source bytes always map to the same
//! cache entry. Coverage and non-coverage builds of the same source are
//! cached under distinct keys.

use std::path::{Path, PathBuf};

use alloy_primitives::keccak256;
use serde::{Deserialize, Serialize};
use soldep_common::{Cache, FsCache};
use thiserror::Error;

use crate::{Contract, StatementLoc};

/// Errors produced by the build cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The requested contract has no cached entry for the current source
    /// bytes.
    #[error("no cached version")]
    NoCache,
    /// The cached entry belongs to a different contract name.
    #[error("cache entry contract name mismatch")]
    NameMismatch,
    /// The source file could not be read for hashing.
    #[error("failed to hash source: {0}")]
    SourceHash(#[from] std::io::Error),
    /// Any other cache failure.
    #[error(transparent)]
    Other(#[from] eyre::Report),
}

/// One cached build, stored as a JSON file per `(contract, source hash)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildCacheEntry {
    #[serde(rename = "codeHash")]
    code_hash: String,
    #[serde(rename = "allPaths")]
    all_paths: Vec<String>,
    #[serde(rename = "contractName")]
    contract_name: String,
    #[serde(rename = "compilerVersion")]
    compiler_version: String,
    coverage: bool,
    statements: Vec<StatementLoc>,
    abi: serde_json::Value,
    bin: String,
}

/// Filesystem cache for compiled contract artifacts.
#[derive(Debug, Clone)]
pub struct BuildCache {
    cache: FsCache<BuildCacheEntry>,
}

impl BuildCache {
    /// Opens (and creates, if needed) a build cache rooted at `prefix`.
    pub fn new(prefix: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let cache = FsCache::new(prefix, None)
            .map_err(|err| CacheError::Other(err.wrap_err("failed to prepare build cache dir")))?;
        Ok(Self { cache })
    }

    /// Stores a compiled contract keyed by the hash of the source file at
    /// `sol_path`.
    pub fn store_contract(
        &self,
        sol_path: impl AsRef<Path>,
        contract: &Contract,
    ) -> Result<(), CacheError> {
        let hash = source_hash(sol_path)?;

        let entry = BuildCacheEntry {
            code_hash: hash.clone(),
            all_paths: contract.all_paths.clone(),
            contract_name: contract.name.clone(),
            compiler_version: contract.compiler_version.clone(),
            coverage: contract.coverage,
            statements: contract.statements.clone(),
            abi: serde_json::from_slice(&contract.abi)
                .map_err(|err| CacheError::Other(err.into()))?,
            bin: contract.bin.clone(),
        };

        self.cache
            .save_cache(entry_label(&contract.name, &hash, contract.coverage), &entry)
            .map_err(|err| CacheError::Other(err.wrap_err("failed to write cache entry file")))
    }

    /// Loads a cached contract for the source file at `sol_path`.
    ///
    /// Returns [`CacheError::NoCache`] when the source bytes have no entry,
    /// which callers treat as "go compile it".
    pub fn load_contract(
        &self,
        sol_path: impl AsRef<Path>,
        contract_name: &str,
        coverage: bool,
    ) -> Result<Contract, CacheError> {
        let sol_path = sol_path.as_ref();
        let hash = source_hash(sol_path)?;

        let entry = self
            .cache
            .load_cache(entry_label(contract_name, &hash, coverage))
            .ok_or(CacheError::NoCache)?;

        if entry.contract_name != contract_name {
            return Err(CacheError::NameMismatch);
        }

        Ok(Contract {
            name: entry.contract_name,
            source_path: sol_path.to_string_lossy().into_owned(),
            all_paths: entry.all_paths,
            compiler_version: entry.compiler_version,
            address: None,
            coverage: entry.coverage,
            statements: entry.statements,
            abi: serde_json::to_vec(&entry.abi).map_err(|err| CacheError::Other(err.into()))?,
            bin: entry.bin,
        })
    }

    /// Removes all cached entries.
    pub fn clear(&self) -> Result<(), CacheError> {
        self.cache.clear().map_err(CacheError::Other)
    }
}

fn entry_label(contract_name: &str, hash: &str, coverage: bool) -> String {
    if coverage {
        format!("sol_{}_{hash}_coverage", contract_name.to_lowercase())
    } else {
        format!("sol_{}_{hash}", contract_name.to_lowercase())
    }
}

fn source_hash(path: impl AsRef<Path>) -> Result<String, std::io::Error> {
    let contents = std::fs::read(path)?;
    Ok(hex::encode(keccak256(&contents)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_contract(coverage: bool) -> Contract {
        Contract {
            name: "Greeter".to_string(),
            source_path: "test.sol".to_string(),
            all_paths: vec!["test.sol".to_string()],
            compiler_version: "0.8.19+commit.7dd6d404".to_string(),
            address: None,
            coverage,
            statements: if coverage { vec![[10, 20, 0]] } else { Vec::new() },
            abi: b"[]".to_vec(),
            bin: "6080604052".to_string(),
        }
    }

    #[test]
    fn test_store_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let sol_path = dir.path().join("test.sol");
        std::fs::write(&sol_path, "contract Greeter {}").unwrap();

        let cache = BuildCache::new(dir.path().join("build")).unwrap();
        let contract = sample_contract(false);
        cache.store_contract(&sol_path, &contract).unwrap();

        let loaded = cache.load_contract(&sol_path, "Greeter", false).unwrap();
        assert_eq!(loaded.name, contract.name);
        assert_eq!(loaded.abi, contract.abi);
        assert_eq!(loaded.bin, contract.bin);
        assert_eq!(loaded.compiler_version, contract.compiler_version);
        assert!(loaded.address.is_none());
    }

    #[test]
    fn test_source_change_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let sol_path = dir.path().join("test.sol");
        std::fs::write(&sol_path, "contract Greeter {}").unwrap();

        let cache = BuildCache::new(dir.path().join("build")).unwrap();
        cache.store_contract(&sol_path, &sample_contract(false)).unwrap();

        // Mutating a single byte of the source must produce a miss.
        std::fs::write(&sol_path, "contract Greeter { }").unwrap();
        let err = cache.load_contract(&sol_path, "Greeter", false).unwrap_err();
        assert!(matches!(err, CacheError::NoCache));
    }

    #[test]
    fn test_coverage_variant_has_distinct_key() {
        let dir = tempfile::tempdir().unwrap();
        let sol_path = dir.path().join("test.sol");
        std::fs::write(&sol_path, "contract Greeter {}").unwrap();

        let cache = BuildCache::new(dir.path().join("build")).unwrap();
        cache.store_contract(&sol_path, &sample_contract(false)).unwrap();

        // The non-coverage entry must not satisfy a coverage lookup.
        let err = cache.load_contract(&sol_path, "Greeter", true).unwrap_err();
        assert!(matches!(err, CacheError::NoCache));

        cache.store_contract(&sol_path, &sample_contract(true)).unwrap();
        let loaded = cache.load_contract(&sol_path, "Greeter", true).unwrap();
        assert!(loaded.coverage);
        assert_eq!(loaded.statements, vec![[10, 20, 0]]);
    }

    #[test]
    fn test_clear_removes_entries() {
        let dir = tempfile::tempdir().unwrap();
        let sol_path = dir.path().join("test.sol");
        std::fs::write(&sol_path, "contract Greeter {}").unwrap();

        let cache = BuildCache::new(dir.path().join("build")).unwrap();
        cache.store_contract(&sol_path, &sample_contract(false)).unwrap();
        cache.clear().unwrap();

        let err = cache.load_contract(&sol_path, "Greeter", false).unwrap_err();
        assert!(matches!(err, CacheError::NoCache));
    }
}
