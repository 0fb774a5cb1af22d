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

//! Runtime coverage collection.
//!
//! The collector turns coverage marker events and tagged revert reasons back
//! into per-statement hit counts, keyed by source position. All maps live
//! behind a single read/write lock, so any number of operations may feed the
//! same collector concurrently and reports are consistent snapshots.

use std::{collections::HashMap, fmt, fs};

use alloy_dyn_abi::{DynSolValue, EventExt};
use alloy_json_abi::Event;
use alloy_primitives::LogData;
use parking_lot::RwLock;
use thiserror::Error;

use crate::Contract;

mod mapping;
pub use mapping::FileMapping;

mod report;
pub use report::{FileProfile, ProfileBlock};

/// Marker prepended to the source location inside tagged revert reasons.
pub const COVERAGE_REVERT_TAG: &str = " @coverage";

/// Errors produced by the coverage collector.
#[derive(Debug, Error)]
pub enum CoverageError {
    /// The contract was not compiled with coverage instrumentation.
    #[error("coverage not enabled")]
    NoCoverage,
    /// The contract artifact carries no source file paths.
    #[error("contract doesn't have solidity files paths")]
    NoSourcePaths,
    /// [`CoverageCollector::load_contract`] was never called for this name.
    #[error("contract sources not found: {0}")]
    SourcesNotLoaded(String),
    /// One or more referenced source files could not be read.
    #[error("failed to read contract sources: {}", .0.join("; "))]
    SourcesUnreadable(Vec<String>),
    /// The coverage event payload did not ABI-decode.
    #[error("coverage event ABI unpack error: {0}")]
    EventDecode(#[from] alloy_dyn_abi::Error),
    /// The decoded event payload did not carry the three location fields.
    #[error("coverage event read error")]
    EventShape,
    /// The revert message carries no coverage tag at all.
    #[error("not a @coverage revert message")]
    NotCoverageRevert,
    /// The revert message carries a tag whose location does not parse.
    #[error("@coverage revert message contains wrong location")]
    MalformedLocation,
}

/// How hit counts are rendered in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoverageMode {
    /// Boolean hit/not-hit.
    Set,
    /// Raw hit counts.
    #[default]
    Count,
}

impl fmt::Display for CoverageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => write!(f, "set"),
            Self::Count => write!(f, "count"),
        }
    }
}

/// The unique key coverage counts are indexed by: a line/column span within
/// one source file of one contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatementDescriptor {
    /// Path of the source file.
    pub src_location: String,
    /// Name of the contract the statement belongs to.
    pub contract_name: String,
    /// 1-based start line.
    pub line_start: i64,
    /// 1-based end line.
    pub line_end: i64,
    /// 1-based start column.
    pub col_start: i64,
    /// 1-based end column.
    pub col_end: i64,
}

impl fmt::Display for StatementDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}.{},{}.{}",
            self.src_location, self.line_start, self.col_start, self.line_end, self.col_end
        )
    }
}

#[derive(Debug, Default)]
struct Registry {
    paths: HashMap<String, Vec<String>>,
    src_files: HashMap<String, Vec<FileMapping>>,
    statements: HashMap<StatementDescriptor, u64>,
}

impl Registry {
    fn descriptor(
        &self,
        contract_name: &str,
        start: u64,
        end: u64,
        file: u64,
    ) -> Result<StatementDescriptor, CoverageError> {
        let paths = self
            .paths
            .get(contract_name)
            .ok_or_else(|| CoverageError::SourcesNotLoaded(contract_name.to_string()))?;
        let src_location =
            paths.get(file as usize).ok_or(CoverageError::MalformedLocation)?.clone();
        let mapping = &self.src_files[contract_name][file as usize];

        let (line_start, col_start) = mapping.pos_to_line(start as usize);
        let (line_end, col_end) = mapping.pos_to_line((start + end) as usize);

        Ok(StatementDescriptor {
            src_location,
            contract_name: contract_name.to_string(),
            line_start,
            line_end,
            col_start,
            col_end,
        })
    }
}

/// Aggregates statement hit counts for one or more contracts.
#[derive(Debug)]
pub struct CoverageCollector {
    mode: CoverageMode,
    inner: RwLock<Registry>,
}

impl CoverageCollector {
    /// New collector rendering reports in the given mode.
    pub fn new(mode: CoverageMode) -> Self {
        Self { mode, inner: RwLock::new(Registry::default()) }
    }

    /// The report mode this collector was created with.
    pub fn mode(&self) -> CoverageMode {
        self.mode
    }

    /// Registers a contract's source files, building the byte-offset to
    /// line/column index for each. Idempotent per contract name: a second
    /// call for an already-loaded name is a no-op.
    pub fn load_contract(&self, contract: &Contract) -> Result<(), CoverageError> {
        if !contract.coverage {
            return Err(CoverageError::NoCoverage);
        }
        if contract.all_paths.is_empty() {
            return Err(CoverageError::NoSourcePaths);
        }

        let mut registry = self.inner.write();
        if registry.paths.contains_key(&contract.name) {
            return Ok(());
        }

        let mut mappings = Vec::with_capacity(contract.all_paths.len());
        let mut read_errors = Vec::new();

        for sol_path in &contract.all_paths {
            match fs::read_to_string(sol_path) {
                Ok(text) => mappings.push(FileMapping::from_source(&text)),
                Err(err) => read_errors.push(format!("{sol_path}: {err}")),
            }
        }

        if !read_errors.is_empty() {
            return Err(CoverageError::SourcesUnreadable(read_errors));
        }

        registry.src_files.insert(contract.name.clone(), mappings);
        registry.paths.insert(contract.name.clone(), contract.all_paths.clone());

        Ok(())
    }

    /// Pre-registers a statement with a hit count of zero, so it shows up in
    /// reports even if it is never executed. Two statements with the same
    /// byte range collapse to one descriptor; an existing count is kept.
    pub fn add_statement(
        &self,
        contract_name: &str,
        start: u64,
        end: u64,
        file: u64,
    ) -> Result<(), CoverageError> {
        let mut registry = self.inner.write();
        let descriptor = registry.descriptor(contract_name, start, end, file)?;
        registry.statements.entry(descriptor).or_insert(0);
        Ok(())
    }

    /// Decodes one coverage marker event from a receipt log and increments
    /// the matching statement's count.
    pub fn collect_coverage_event(
        &self,
        contract_name: &str,
        coverage_event_abi: &Event,
        log: &LogData,
    ) -> Result<(), CoverageError> {
        let decoded =
            coverage_event_abi.decode_log_parts(log.topics().iter().copied(), &log.data)?;

        if decoded.body.len() != 3 {
            return Err(CoverageError::EventShape);
        }
        let mut fields = [0u64; 3];
        for (slot, value) in fields.iter_mut().zip(&decoded.body) {
            match value {
                DynSolValue::Uint(n, _) => *slot = n.to::<u64>(),
                _ => return Err(CoverageError::EventShape),
            }
        }
        let [start, end, file] = fields;

        let mut registry = self.inner.write();
        let descriptor = registry.descriptor(contract_name, start, end, file)?;
        *registry.statements.entry(descriptor).or_insert(0) += 1;

        Ok(())
    }

    /// Parses the ` @coverage,<start>,<end>,<file>` suffix out of a revert
    /// message and increments the matching statement's count. The last tag
    /// occurrence wins, which keeps this robust against nested error
    /// wrapping. Negative coordinates mean "no location" and are skipped
    /// silently.
    pub fn collect_coverage_revert(
        &self,
        contract_name: &str,
        message: &str,
    ) -> Result<(), CoverageError> {
        let idx = message.rfind(COVERAGE_REVERT_TAG).ok_or(CoverageError::NotCoverageRevert)?;

        // skip the tag and its trailing comma: @coverage,1,2,3
        let location_start = idx + COVERAGE_REVERT_TAG.len() + 1;
        if location_start > message.len() {
            return Err(CoverageError::MalformedLocation);
        }

        let parts: Vec<&str> = message[location_start..].split(',').collect();
        if parts.len() != 3 {
            return Err(CoverageError::MalformedLocation);
        }

        let mut location = [0i64; 3];
        for (slot, part) in location.iter_mut().zip(&parts) {
            *slot = part.trim().parse().map_err(|_| CoverageError::MalformedLocation)?;
        }
        let [start, end, file] = location;

        if start < 0 || end < 0 || file < 0 {
            return Ok(());
        }

        let mut registry = self.inner.write();
        let descriptor =
            registry.descriptor(contract_name, start as u64, end as u64, file as u64)?;
        *registry.statements.entry(descriptor).or_insert(0) += 1;

        Ok(())
    }
}

/// Whether an error message carries a coverage location tag.
pub fn has_coverage_report(message: &str) -> bool {
    message.contains(COVERAGE_REVERT_TAG)
}

/// Strips the coverage location tag (and everything after it) from a revert
/// message, restoring the user-facing text.
pub fn trim_coverage_report(message: &str) -> &str {
    match message.rfind(COVERAGE_REVERT_TAG) {
        Some(idx) => &message[..idx],
        None => message,
    }
}
