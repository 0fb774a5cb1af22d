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

//! Compiled contract artifacts.

use alloy_json_abi::JsonAbi;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// A single statement source location recorded by the instrumenter:
/// `[start, length, file_index]`, measured in bytes within the file at
/// `Contract::all_paths[file_index]`.
pub type StatementLoc = [i64; 3];

/// A compiled contract, either fresh from the compiler or loaded from the
/// build cache.
///
/// Immutable once compiled, except for [`Contract::address`] which is
/// assigned after deployment (or supplied by the caller when interacting
/// with an already-deployed contract).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    /// Contract name, as reported by the compiler.
    pub name: String,
    /// Canonical path of the source file that defines this contract.
    pub source_path: String,
    /// Ordered list of all source files contributing to the compilation
    /// unit. The index into this list is the "file" component of every
    /// source location produced by the instrumenter.
    pub all_paths: Vec<String>,
    /// Full version string reported by the compiler.
    pub compiler_version: String,
    /// Deployed address, if known.
    pub address: Option<Address>,
    /// Whether this artifact was compiled with coverage instrumentation.
    pub coverage: bool,
    /// Recorded statement locations, present only for coverage builds.
    pub statements: Vec<StatementLoc>,

    /// Raw JSON ABI.
    pub abi: Vec<u8>,
    /// Hex-encoded creation bytecode, without a `0x` prefix.
    pub bin: String,
}

impl Contract {
    /// Parses the raw ABI bytes into an [`JsonAbi`].
    pub fn parse_abi(&self) -> Result<JsonAbi, serde_json::Error> {
        serde_json::from_slice(&self.abi)
    }

    /// Decodes the creation bytecode from its hex representation.
    pub fn bytecode(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(self.bin.trim_start_matches("0x"))
    }
}
