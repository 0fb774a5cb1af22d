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

//! Standard-JSON compiler input, produced by `build` as an auxiliary
//! artifact for source verification tooling.

use std::collections::BTreeMap;

use alloy_primitives::keccak256;
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};

/// EVM target version accepted by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EvmVersion {
    /// EVM version `tangerineWhistle`.
    TangerineWhistle,
    /// EVM version `spuriousDragon`.
    SpuriousDragon,
    /// EVM version `byzantium`.
    Byzantium,
    /// EVM version `constantinople`.
    Constantinople,
    /// EVM version `petersburg`.
    Petersburg,
    /// EVM version `istanbul`.
    Istanbul,
    /// EVM version `berlin`.
    Berlin,
}

/// One source entry: content plus its Keccak-256 content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractContent {
    /// `0x`-prefixed Keccak-256 hash of the content.
    pub keccak256: String,
    /// Full source text.
    pub content: String,
}

/// Optimizer settings of the standard-JSON input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizerSettings {
    /// Whether the optimizer is enabled.
    pub enabled: bool,
    /// Optimizer runs parameter.
    pub runs: u32,
}

/// `settings` block of the standard-JSON input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardJsonSettings {
    /// Import remappings, empty for soldep builds.
    pub remappings: Vec<String>,
    /// Optimizer settings.
    pub optimizer: OptimizerSettings,
    /// EVM target version.
    #[serde(rename = "evmVersion")]
    pub evm_version: EvmVersion,
}

/// The standard-JSON compiler input document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardJsonInput {
    /// Always `"Solidity"`.
    pub language: String,
    /// Sources keyed by workdir-relative path.
    pub sources: BTreeMap<String, ContractContent>,
    /// Compiler settings.
    pub settings: StandardJsonSettings,
}

/// Collects the given source files into a pretty-printed standard-JSON
/// compiler input. Paths under the current workdir are relativized.
pub fn collect_paths_to_standard_json(
    paths: &[String],
    optimizer: bool,
    optimizer_runs: u32,
    evm_version: EvmVersion,
) -> Result<Vec<u8>> {
    let cwd = std::env::current_dir().wrap_err("unable to get current workdir")?;
    let cwd = cwd.to_string_lossy().into_owned();

    let mut sources = BTreeMap::new();
    for src_path in paths {
        let content = std::fs::read_to_string(src_path)
            .wrap_err_with(|| format!("failed to collect Solidity file {src_path}"))?;

        let rel_path = src_path.replacen(&cwd, ".", 1);
        sources.insert(
            rel_path,
            ContractContent {
                keccak256: format!("0x{}", hex::encode(keccak256(content.as_bytes()))),
                content,
            },
        );
    }

    let input = StandardJsonInput {
        language: "Solidity".to_string(),
        sources,
        settings: StandardJsonSettings {
            remappings: Vec::new(),
            optimizer: OptimizerSettings { enabled: optimizer, runs: optimizer_runs },
            evm_version,
        },
    };

    Ok(serde_json::to_vec_pretty(&input)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_evm_version_serializes_camel_case() {
        assert_eq!(
            serde_json::to_string(&EvmVersion::TangerineWhistle).unwrap(),
            "\"tangerineWhistle\""
        );
        assert_eq!(serde_json::to_string(&EvmVersion::Istanbul).unwrap(), "\"istanbul\"");
    }

    #[test]
    fn test_collect_paths() {
        let dir = tempfile::tempdir().unwrap();
        let sol_path = dir.path().join("c.sol");
        let mut file = std::fs::File::create(&sol_path).unwrap();
        file.write_all(b"contract C {}").unwrap();

        let raw = collect_paths_to_standard_json(
            &[sol_path.to_string_lossy().into_owned()],
            true,
            200,
            EvmVersion::Istanbul,
        )
        .unwrap();

        let parsed: StandardJsonInput = serde_json::from_slice(&raw).unwrap();
        assert_eq!(parsed.language, "Solidity");
        assert_eq!(parsed.sources.len(), 1);
        assert!(parsed.settings.optimizer.enabled);
        assert_eq!(parsed.settings.optimizer.runs, 200);

        let entry = parsed.sources.values().next().unwrap();
        assert_eq!(entry.content, "contract C {}");
        assert_eq!(
            entry.keccak256,
            format!("0x{}", hex::encode(keccak256(b"contract C {}")))
        );
    }
}
