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

//! Solidity compiler invocation.
//!
//! Wraps the `solc` binary in combined-JSON mode. A plain build is one
//! compiler pass; a coverage build is two: the first pass only extracts the
//! per-file ASTs, which are instrumented and written to a temporary file,
//! and the second pass re-imports the patched trees (`--import-ast`) to
//! produce coverage-aware bytecode.

use std::{
    collections::HashMap,
    io::Write,
    path::{Path, PathBuf},
    process::Stdio,
};

use foundry_compilers::solc::Solc;
use itertools::Itertools;
use semver::Version;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::{add_coverage_markers, Contract, InstrumentError, StatementLoc};

/// Compilation failures. Fatal to the operation; never retried.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The `solc` binary could not be located or did not verify.
    #[error("unable to locate Solidity compiler: {0}")]
    SolcNotFound(String),
    /// The `solc` process could not be spawned.
    #[error("failed to exec solc: {0}")]
    SolcInvoke(#[from] std::io::Error),
    /// `solc` exited with a failure status.
    #[error("solc failed to compile contract: {stderr}")]
    SolcFailed {
        /// Captured standard error of the compiler run.
        stderr: String,
    },
    /// The combined-JSON output did not parse.
    #[error("failed to unmarshal solc output: {0}")]
    OutputParse(#[from] serde_json::Error),
    /// The output contained no contracts at all.
    #[error("no contracts compiled")]
    NoContracts,
    /// The output contained no source paths.
    #[error("no source paths collected")]
    NoSources,
    /// A contract ID did not carry a `path:Name` shape.
    #[error("found an unnamed contract in output: {0}")]
    UnnamedContract(String),
    /// Coverage builds require one contract per source file.
    #[error("multiple contracts in the same file is not supported with coverage, please refactor {0}")]
    MultipleContractsInFile(String),
    /// A source file's AST was missing from the first pass.
    #[error("no AST collected for source {0}")]
    NoAst(String),
    /// AST instrumentation failed.
    #[error("failed to instrument {path} with coverage markers: {source}")]
    Instrument {
        /// Source file being instrumented.
        path: String,
        /// Underlying instrumentation error.
        source: InstrumentError,
    },
}

#[derive(Debug, Deserialize)]
struct CombinedContract {
    #[serde(default)]
    abi: serde_json::Value,
    #[serde(default)]
    bin: String,
}

#[derive(Debug, Deserialize)]
struct CombinedOutput {
    #[serde(default)]
    contracts: HashMap<String, CombinedContract>,
    #[serde(default)]
    sources: HashMap<String, serde_json::Value>,
    #[serde(default, rename = "sourceList")]
    source_list: Vec<String>,
    #[serde(default)]
    version: String,
}

/// The `solc` wrapper.
#[derive(Debug, Clone)]
pub struct Compiler {
    solc_path: PathBuf,
    version: Version,
    allow_paths: Vec<PathBuf>,
}

impl Compiler {
    /// Wraps and verifies the `solc` binary at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, CompileError> {
        let path = path.into();
        let solc = Solc::new(&path).map_err(|err| CompileError::SolcNotFound(err.to_string()))?;
        Ok(Self { solc_path: path, version: solc.version, allow_paths: Vec::new() })
    }

    /// Locates `solc` on `$PATH`.
    pub fn discover() -> Result<Self, CompileError> {
        let output = std::process::Command::new("which")
            .arg("solc")
            .output()
            .map_err(|_| CompileError::SolcNotFound("solc executable file not found in $PATH".into()))?;
        if !output.status.success() {
            return Err(CompileError::SolcNotFound(
                "solc executable file not found in $PATH".into(),
            ));
        }

        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Self::new(path)
    }

    /// The version reported by the wrapped binary.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Sets the paths `solc` is allowed to read imports from.
    pub fn set_allow_paths(&mut self, paths: Vec<PathBuf>) {
        self.allow_paths = paths;
    }

    fn allow_paths_args(&self) -> Vec<String> {
        if self.allow_paths.is_empty() {
            return Vec::new();
        }
        vec![
            "--allow-paths".to_string(),
            self.allow_paths.iter().map(|p| p.to_string_lossy()).join(","),
        ]
    }

    async fn run_solc(&self, dir: &Path, args: &[String]) -> Result<Vec<u8>, CompileError> {
        debug!("running solc compiler: {} {}", self.solc_path.display(), args.join(" "));

        let output = tokio::process::Command::new(&self.solc_path)
            .current_dir(dir)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(CompileError::SolcFailed {
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(output.stdout)
    }

    /// Compiles `path` (relative to `dir`) and returns every contract of
    /// the compilation unit by name.
    pub async fn compile(
        &self,
        dir: &Path,
        path: &str,
        optimize_runs: u32,
    ) -> Result<HashMap<String, Contract>, CompileError> {
        let mut args = self.allow_paths_args();
        args.extend(["--combined-json".to_string(), "bin,abi,ast".to_string()]);
        args.push(path.to_string());
        if optimize_runs > 0 {
            args.push("--optimize".to_string());
            args.push(format!("--optimize-runs={optimize_runs}"));
        }

        let stdout = self.run_solc(dir, &args).await?;
        let output: CombinedOutput = serde_json::from_slice(&stdout)?;

        if output.contracts.is_empty() {
            return Err(CompileError::NoContracts);
        }
        if output.sources.is_empty() {
            return Err(CompileError::NoSources);
        }

        let ordered = ordered_contract_names(&output)?;
        let all_paths = collect_all_paths(&ordered);

        contracts_from_output(&output, &all_paths, &[], false)
    }

    /// Compiles `path` with coverage instrumentation: extracts the ASTs,
    /// rewrites them with coverage markers, and re-imports the patched
    /// trees to obtain the final bytecode.
    pub async fn compile_with_coverage(
        &self,
        dir: &Path,
        path: &str,
    ) -> Result<HashMap<String, Contract>, CompileError> {
        let mut args = self.allow_paths_args();
        args.extend([
            "--optimize".to_string(),
            "--combined-json".to_string(),
            "ast".to_string(),
            path.to_string(),
        ]);

        let stdout = self.run_solc(dir, &args).await?;
        let output: CombinedOutput = serde_json::from_slice(&stdout)?;

        if output.contracts.is_empty() {
            return Err(CompileError::NoContracts);
        }
        if output.sources.is_empty() {
            return Err(CompileError::NoSources);
        }

        let ordered = ordered_contract_names(&output)?;

        // Patch every source AST in place within the combined output.
        let mut patched: serde_json::Value = serde_json::from_slice(&stdout)?;
        let mut all_paths = Vec::new();
        let mut statements: Vec<StatementLoc> = Vec::new();

        for (file_idx, entry) in ordered.iter().enumerate() {
            let Some((name, file_path)) = entry else {
                trace!(index = file_idx, "source file without a contract, skipping");
                continue;
            };

            if all_paths.contains(file_path) {
                return Err(CompileError::MultipleContractsInFile(file_path.clone()));
            }

            let ast = patched
                .get("sources")
                .and_then(|sources| sources.get(file_path))
                .and_then(|source| source.get("AST"))
                .cloned()
                .ok_or_else(|| CompileError::NoAst(file_path.clone()))?;

            let (instrumented, recorded) =
                add_coverage_markers(file_idx, name, &ast).map_err(|source| {
                    CompileError::Instrument { path: file_path.clone(), source }
                })?;

            patched["sources"][file_path.as_str()]["AST"] = instrumented;
            all_paths.push(file_path.clone());
            statements.extend(recorded);
        }

        // Stage the patched trees and re-import them for the final pass.
        let mut staged = tempfile::Builder::new().suffix("_sol_coverage.json").tempfile()?;
        staged.write_all(&serde_json::to_vec(&patched)?)?;
        staged.flush()?;

        let args = vec![
            "--import-ast".to_string(),
            "--optimize".to_string(),
            "--combined-json".to_string(),
            "bin,abi".to_string(),
            staged.path().to_string_lossy().into_owned(),
        ];

        let stdout = self.run_solc(dir, &args).await?;
        let final_output: CombinedOutput = serde_json::from_slice(&stdout)?;

        if final_output.contracts.is_empty() {
            return Err(CompileError::NoContracts);
        }

        contracts_from_output(&final_output, &all_paths, &statements, true)
    }
}

/// Splits a combined-JSON contract ID (`path:Name`) into name and path.
fn split_contract_id(id: &str) -> Result<(String, String), CompileError> {
    let Some((path, name)) = id.rsplit_once(':') else {
        return Err(CompileError::UnnamedContract(id.to_string()));
    };
    Ok((name.to_string(), path.to_string()))
}

/// Orders the compilation unit's contracts by their file's position in the
/// source list. Files without a contract yield `None` slots.
fn ordered_contract_names(
    output: &CombinedOutput,
) -> Result<Vec<Option<(String, String)>>, CompileError> {
    let mut paths_by_name = HashMap::new();
    for id in output.contracts.keys() {
        let (name, source_path) = split_contract_id(id)?;
        paths_by_name.insert(name, source_path);
    }

    let mut ordered: Vec<Option<(String, String)>> = vec![None; output.source_list.len()];
    for (name, source_path) in paths_by_name {
        if let Some(idx) = output.source_list.iter().position(|src| src == &source_path) {
            ordered[idx] = Some((name, source_path));
        }
    }

    Ok(ordered)
}

/// The ordered, deduplicated source paths of the compilation unit.
fn collect_all_paths(ordered: &[Option<(String, String)>]) -> Vec<String> {
    let mut all_paths = Vec::new();
    for (_, path) in ordered.iter().flatten() {
        if !all_paths.contains(path) {
            all_paths.push(path.clone());
        }
    }
    all_paths
}

/// Assembles [`Contract`] artifacts out of a combined-JSON output.
fn contracts_from_output(
    output: &CombinedOutput,
    all_paths: &[String],
    statements: &[StatementLoc],
    coverage: bool,
) -> Result<HashMap<String, Contract>, CompileError> {
    let mut contracts = HashMap::with_capacity(output.contracts.len());

    for (id, compiled) in &output.contracts {
        let (name, source_path) = split_contract_id(id)?;

        // Older compilers emit the ABI as a JSON-encoded string.
        let abi = match &compiled.abi {
            serde_json::Value::String(raw) => raw.clone().into_bytes(),
            value => serde_json::to_vec(value)?,
        };

        contracts.insert(
            name.clone(),
            Contract {
                name,
                source_path,
                all_paths: all_paths.to_vec(),
                compiler_version: output.version.clone(),
                address: None,
                coverage,
                statements: statements.to_vec(),
                abi,
                bin: compiled.bin.clone(),
            },
        );
    }

    Ok(contracts)
}
