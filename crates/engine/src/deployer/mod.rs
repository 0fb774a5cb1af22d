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

//! Transaction lifecycle orchestration.
//!
//! The [`Deployer`] binds compilation, the build cache, the signer seam and
//! the coverage collector together: it resolves artifacts, dials the RPC
//! endpoint exactly once, resolves nonce and gas, signs and submits raw
//! transactions, awaits confirmations, decodes revert reasons and feeds the
//! coverage collector from receipts.
//!
//! Each operation (`build`, `deploy`, `tx`, `call`, `logs`) is a single
//! flow; operations may run concurrently against the same endpoint. Nonce
//! resolution uses the pending nonce per call, so concurrent submissions
//! from one sender may race. This is an accepted limitation of a single-shot
//! CLI tool, not a guarantee.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_primitives::{Address, Bytes, TxHash};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types::{BlockId, TransactionReceipt, TransactionRequest};
use alloy_transport::TransportError;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::{cache::CacheError, BuildCache, Compiler, Contract};

mod args;
pub use args::*;

mod build;

mod call;
pub use call::*;

mod deploy;
pub use deploy::*;

mod logs;
pub use logs::*;

mod probe;
pub use probe::*;

mod signer;
pub use signer::*;

mod tx;
pub use tx::*;

mod util;
pub use util::sol_value_to_json;
pub(crate) use util::*;

/// Failure taxonomy of the transaction orchestrator.
#[derive(Debug, Error)]
pub enum DeployerError {
    /// The RPC endpoint could not be dialed.
    #[error("unable to dial EVM RPC endpoint")]
    EndpointUnreachable,
    /// `solc` could not be located or verified.
    #[error("unable to locate Solidity compiler")]
    CompilerNotFound,
    /// The chain ID query failed.
    #[error("failed to get valid Chain ID")]
    NoChainId,
    /// The pending nonce query failed.
    #[error("failed to get latest from nonce")]
    NoNonce,
    /// Compilation failed; details are in the logs.
    #[error("failed to compile contract code")]
    CompilationFailed,
    /// The requested method does not exist in the contract ABI.
    #[error("method not found: {0}")]
    MethodNotFound(String),
    /// A receipt log did not decode as the requested event.
    #[error("unable to unmarshal log")]
    EventParse,
    /// No receipt exists for the transaction hash.
    #[error("transaction not found")]
    TxNotFound,
    /// The transaction was mined with status 0. A distinct, expected
    /// outcome, not a transport fault.
    #[error("transaction reverted: {}", reason.as_deref().unwrap_or("no reason given"))]
    Reverted {
        /// Hash of the reverted transaction, when one was submitted.
        tx_hash: Option<TxHash>,
        /// Block the transaction was mined in, when known.
        block_number: Option<u64>,
        /// Decoded `Error(string)` revert reason, coverage tag stripped.
        reason: Option<String>,
    },
    /// The caller-supplied await deadline expired before a receipt showed
    /// up.
    #[error("await timeout")]
    AwaitTimeout {
        /// Hash of the transaction that was being awaited.
        tx_hash: TxHash,
    },
    /// Coverage was not enabled in the deployer options.
    #[error("coverage not enabled")]
    NoCoverage,
    /// The target contract was not compiled with coverage instrumentation.
    #[error("coverage not compiled into the contract")]
    NoCoverageInContract,
    /// A reverted call returned no decodable `Error(string)` payload.
    #[error("no revert reason")]
    NoRevertReason,
    /// The transaction targets an address without code.
    #[error("no contract code at {0}")]
    NoContractCode(Address),
    /// No signer was supplied for an operation that must sign.
    #[error("no signer available to authorize the transaction")]
    MissingSigner,
    /// Rejected deployer configuration.
    #[error("invalid deployer options: {0}")]
    InvalidOptions(String),
    /// Signing failure; no partial submission occurred.
    #[error(transparent)]
    Signer(#[from] SignerError),
    /// Argument mapping failure.
    #[error(transparent)]
    Args(#[from] ArgError),
    /// ABI encode/decode failure.
    #[error("ABI error: {0}")]
    Abi(#[from] alloy_dyn_abi::Error),
    /// The contract artifact carries an unparsable ABI.
    #[error("failed to parse contract ABI: {0}")]
    BadAbi(#[from] serde_json::Error),
    /// The contract artifact carries unparsable bytecode.
    #[error("failed to decode contract bytecode: {0}")]
    BadBytecode(#[from] hex::FromHexError),
    /// Pass-through RPC error.
    #[error("RPC error: {0}")]
    Rpc(#[from] TransportError),
}

/// Signature scheme selection for the raw-key signer backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignerScheme {
    /// EIP-155 replay-protected signatures (the default).
    #[default]
    Eip155,
    /// Legacy Homestead signatures without a chain ID.
    Homestead,
}

impl std::str::FromStr for SignerScheme {
    type Err = DeployerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eip155" => Ok(Self::Eip155),
            "homestead" => Ok(Self::Homestead),
            other => Err(DeployerError::InvalidOptions(format!("unsupported signer type: {other}"))),
        }
    }
}

/// Explicit deployer configuration. One instance is passed into
/// [`Deployer::new`]; there is no process-wide state.
#[derive(Debug, Clone)]
pub struct DeployerOptions {
    /// Overall timeout of a single RPC request.
    pub rpc_timeout: Duration,
    /// Overall timeout of a transaction, including confirmation await.
    pub tx_timeout: Duration,
    /// Overall timeout of an EVM call.
    pub call_timeout: Duration,
    /// Signature scheme used by the raw-key signer backend.
    pub signer_scheme: SignerScheme,
    /// Gas price override; `None` asks the node for a suggestion.
    pub gas_price: Option<u128>,
    /// Gas limit override; `None` estimates via `eth_estimateGas`.
    pub gas_limit: Option<u64>,
    /// JSON-RPC endpoint of the EVM node.
    pub evm_rpc_endpoint: String,
    /// Disables the build cache completely.
    pub no_cache: bool,
    /// Directory for build artifacts.
    pub build_cache_dir: PathBuf,
    /// Explicit `solc` path; `None` discovers it on `$PATH`.
    pub solc_path: Option<PathBuf>,
    /// Compile with coverage instrumentation and collect coverage data.
    pub enable_coverage: bool,
    /// Extra paths `solc` is allowed to read imports from.
    pub solc_allowed_paths: Vec<PathBuf>,
}

impl Default for DeployerOptions {
    fn default() -> Self {
        Self {
            rpc_timeout: Duration::from_secs(10),
            tx_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(10),
            signer_scheme: SignerScheme::Eip155,
            gas_price: None,
            gas_limit: None,
            evm_rpc_endpoint: "http://localhost:8545".to_string(),
            no_cache: false,
            build_cache_dir: PathBuf::from("build"),
            solc_path: None,
            enable_coverage: false,
            solc_allowed_paths: Vec::new(),
        }
    }
}

impl DeployerOptions {
    fn validate(&self) -> Result<(), DeployerError> {
        if self.evm_rpc_endpoint.is_empty() {
            return Err(DeployerError::InvalidOptions("empty EVM RPC endpoint".into()));
        }
        if self.build_cache_dir.as_os_str().is_empty() {
            return Err(DeployerError::InvalidOptions("empty build cache dir provided".into()));
        }
        if let Some(gas_limit) = self.gas_limit {
            if gas_limit < 21_000 {
                return Err(DeployerError::InvalidOptions("gas limit too low".into()));
            }
        }
        Ok(())
    }
}

/// A thin RPC client wrapper that applies the configured per-request
/// timeout and maps failures into the orchestrator's error taxonomy.
#[derive(Debug)]
pub struct Client {
    provider: DynProvider,
    rpc_timeout: Duration,
    call_timeout: Duration,
}

impl Client {
    /// Chain ID of the connected node.
    pub async fn chain_id(&self) -> Result<u64, DeployerError> {
        tokio::time::timeout(self.rpc_timeout, self.provider.get_chain_id())
            .await
            .map_err(|_| DeployerError::NoChainId)?
            .map_err(|err| {
                error!("failed to get valid chain ID: {err}");
                DeployerError::NoChainId
            })
    }

    /// Pending-state nonce of `from`.
    pub async fn pending_nonce(&self, from: Address) -> Result<u64, DeployerError> {
        tokio::time::timeout(self.rpc_timeout, self.provider.get_transaction_count(from).pending())
            .await
            .map_err(|_| DeployerError::NoNonce)?
            .map_err(|err| {
                error!(from = %from, "failed to get most recent nonce: {err}");
                DeployerError::NoNonce
            })
    }

    /// Node-suggested gas price.
    pub async fn suggest_gas_price(&self) -> Result<u128, DeployerError> {
        Ok(tokio::time::timeout(self.rpc_timeout, self.provider.get_gas_price())
            .await
            .map_err(|_| DeployerError::EndpointUnreachable)??)
    }

    /// Gas estimate for the given request.
    pub async fn estimate_gas(&self, request: TransactionRequest) -> Result<u64, DeployerError> {
        Ok(tokio::time::timeout(self.rpc_timeout, self.provider.estimate_gas(request))
            .await
            .map_err(|_| DeployerError::EndpointUnreachable)??)
    }

    /// Code at `address` in the pending state.
    pub async fn pending_code_at(&self, address: Address) -> Result<Bytes, DeployerError> {
        Ok(tokio::time::timeout(self.rpc_timeout, self.provider.get_code_at(address).pending())
            .await
            .map_err(|_| DeployerError::EndpointUnreachable)??)
    }

    /// Executes a read-only call, optionally pinned at a block.
    pub async fn call(
        &self,
        request: TransactionRequest,
        block: Option<BlockId>,
    ) -> Result<Bytes, DeployerError> {
        let call = self.provider.call(request);
        let call = match block {
            Some(block) => call.block(block),
            None => call,
        };
        Ok(tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| DeployerError::EndpointUnreachable)??)
    }

    /// Submits a raw signed transaction and returns the node-reported hash.
    ///
    /// The raw RLP bytes are submitted directly (rather than through any
    /// higher-level path) so the canonical hash the node assigns is always
    /// captured, even if a later step of the operation fails.
    pub async fn send_raw_transaction(&self, encoded: &[u8]) -> Result<TxHash, DeployerError> {
        let pending =
            tokio::time::timeout(self.rpc_timeout, self.provider.send_raw_transaction(encoded))
                .await
                .map_err(|_| DeployerError::EndpointUnreachable)??;
        Ok(*pending.tx_hash())
    }

    /// Receipt for `tx_hash`, `None` while the transaction is unmined.
    pub async fn transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, DeployerError> {
        Ok(tokio::time::timeout(self.rpc_timeout, self.provider.get_transaction_receipt(tx_hash))
            .await
            .map_err(|_| DeployerError::EndpointUnreachable)??)
    }
}

/// The transaction lifecycle orchestrator.
#[derive(Debug)]
pub struct Deployer {
    options: DeployerOptions,
    compiler: Compiler,
    client: OnceCell<Client>,
}

impl Deployer {
    /// Creates a deployer from explicit options, locating and verifying the
    /// Solidity compiler up front.
    pub fn new(options: DeployerOptions) -> Result<Self, DeployerError> {
        options.validate()?;

        let mut compiler = match &options.solc_path {
            Some(path) => Compiler::new(path).map_err(|err| {
                error!(path = %path.display(), "failed to find solc compiler at path: {err}");
                DeployerError::CompilerNotFound
            })?,
            None => Compiler::discover().map_err(|err| {
                error!("failed to find solc compiler: {err}");
                DeployerError::CompilerNotFound
            })?,
        };

        let allow_paths = options
            .solc_allowed_paths
            .iter()
            .map(|p| std::fs::canonicalize(p).unwrap_or_else(|_| p.clone()))
            .collect();
        compiler.set_allow_paths(allow_paths);

        Ok(Self { options, compiler, client: OnceCell::new() })
    }

    /// The options this deployer was created with.
    pub fn options(&self) -> &DeployerOptions {
        &self.options
    }

    /// The RPC backend, dialed lazily on first use.
    ///
    /// Concurrent first uses share a single dial attempt. A failed dial is
    /// not cached: the next call retries.
    pub async fn backend(&self) -> Result<&Client, DeployerError> {
        self.client
            .get_or_try_init(|| async {
                let endpoint = self.options.evm_rpc_endpoint.clone();
                let connect = ProviderBuilder::new().connect(&endpoint);
                let provider = tokio::time::timeout(self.options.rpc_timeout, connect)
                    .await
                    .map_err(|_| DeployerError::EndpointUnreachable)?
                    .map_err(|err| {
                        error!("failed to dial EVM RPC endpoint: {err}");
                        DeployerError::EndpointUnreachable
                    })?;

                debug!(endpoint = %endpoint, "connected to EVM RPC endpoint");
                Ok(Client {
                    provider: provider.erased(),
                    rpc_timeout: self.options.rpc_timeout,
                    call_timeout: self.options.call_timeout,
                })
            })
            .await
    }

    /// Resolves a contract artifact: loaded from the build cache when the
    /// source bytes are unchanged, compiled fresh otherwise (with coverage
    /// instrumentation when enabled). Cache failures are always soft: they
    /// are logged and compilation proceeds.
    pub(crate) async fn contract_artifact(
        &self,
        sol_source: &Path,
        contract_name: &str,
    ) -> Result<Contract, DeployerError> {
        let sol_full_path =
            std::fs::canonicalize(sol_source).unwrap_or_else(|_| sol_source.to_path_buf());

        if !self.options.no_cache {
            match BuildCache::new(&self.options.build_cache_dir) {
                Err(err) => {
                    warn!(path = %self.options.build_cache_dir.display(), "failed to use build cache dir: {err}");
                }
                Ok(cache) => {
                    match cache.load_contract(
                        &sol_full_path,
                        contract_name,
                        self.options.enable_coverage,
                    ) {
                        Ok(contract) => return Ok(contract),
                        Err(CacheError::NoCache) => {
                            // not cached yet, continue to build
                        }
                        Err(err) => {
                            warn!("failed to use build cache: {err}");
                        }
                    }
                }
            }
        }

        let started = std::time::Instant::now();

        let dir = sol_full_path.parent().unwrap_or_else(|| Path::new("."));
        let file = sol_full_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let compiled = if self.options.enable_coverage {
            // this is going to orchestrate sources accordingly
            self.compiler.compile_with_coverage(dir, &file).await
        } else {
            self.compiler.compile(dir, &file, 200).await
        };

        let contracts = match compiled {
            Ok(contracts) => contracts,
            Err(err) => {
                error!(
                    dir = %dir.display(),
                    file = %file,
                    coverage = self.options.enable_coverage,
                    "failed to compile .sol files: {err}"
                );
                return Err(DeployerError::CompilationFailed);
            }
        };

        debug!("compiled sources in {:?}", started.elapsed());
        for name in contracts.keys() {
            debug!("found {name} contract");
        }

        let Some(contract) = contracts.into_iter().find_map(|(name, contract)| {
            (name == contract_name).then_some(contract)
        }) else {
            error!(contract = contract_name, "specified contract not found in compiled sources");
            return Err(DeployerError::CompilationFailed);
        };

        if !self.options.no_cache {
            match BuildCache::new(&self.options.build_cache_dir) {
                Err(err) => {
                    warn!(path = %self.options.build_cache_dir.display(), "failed to use build cache dir: {err}");
                }
                Ok(cache) => {
                    if let Err(err) = cache.store_contract(&sol_full_path, &contract) {
                        warn!("failed to store contract code in build cache: {err}");
                    }
                }
            }
        }

        info!(contract = contract_name, "compiled contract");
        Ok(contract)
    }
}
