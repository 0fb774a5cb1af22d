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

//! The `call` operation: invoke a read-only contract method.
//!
//! Under coverage, a plain `eth_call` cannot emit a persisted log, so the
//! call is first executed as a signed, mined transaction (to capture the
//! coverage events from its receipt) and the original value-returning read
//! is then re-issued pinned at the mined block number.

use std::{path::PathBuf, sync::Arc};

use alloy_dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy_json_abi::Param;
use alloy_primitives::{Address, Bytes, TxKind, U256};
use alloy_rpc_types::{BlockId, TransactionInput, TransactionRequest};
use tracing::debug;

use crate::CoverageCollector;

use super::{
    fold_coverage_revert, map_string_args, rpc_revert_reason, ContractTxOpts, Deployer,
    DeployerError, TransactionSigner, TxOutcome,
};

/// Inputs of a [`Deployer::call`] operation.
#[derive(Clone)]
pub struct ContractCallOpts {
    /// Address the call is made (and estimated) from.
    pub from: Address,
    /// Path of the contract source file.
    pub sol_source: PathBuf,
    /// Contract to compile/load from cache.
    pub contract_name: String,
    /// Deployed contract address to interact with.
    pub contract: Address,
    /// Signer used when coverage forces the call through a transaction.
    pub coverage_signer: Option<Arc<dyn TransactionSigner>>,
    /// Collector receiving coverage data from this operation.
    pub coverage_agent: Option<Arc<CoverageCollector>>,
}

impl Deployer {
    /// Calls a read-only method and returns the decoded output values
    /// together with the output parameter metadata.
    pub async fn call(
        &self,
        opts: ContractCallOpts,
        method_name: &str,
        method_args: &[String],
    ) -> Result<(Vec<DynSolValue>, Vec<Param>), DeployerError> {
        let mut contract = self.contract_artifact(&opts.sol_source, &opts.contract_name).await?;
        contract.address = Some(opts.contract);

        let client = self.backend().await?;
        client.chain_id().await?;

        let abi = contract.parse_abi()?;
        let function = abi
            .functions
            .get(method_name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| DeployerError::MethodNotFound(method_name.to_string()))?
            .clone();

        let mapped_args = map_string_args(&function.inputs, method_args)?;
        let calldata = function.abi_encode_input(&mapped_args)?;

        let request = TransactionRequest {
            from: Some(opts.from),
            to: Some(TxKind::Call(opts.contract)),
            input: TransactionInput::new(Bytes::from(calldata)),
            ..Default::default()
        };

        if self.options().enable_coverage {
            let coverage = self
                .coverage_context(opts.from, &contract, opts.contract, opts.coverage_agent.as_ref())
                .await?;

            if coverage.is_some() && opts.coverage_agent.is_some() {
                // A read cannot leave a receipt, so route the call through a
                // mined transaction and read back at its block.
                let signer =
                    opts.coverage_signer.clone().ok_or(DeployerError::MissingSigner)?;

                let tx_opts = ContractTxOpts {
                    from: opts.from,
                    signer: Some(signer),
                    sol_source: opts.sol_source.clone(),
                    contract_name: opts.contract_name.clone(),
                    contract: opts.contract,
                    value: U256::ZERO,
                    bytecode_only: false,
                    await_confirm: true,
                    coverage_agent: opts.coverage_agent.clone(),
                };

                let outcome = self.tx(tx_opts, method_name, method_args).await?;
                let block_number = match outcome {
                    TxOutcome::Sent { block_number, tx_hash } => {
                        debug!(tx_hash = %tx_hash, "re-reading call output at mined block");
                        block_number
                    }
                    TxOutcome::Calldata(_) => None,
                };

                let output = self
                    .pinned_call(request, block_number.map(BlockId::from), &contract.name, None)
                    .await?;
                let values = function.abi_decode_output(&output)?;
                return Ok((values, function.outputs.clone()));
            }
        }

        // a simple call
        let output = self
            .pinned_call(request, None, &contract.name, opts.coverage_agent.as_ref())
            .await?;
        let values = function.abi_decode_output(&output)?;
        Ok((values, function.outputs.clone()))
    }

    /// Executes an `eth_call`, translating a revert response into
    /// [`DeployerError::Reverted`] (feeding any tagged reason to the
    /// collector first).
    async fn pinned_call(
        &self,
        request: TransactionRequest,
        block: Option<BlockId>,
        contract_name: &str,
        agent: Option<&Arc<CoverageCollector>>,
    ) -> Result<Bytes, DeployerError> {
        let client = self.backend().await?;

        match client.call(request, block).await {
            Ok(output) => Ok(output),
            Err(DeployerError::Rpc(err)) => {
                if let Some(reason) = rpc_revert_reason(&err) {
                    let reason = fold_coverage_revert(contract_name, reason, agent);
                    return Err(DeployerError::Reverted {
                        tx_hash: None,
                        block_number: None,
                        reason: Some(reason),
                    });
                }
                Err(DeployerError::Rpc(err))
            }
            Err(err) => Err(err),
        }
    }
}
