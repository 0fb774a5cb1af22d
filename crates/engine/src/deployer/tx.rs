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

//! The `tx` operation: invoke a state-changing contract method.

use std::{path::PathBuf, sync::Arc};

use alloy_dyn_abi::JsonAbiExt;
use alloy_primitives::{Address, TxHash, TxKind, U256};
use tracing::debug;

use crate::CoverageCollector;

use super::{
    await_tx, fold_coverage_revert, harvest_coverage_logs, map_string_args, revert_reason,
    rpc_revert_reason, sign_and_send, Deployer, DeployerError, TransactionSigner, TxContext,
};

/// Inputs of a [`Deployer::tx`] operation.
#[derive(Clone)]
pub struct ContractTxOpts {
    /// Sender address.
    pub from: Address,
    /// Signer for `from`; not needed in bytecode-only mode.
    pub signer: Option<Arc<dyn TransactionSigner>>,
    /// Path of the contract source file.
    pub sol_source: PathBuf,
    /// Contract to compile/load from cache.
    pub contract_name: String,
    /// Deployed contract address to interact with.
    pub contract: Address,
    /// Ether value sent along with the call.
    pub value: U256,
    /// Produce ABI-packed calldata only, without touching the RPC.
    pub bytecode_only: bool,
    /// Await confirmation of the transaction.
    pub await_confirm: bool,
    /// Collector receiving coverage data from this operation.
    pub coverage_agent: Option<Arc<CoverageCollector>>,
}

/// Result of a [`Deployer::tx`] operation.
#[derive(Debug, Clone)]
pub enum TxOutcome {
    /// Bytecode-only mode: the ABI-packed calldata; nothing was submitted.
    Calldata(Vec<u8>),
    /// The transaction was submitted.
    Sent {
        /// Node-reported transaction hash.
        tx_hash: TxHash,
        /// Mined block number, when the transaction was awaited.
        block_number: Option<u64>,
    },
}

impl Deployer {
    /// Builds, signs and submits a transaction invoking `method_name` with
    /// the given positional string arguments.
    ///
    /// With coverage enabled and a collector attached, the confirmation is
    /// always awaited and the mined receipt's coverage events are routed to
    /// the collector; a tagged revert reason feeds the collector too before
    /// being stripped for display.
    pub async fn tx(
        &self,
        opts: ContractTxOpts,
        method_name: &str,
        method_args: &[String],
    ) -> Result<TxOutcome, DeployerError> {
        let mut contract = self.contract_artifact(&opts.sol_source, &opts.contract_name).await?;
        contract.address = Some(opts.contract);

        let abi = contract.parse_abi()?;
        let function = abi
            .functions
            .get(method_name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| DeployerError::MethodNotFound(method_name.to_string()))?
            .clone();

        let mapped_args = map_string_args(&function.inputs, method_args)?;
        let calldata = function.abi_encode_input(&mapped_args)?;

        if opts.bytecode_only {
            return Ok(TxOutcome::Calldata(calldata));
        }

        let client = self.backend().await?;
        let chain_id = client.chain_id().await?;
        let nonce = client.pending_nonce(opts.from).await?;

        let coverage = if self.options().enable_coverage {
            self.coverage_context(opts.from, &contract, opts.contract, opts.coverage_agent.as_ref())
                .await?
        } else {
            None
        };

        let signer = opts.signer.clone().ok_or(DeployerError::MissingSigner)?;

        let ctx = TxContext {
            from: opts.from,
            to: TxKind::Call(opts.contract),
            value: opts.value,
            data: calldata.clone(),
            chain_id,
            nonce,
            gas_price: self.options().gas_price,
            gas_limit: self.options().gas_limit,
        };

        let tx_hash = match sign_and_send(client, &signer, &ctx).await {
            Ok(tx_hash) => tx_hash,
            Err(DeployerError::Rpc(err)) => {
                // Gas estimation replays the call, so a failing require
                // surfaces here with its (possibly tagged) reason.
                if let Some(reason) = rpc_revert_reason(&err) {
                    let reason = fold_coverage_revert(
                        &contract.name,
                        reason,
                        opts.coverage_agent.as_ref(),
                    );
                    return Err(DeployerError::Reverted {
                        tx_hash: None,
                        block_number: None,
                        reason: Some(reason),
                    });
                }
                return Err(DeployerError::Rpc(err));
            }
            Err(err) => return Err(err),
        };

        let mut block_number = None;
        let awaiting = opts.await_confirm
            || (self.options().enable_coverage && opts.coverage_agent.is_some());

        if awaiting {
            debug!(contract = %opts.contract, "awaiting tx {tx_hash}");

            match await_tx(client, tx_hash, self.options().tx_timeout).await {
                Ok(block) => block_number = Some(block),
                Err(DeployerError::Reverted { block_number: Some(block), .. }) => {
                    let reason = match revert_reason(
                        client,
                        opts.from,
                        opts.contract,
                        &calldata,
                        block,
                    )
                    .await
                    {
                        Ok(reason) => Some(fold_coverage_revert(
                            &contract.name,
                            reason,
                            opts.coverage_agent.as_ref(),
                        )),
                        Err(err) => {
                            tracing::warn!("failed to get revert reason: {err}");
                            None
                        }
                    };

                    return Err(DeployerError::Reverted {
                        tx_hash: Some(tx_hash),
                        block_number: Some(block),
                        reason,
                    });
                }
                Err(err) => return Err(err),
            }

            if let (Some(context), Some(agent)) = (&coverage, opts.coverage_agent.as_ref()) {
                harvest_coverage_logs(client, &contract, context, agent, tx_hash).await?;
            }
        }

        Ok(TxOutcome::Sent { tx_hash, block_number })
    }
}
