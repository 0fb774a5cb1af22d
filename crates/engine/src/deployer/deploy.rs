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

//! The `deploy` operation: put a compiled contract on chain.

use std::{path::PathBuf, sync::Arc};

use alloy_dyn_abi::{DynSolValue, JsonAbiExt};
use alloy_json_abi::JsonAbi;
use alloy_primitives::{Address, TxHash, TxKind, U256};
use tracing::debug;

use crate::{Contract, CoverageCollector};

use super::{
    await_tx, harvest_coverage_logs, map_string_args, sign_and_send, Deployer, DeployerError,
    TransactionSigner, TxContext,
};

/// Inputs of a [`Deployer::deploy`] operation.
#[derive(Clone)]
pub struct ContractDeployOpts {
    /// Sender address.
    pub from: Address,
    /// Signer for `from`; not needed in bytecode-only mode.
    pub signer: Option<Arc<dyn TransactionSigner>>,
    /// Path of the contract source file.
    pub sol_source: PathBuf,
    /// Contract to compile/load from cache.
    pub contract_name: String,
    /// Produce creation bytecode (with packed constructor args appended)
    /// only, without touching the RPC.
    pub bytecode_only: bool,
    /// Await confirmation of the deployment.
    pub await_confirm: bool,
    /// Collector receiving coverage data from this operation.
    pub coverage_agent: Option<Arc<CoverageCollector>>,
}

/// Result of a [`Deployer::deploy`] operation.
#[derive(Debug, Clone)]
pub struct DeployOutcome {
    /// Node-reported transaction hash; `None` in bytecode-only mode.
    pub tx_hash: Option<TxHash>,
    /// The deployed artifact, with its address assigned (unless
    /// bytecode-only).
    pub contract: Contract,
}

/// Maps constructor string arguments and ABI-packs them.
fn packed_constructor_args(abi: &JsonAbi, args: &[String]) -> Result<Vec<u8>, DeployerError> {
    match abi.constructor.as_ref() {
        Some(constructor) => {
            let mapped: Vec<DynSolValue> = map_string_args(&constructor.inputs, args)?;
            Ok(constructor.abi_encode_input(&mapped)?)
        }
        None => {
            // no constructor: any supplied argument is a user error
            map_string_args(&[], args)?;
            Ok(Vec::new())
        }
    }
}

/// Appends hex-encoded packed constructor arguments to the creation
/// bytecode of `contract`.
pub(crate) fn append_constructor_args(
    contract: &mut Contract,
    args: &[String],
) -> Result<(), DeployerError> {
    let abi = contract.parse_abi()?;
    let packed = packed_constructor_args(&abi, args)?;
    contract.bin.push_str(&hex::encode(packed));
    Ok(())
}

impl Deployer {
    /// Compiles (or loads) the contract and deploys it, returning the
    /// submission hash and the artifact with its assigned address.
    pub async fn deploy(
        &self,
        opts: ContractDeployOpts,
        constructor_args: &[String],
    ) -> Result<DeployOutcome, DeployerError> {
        let mut contract = self.contract_artifact(&opts.sol_source, &opts.contract_name).await?;

        if opts.bytecode_only {
            append_constructor_args(&mut contract, constructor_args)?;
            return Ok(DeployOutcome { tx_hash: None, contract });
        }

        let client = self.backend().await?;
        let chain_id = client.chain_id().await?;
        let nonce = client.pending_nonce(opts.from).await?;

        let abi = contract.parse_abi()?;
        let mut data = contract.bytecode()?;
        data.extend(packed_constructor_args(&abi, constructor_args)?);

        let signer = opts.signer.clone().ok_or(DeployerError::MissingSigner)?;

        let ctx = TxContext {
            from: opts.from,
            to: TxKind::Create,
            value: U256::ZERO,
            data,
            chain_id,
            nonce,
            gas_price: self.options().gas_price,
            gas_limit: self.options().gas_limit,
        };

        let tx_hash = sign_and_send(client, &signer, &ctx).await?;

        let address = opts.from.create(nonce);
        contract.address = Some(address);

        let awaiting = opts.await_confirm
            || (self.options().enable_coverage && opts.coverage_agent.is_some());

        if awaiting {
            debug!(tx_hash = %tx_hash, "awaiting contract deployment {address}");

            match await_tx(client, tx_hash, self.options().tx_timeout).await {
                Ok(_block) => {}
                Err(DeployerError::Reverted { block_number, .. }) => {
                    return Err(DeployerError::Reverted {
                        tx_hash: Some(tx_hash),
                        block_number,
                        reason: None,
                    });
                }
                Err(err) => return Err(err),
            }

            // The coverage event can only be discovered once the contract
            // exists on chain, so the probe runs after confirmation.
            if self.options().enable_coverage {
                if let Some(agent) = opts.coverage_agent.as_ref() {
                    if let Some(context) = self
                        .coverage_context(opts.from, &contract, address, Some(agent))
                        .await?
                    {
                        harvest_coverage_logs(client, &contract, &context, agent, tx_hash).await?;
                    }
                }
            }
        }

        Ok(DeployOutcome { tx_hash: Some(tx_hash), contract })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployer::ArgError;

    fn contract_with_constructor() -> Contract {
        Contract {
            name: "Greeter".to_string(),
            source_path: "greeter.sol".to_string(),
            all_paths: vec!["greeter.sol".to_string()],
            compiler_version: "0.8.19".to_string(),
            address: None,
            coverage: false,
            statements: Vec::new(),
            abi: br#"[{"type":"constructor","stateMutability":"nonpayable","inputs":[{"name":"x","type":"uint256"}]}]"#
                .to_vec(),
            bin: "6080604052".to_string(),
        }
    }

    #[test]
    fn test_constructor_args_appended_to_bytecode() {
        let mut contract = contract_with_constructor();
        append_constructor_args(&mut contract, &["42".to_string()]).unwrap();

        // creation bytecode followed by the 32-byte big-endian encoding of 42
        let expected_suffix = format!("{:064x}", 42);
        assert_eq!(contract.bin, format!("6080604052{expected_suffix}"));
    }

    #[test]
    fn test_constructor_arg_count_enforced() {
        let mut contract = contract_with_constructor();
        let err = append_constructor_args(&mut contract, &[]).unwrap_err();
        assert!(matches!(err, DeployerError::Args(_)));
    }

    #[test]
    fn test_no_constructor_no_args_ok() {
        let mut contract = contract_with_constructor();
        contract.abi = b"[]".to_vec();

        append_constructor_args(&mut contract, &[]).unwrap();
        assert_eq!(contract.bin, "6080604052");

        let err = append_constructor_args(&mut contract, &["1".to_string()]).unwrap_err();
        assert!(matches!(err, DeployerError::Args(ArgError::CountMismatch { .. })));
    }
}
