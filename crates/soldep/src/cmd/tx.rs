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

//! `soldep tx`

use alloy_primitives::{hex, Address, U256};
use eyre::{Result, WrapErr};
use soldep_engine::{ContractTxOpts, Deployer, TxOutcome};
use tracing::debug;

use crate::Cli;

use super::{coverage_collector, deployer_options, signer_for, write_coverage_reports};

pub(super) async fn run(
    cli: &Cli,
    bytecode_only: bool,
    no_await: bool,
    address: &str,
    method: &str,
    args: Vec<String>,
) -> Result<()> {
    let contract: Address = address.parse().wrap_err("invalid contract address")?;

    let agent = coverage_collector(cli)?;
    let deployer = Deployer::new(deployer_options(cli)?)?;

    let mut opts = ContractTxOpts {
        from: Address::ZERO,
        signer: None,
        sol_source: cli.source.clone(),
        contract_name: cli.name.clone(),
        contract,
        value: U256::ZERO,
        bytecode_only,
        await_confirm: !no_await,
        coverage_agent: agent.clone(),
    };

    if !bytecode_only {
        let (from, signer) = signer_for(cli, &deployer).await?;
        debug!("sending from {from}");
        debug!("target contract {contract}");
        opts.from = from;
        opts.signer = Some(signer);
    }

    match deployer.tx(opts, method, &args).await? {
        TxOutcome::Calldata(calldata) => {
            println!("{}", hex::encode(calldata));
        }
        TxOutcome::Sent { tx_hash, block_number } => {
            if no_await {
                debug!(contract = %contract, "sent tx {tx_hash}");
            } else {
                debug!(contract = %contract, block = ?block_number, "confirmed tx {tx_hash}");
            }

            write_coverage_reports(cli, agent.as_ref())?;
            println!("{tx_hash}");
        }
    }

    Ok(())
}
