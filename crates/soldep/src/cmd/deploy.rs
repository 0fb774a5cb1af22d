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

//! `soldep deploy`

use alloy_primitives::Address;
use eyre::{eyre, Result};
use soldep_engine::{ContractDeployOpts, Deployer};
use tracing::{debug, info};

use crate::Cli;

use super::{coverage_collector, deployer_options, signer_for, write_coverage_reports};

pub(super) async fn run(
    cli: &Cli,
    bytecode_only: bool,
    no_await: bool,
    args: Vec<String>,
) -> Result<()> {
    let agent = coverage_collector(cli)?;
    let deployer = Deployer::new(deployer_options(cli)?)?;

    let mut opts = ContractDeployOpts {
        from: Address::ZERO,
        signer: None,
        sol_source: cli.source.clone(),
        contract_name: cli.name.clone(),
        bytecode_only,
        await_confirm: !no_await,
        coverage_agent: agent.clone(),
    };

    if !bytecode_only {
        let (from, signer) = signer_for(cli, &deployer).await?;
        debug!("sending from {from}");
        opts.from = from;
        opts.signer = Some(signer);
    }

    let outcome = deployer.deploy(opts, &args).await?;

    if bytecode_only {
        println!("{}", outcome.contract.bin);
        return Ok(());
    }

    let address =
        outcome.contract.address.ok_or_else(|| eyre!("deployment returned no address"))?;

    if no_await {
        if let Some(tx_hash) = outcome.tx_hash {
            info!(tx_hash = %tx_hash, "contract address {address}");
        }
    }

    write_coverage_reports(cli, agent.as_ref())?;

    println!("{address}");
    Ok(())
}
