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

//! `soldep logs`

use alloy_primitives::{Address, TxHash};
use eyre::{Result, WrapErr};
use soldep_engine::{ContractLogsOpts, Deployer};
use tracing::debug;

use crate::Cli;

use super::{coverage_collector, deployer_options, write_coverage_reports};

pub(super) async fn run(
    cli: &Cli,
    address: &str,
    tx_hash: &str,
    event_name: &str,
) -> Result<()> {
    let contract: Address = address.parse().wrap_err("invalid contract address")?;
    let tx_hash: TxHash = tx_hash.parse().wrap_err("invalid transaction hash")?;

    let agent = coverage_collector(cli)?;
    let deployer = Deployer::new(deployer_options(cli)?)?;

    debug!("target contract {contract}");
    debug!("target tx {tx_hash}");
    debug!("target event name {event_name}");

    let opts = ContractLogsOpts {
        from: Address::ZERO,
        sol_source: cli.source.clone(),
        contract_name: cli.name.clone(),
        contract,
        coverage_agent: agent.clone(),
    };

    let events = deployer.logs(opts, tx_hash, event_name).await?;

    write_coverage_reports(cli, agent.as_ref())?;

    println!("{}", serde_json::to_string_pretty(&events)?);
    Ok(())
}
