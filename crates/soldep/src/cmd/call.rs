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

//! `soldep call`

use alloy_primitives::Address;
use eyre::{Result, WrapErr};
use soldep_engine::{sol_value_to_json, ContractCallOpts, Deployer};
use tracing::debug;

use crate::Cli;

use super::{coverage_collector, deployer_options, signer_for, write_coverage_reports};

pub(super) async fn run(
    cli: &Cli,
    from: &str,
    address: &str,
    method: &str,
    args: Vec<String>,
) -> Result<()> {
    let contract: Address = address.parse().wrap_err("invalid contract address")?;
    let mut from: Address = from.parse().wrap_err("invalid from address")?;

    let agent = coverage_collector(cli)?;
    let deployer = Deployer::new(deployer_options(cli)?)?;

    // Coverage routes the call through a signed transaction, which needs
    // the key of a funded account.
    let coverage_signer = if cli.coverage && cli.from_pk.is_some() {
        let (signer_address, signer) = signer_for(cli, &deployer).await?;
        if from == Address::ZERO {
            from = signer_address;
        }
        Some(signer)
    } else {
        None
    };

    debug!("target contract {contract}");
    debug!("using from address {from}");

    let opts = ContractCallOpts {
        from,
        sol_source: cli.source.clone(),
        contract_name: cli.name.clone(),
        contract,
        coverage_signer,
        coverage_agent: agent.clone(),
    };

    let (values, _outputs) = deployer.call(opts, method, &args).await?;

    write_coverage_reports(cli, agent.as_ref())?;

    let rendered: Vec<serde_json::Value> = values.iter().map(sol_value_to_json).collect();
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}
