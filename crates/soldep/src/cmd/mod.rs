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

//! Subcommand implementations and shared CLI plumbing.

use std::sync::Arc;

use alloy_primitives::Address;
use eyre::{bail, Result, WrapErr};
use soldep_engine::{
    CoverageCollector, CoverageMode, Deployer, DeployerOptions, RawKeySigner, SignerScheme,
    TransactionSigner,
};
use tracing::info;

use crate::{Cli, Commands};

mod build;
mod call;
mod deploy;
mod logs;
mod tx;

/// Dispatches the parsed CLI to its subcommand.
pub async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Build { standard_json } => build::run(&cli, *standard_json).await,
        Commands::Deploy { bytecode, no_await, args } => {
            deploy::run(&cli, *bytecode, *no_await, args.clone()).await
        }
        Commands::Tx { bytecode, no_await, address, method, args } => {
            tx::run(&cli, *bytecode, *no_await, address, method, args.clone()).await
        }
        Commands::Call { from, address, method, args } => {
            call::run(&cli, from, address, method, args.clone()).await
        }
        Commands::Logs { address, tx_hash, event_name } => {
            logs::run(&cli, address, tx_hash, event_name).await
        }
    }
}

fn deployer_options(cli: &Cli) -> Result<DeployerOptions> {
    Ok(DeployerOptions {
        rpc_timeout: cli.rpc_timeout,
        tx_timeout: cli.tx_timeout,
        call_timeout: cli.call_timeout,
        signer_scheme: cli.signer_type.parse::<SignerScheme>()?,
        gas_price: cli.gas_price,
        gas_limit: cli.gas_limit,
        evm_rpc_endpoint: cli.endpoint.clone(),
        no_cache: cli.no_cache,
        build_cache_dir: cli.cache_dir.clone(),
        solc_path: cli.solc_path.clone(),
        enable_coverage: cli.coverage,
        solc_allowed_paths: cli.allowed_paths.clone(),
    })
}

/// Builds the coverage collector when `--cover` is set.
fn coverage_collector(cli: &Cli) -> Result<Option<Arc<CoverageCollector>>> {
    if !cli.coverage {
        return Ok(None);
    }

    let mode = match cli.cover_mode.as_str() {
        "count" => CoverageMode::Count,
        "set" => CoverageMode::Set,
        other => bail!("unsupported coverage mode: {other}"),
    };

    Ok(Some(Arc::new(CoverageCollector::new(mode))))
}

/// Builds the raw-key signer from `--from-pk`, bound to the chain ID of the
/// connected node.
async fn signer_for(
    cli: &Cli,
    deployer: &Deployer,
) -> Result<(Address, Arc<dyn TransactionSigner>)> {
    let Some(pk_hex) = cli.from_pk.as_deref() else {
        bail!("private key not specified, use -P or --from-pk");
    };

    let scheme = deployer.options().signer_scheme;
    let chain_id = deployer.backend().await?.chain_id().await?;

    let signer = RawKeySigner::new(pk_hex, scheme, chain_id)?;
    let from = signer.address();
    Ok((from, Arc::new(signer)))
}

/// Writes the requested coverage reports once an operation finished.
fn write_coverage_reports(cli: &Cli, agent: Option<&Arc<CoverageCollector>>) -> Result<()> {
    let Some(agent) = agent else { return Ok(()) };

    if let Some(path) = &cli.cover_profile {
        let mut file = std::fs::File::create(path)
            .wrap_err_with(|| format!("failed to create coverage profile {}", path.display()))?;
        agent.report_text(&mut file, &[])?;
        info!(path = %path.display(), "wrote coverage profile");
    }

    if let Some(path) = &cli.cover_html {
        let mut file = std::fs::File::create(path)
            .wrap_err_with(|| format!("failed to create coverage report {}", path.display()))?;
        agent.report_html(&mut file, &[])?;
        info!(path = %path.display(), "wrote coverage HTML report");
    }

    Ok(())
}
