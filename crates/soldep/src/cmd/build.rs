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

//! `soldep build`

use eyre::Result;
use soldep_engine::{collect_paths_to_standard_json, Deployer, EvmVersion};

use crate::Cli;

use super::deployer_options;

pub(super) async fn run(cli: &Cli, standard_json: bool) -> Result<()> {
    let deployer = Deployer::new(deployer_options(cli)?)?;
    let contract = deployer.build(&cli.source, &cli.name).await?;

    if standard_json {
        let input = collect_paths_to_standard_json(
            &contract.all_paths,
            true,
            200,
            EvmVersion::Istanbul,
        )?;
        println!("{}", String::from_utf8_lossy(&input));
        return Ok(());
    }

    println!("{}", contract.bin);
    Ok(())
}
