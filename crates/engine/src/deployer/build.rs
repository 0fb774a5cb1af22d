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

//! The `build` operation: compile and cache, nothing else.

use std::path::Path;

use crate::Contract;

use super::{Deployer, DeployerError};

impl Deployer {
    /// Compiles `contract_name` from `sol_source` (or loads it from the
    /// build cache) and refreshes the cache. Purely local; never touches
    /// the RPC endpoint.
    pub async fn build(
        &self,
        sol_source: impl AsRef<Path>,
        contract_name: &str,
    ) -> Result<Contract, DeployerError> {
        self.contract_artifact(sol_source.as_ref(), contract_name).await
    }
}
