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

//! Runtime coverage discovery.
//!
//! The coverage event of a deployed contract carries a random definition ID
//! chosen at compile time, so its name (and topic hash) cannot be known in
//! advance. The engine discovers it by calling the
//! `___coverage_id_<Name>` constant the instrumenter compiled into the
//! contract, then reconstructs the dynamically-named event ABI from the
//! returned ID.

use std::sync::Arc;

use alloy_dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy_json_abi::{Event, EventParam, Function, Param, StateMutability};
use alloy_primitives::{Address, Bytes, TxKind, B256};
use alloy_rpc_types::{TransactionInput, TransactionRequest};
use tracing::{error, warn};

use crate::{Contract, CoverageCollector};

use super::{Deployer, DeployerError};

/// Everything an operation needs to route coverage events: the
/// reconstructed event ABI and its topic hash.
#[derive(Debug, Clone)]
pub struct CoverageContext {
    /// Name of the coverage marker event, `___coverage_<id>`.
    pub event_name: String,
    /// Reconstructed event ABI.
    pub event: Event,
    /// Topic hash receipts are matched against.
    pub topic: B256,
}

fn uint64_event_param(name: &str) -> EventParam {
    EventParam {
        ty: "uint64".to_string(),
        name: name.to_string(),
        indexed: false,
        components: Vec::new(),
        internal_type: None,
    }
}

/// Reconstructs the marker event ABI for a known definition ID.
pub fn coverage_marker_event(definition_id: u64) -> (String, Event) {
    let name = format!("___coverage_{definition_id}");
    let event = Event {
        name: name.clone(),
        inputs: vec![
            uint64_event_param("start"),
            uint64_event_param("end"),
            uint64_event_param("file"),
        ],
        anonymous: false,
    };
    (name, event)
}

/// The view function the instrumenter compiles into every covered contract.
pub fn coverage_id_function(contract_name: &str) -> Function {
    Function {
        name: format!("___coverage_id_{contract_name}"),
        inputs: Vec::new(),
        outputs: vec![Param {
            ty: "uint64".to_string(),
            name: String::new(),
            components: Vec::new(),
            internal_type: None,
        }],
        state_mutability: StateMutability::View,
    }
}

impl Deployer {
    /// Queries a deployed contract for its coverage definition ID and
    /// reconstructs the coverage event.
    ///
    /// Fails with [`DeployerError::NoCoverage`] when coverage is disabled in
    /// the options, and with [`DeployerError::NoCoverageInContract`] when
    /// the contract does not answer with a usable (nonzero, decodable) ID.
    pub async fn coverage_event_info(
        &self,
        from: Address,
        contract_name: &str,
        contract_address: Address,
    ) -> Result<CoverageContext, DeployerError> {
        if !self.options().enable_coverage {
            return Err(DeployerError::NoCoverage);
        }

        let function = coverage_id_function(contract_name);
        let calldata = function.abi_encode_input(&[])?;

        let client = self.backend().await?;
        let request = TransactionRequest {
            from: Some(from),
            to: Some(TxKind::Call(contract_address)),
            input: TransactionInput::new(Bytes::from(calldata)),
            ..Default::default()
        };

        let response = match client.call(request, None).await {
            Ok(response) => response,
            Err(err) => {
                error!(
                    "failed to get Coverage Definition ID from the contract, \
                     was it deployed with coverage enabled? {err}"
                );
                return Err(DeployerError::NoCoverageInContract);
            }
        };

        let values = match function.abi_decode_output(&response) {
            Ok(values) => values,
            Err(err) => {
                error!("failed to unpack ABI response of {}: {err}", function.name);
                return Err(DeployerError::NoCoverageInContract);
            }
        };

        let definition_id = match values.first() {
            Some(DynSolValue::Uint(id, _)) => id.to::<u64>(),
            _ => {
                error!("failed to parse response of {} from the contract", function.name);
                return Err(DeployerError::NoCoverageInContract);
            }
        };

        if definition_id == 0 {
            error!("got Coverage Definition ID as zero, does the contract have coverage enabled?");
            return Err(DeployerError::NoCoverageInContract);
        }

        let (event_name, event) = coverage_marker_event(definition_id);
        let topic = event.selector();
        Ok(CoverageContext { event_name, event, topic })
    }

    /// Discovers the coverage event of `contract` and, when a collector is
    /// attached, registers the contract's sources and pre-registers its
    /// recorded statements.
    ///
    /// Coverage being absent (disabled, or not compiled into the contract)
    /// yields `Ok(None)` — it disables collection for this operation without
    /// failing it. Registration failures are logged, never escalated.
    pub(crate) async fn coverage_context(
        &self,
        from: Address,
        contract: &Contract,
        contract_address: Address,
        agent: Option<&Arc<CoverageCollector>>,
    ) -> Result<Option<CoverageContext>, DeployerError> {
        let context =
            match self.coverage_event_info(from, &contract.name, contract_address).await {
                Ok(context) => context,
                Err(DeployerError::NoCoverage | DeployerError::NoCoverageInContract) => {
                    return Ok(None)
                }
                Err(err) => return Err(err),
            };

        if let Some(agent) = agent {
            if let Err(err) = agent.load_contract(contract) {
                error!("failed to open referenced dependencies for coverage reporting: {err}");
            }

            for statement in &contract.statements {
                let [start, end, file] = *statement;
                if start < 0 || end < 0 || file < 0 {
                    continue;
                }

                if let Err(err) =
                    agent.add_statement(&contract.name, start as u64, end as u64, file as u64)
                {
                    warn!("failed to pre-register coverage statement: {err}");
                }
            }
        }

        Ok(Some(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;

    #[test]
    fn test_marker_event_topic_matches_signature() {
        let (name, event) = coverage_marker_event(1234567890);
        assert_eq!(name, "___coverage_1234567890");
        assert_eq!(
            event.selector(),
            keccak256("___coverage_1234567890(uint64,uint64,uint64)".as_bytes())
        );
    }

    #[test]
    fn test_id_function_selector() {
        let function = coverage_id_function("Counter");
        assert_eq!(function.name, "___coverage_id_Counter");
        assert_eq!(
            function.selector().as_slice(),
            &keccak256("___coverage_id_Counter()".as_bytes())[..4]
        );
    }
}
