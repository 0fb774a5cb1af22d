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

//! The `logs` operation: decode events out of a transaction receipt.

use std::{path::PathBuf, sync::Arc};

use alloy_consensus::TxReceipt as _;
use alloy_dyn_abi::EventExt;
use alloy_primitives::{Address, TxHash};
use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::CoverageCollector;

use super::{sol_value_to_json, Deployer, DeployerError};

/// Inputs of a [`Deployer::logs`] operation.
#[derive(Clone)]
pub struct ContractLogsOpts {
    /// Address used for the coverage discovery call, if any.
    pub from: Address,
    /// Path of the contract source file.
    pub sol_source: PathBuf,
    /// Contract to compile/load from cache.
    pub contract_name: String,
    /// Deployed contract address the receipt belongs to.
    pub contract: Address,
    /// Collector receiving coverage data from this operation.
    pub coverage_agent: Option<Arc<CoverageCollector>>,
}

impl Deployer {
    /// Loads the receipt of `tx_hash` and decodes every `event_name` log
    /// into a JSON object keyed by parameter name.
    ///
    /// Coverage marker logs are routed to the collector and excluded from
    /// the result. When the event name is unknown to the ABI, the raw logs
    /// are returned as-is.
    pub async fn logs(
        &self,
        opts: ContractLogsOpts,
        tx_hash: TxHash,
        event_name: &str,
    ) -> Result<Vec<Value>, DeployerError> {
        let mut contract = self.contract_artifact(&opts.sol_source, &opts.contract_name).await?;
        contract.address = Some(opts.contract);

        let client = self.backend().await?;

        let coverage = if self.options().enable_coverage {
            self.coverage_context(opts.from, &contract, opts.contract, opts.coverage_agent.as_ref())
                .await?
        } else {
            None
        };

        let Some(receipt) = client.transaction_receipt(tx_hash).await? else {
            error!(tx_hash = %tx_hash, "transaction not found");
            return Err(DeployerError::TxNotFound);
        };
        if !receipt.status() {
            error!(tx_hash = %tx_hash, "transaction reverted without logs");
            return Err(DeployerError::Reverted {
                tx_hash: Some(tx_hash),
                block_number: receipt.block_number,
                reason: None,
            });
        }

        let abi = contract.parse_abi()?;
        let event =
            abi.events.get(event_name).and_then(|overloads| overloads.first()).cloned();

        let mut events = Vec::with_capacity(receipt.inner.logs().len());

        for (index, log) in receipt.inner.logs().iter().enumerate() {
            let Some(topic0) = log.topic0() else { continue };

            if let (Some(context), Some(agent)) = (&coverage, opts.coverage_agent.as_ref()) {
                if *topic0 == context.topic {
                    if let Err(err) = agent.collect_coverage_event(
                        &contract.name,
                        &context.event,
                        &log.inner.data,
                    ) {
                        warn!(
                            contract = %contract.name,
                            "failed to collect coverage event from contract: {err}"
                        );
                    }
                    continue;
                }
            }

            let Some(event) = &event else {
                // Unknown event name: hand the raw log back.
                events.push(serde_json::to_value(log)?);
                continue;
            };

            if event.selector() != *topic0 {
                continue;
            }

            let decoded = event
                .decode_log_parts(log.inner.data.topics().iter().copied(), &log.inner.data.data)
                .map_err(|err| {
                    error!(event = event_name, index, "unable to unmarshal log: {err}");
                    DeployerError::EventParse
                })?;

            let mut indexed = decoded.indexed.into_iter();
            let mut body = decoded.body.into_iter();
            let mut object = Map::new();

            for input in &event.inputs {
                let value = if input.indexed { indexed.next() } else { body.next() };
                let Some(value) = value else {
                    error!(event = event_name, index, "unable to unmarshal log");
                    return Err(DeployerError::EventParse);
                };
                object.insert(input.name.clone(), sol_value_to_json(&value));
            }

            events.push(Value::Object(object));
        }

        Ok(events)
    }
}
