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

//! Shared transaction plumbing: building, signing and submitting legacy
//! transactions, awaiting confirmation, and decoding revert reasons.

use std::{sync::Arc, time::Duration};

use alloy_consensus::{TxEnvelope, TxLegacy, TxReceipt as _};
use alloy_dyn_abi::DynSolValue;
use alloy_eips::eip2718::Encodable2718;
use alloy_json_rpc::RpcError;
use alloy_primitives::{Address, Bytes, TxHash, TxKind, U256};
use alloy_rpc_types::{BlockId, TransactionInput, TransactionRequest};
use alloy_sol_types::{Revert, SolError};
use alloy_transport::TransportError;
use tracing::{debug, error, warn};

use crate::{
    coverage::CoverageError, has_coverage_report, trim_coverage_report, Contract,
    CoverageCollector,
};

use super::{Client, CoverageContext, DeployerError, TransactionSigner};

/// Gas budget used when replaying a reverted call to recover its reason.
const REVERT_REPLAY_GAS: u64 = 1_000_000;

/// Per-operation transaction state, resolved step by step before signing.
#[derive(Debug, Clone)]
pub(crate) struct TxContext {
    pub from: Address,
    pub to: TxKind,
    pub value: U256,
    pub data: Vec<u8>,
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: Option<u128>,
    pub gas_limit: Option<u64>,
}

impl TxContext {
    fn call_request(&self, gas_price: u128) -> TransactionRequest {
        TransactionRequest {
            from: Some(self.from),
            to: Some(self.to),
            gas_price: Some(gas_price),
            value: Some(self.value),
            input: TransactionInput::new(Bytes::from(self.data.clone())),
            ..Default::default()
        }
    }
}

/// Resolves gas values, signs and submits a legacy transaction, returning
/// the node-reported hash.
///
/// Gas price falls back to the node's suggestion, gas limit to
/// `eth_estimateGas`; for method invocations gas estimation cannot succeed
/// without code at the target, so target code presence is checked first.
pub(crate) async fn sign_and_send(
    client: &Client,
    signer: &Arc<dyn TransactionSigner>,
    ctx: &TxContext,
) -> Result<TxHash, DeployerError> {
    let gas_price = match ctx.gas_price {
        Some(price) => price,
        None => client.suggest_gas_price().await?,
    };

    let gas_limit = match ctx.gas_limit {
        Some(limit) => limit,
        None => {
            if let TxKind::Call(address) = ctx.to {
                let code = client.pending_code_at(address).await?;
                if code.is_empty() {
                    return Err(DeployerError::NoContractCode(address));
                }
            }
            client.estimate_gas(ctx.call_request(gas_price)).await?
        }
    };

    let tx = TxLegacy {
        chain_id: Some(ctx.chain_id),
        nonce: ctx.nonce,
        gas_price,
        gas_limit,
        to: ctx.to,
        value: ctx.value,
        input: Bytes::from(ctx.data.clone()),
    };

    let signed = signer.sign_tx(ctx.from, tx)?;
    let encoded = TxEnvelope::Legacy(signed).encoded_2718();

    client.send_raw_transaction(&encoded).await
}

/// Polls for the receipt of `tx_hash` once per second until it is found or
/// `timeout` expires.
///
/// Returns the mined block number on success. A receipt with status 0 is
/// surfaced as [`DeployerError::Reverted`] (reason not yet decoded), expiry
/// as [`DeployerError::AwaitTimeout`]. "Not found yet" keeps polling; every
/// other receipt query error is fatal.
pub(crate) async fn await_tx(
    client: &Client,
    tx_hash: TxHash,
    timeout: Duration,
) -> Result<u64, DeployerError> {
    debug!(hash = %tx_hash, "awaiting transaction");

    let poll = async {
        loop {
            match client.transaction_receipt(tx_hash).await? {
                None => tokio::time::sleep(Duration::from_secs(1)).await,
                Some(receipt) => {
                    let Some(block_number) = receipt.block_number else {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    };

                    if !receipt.status() {
                        return Err(DeployerError::Reverted {
                            tx_hash: Some(tx_hash),
                            block_number: Some(block_number),
                            reason: None,
                        });
                    }

                    return Ok(block_number);
                }
            }
        }
    };

    match tokio::time::timeout(timeout, poll).await {
        Ok(result) => result,
        Err(_) => Err(DeployerError::AwaitTimeout { tx_hash }),
    }
}

/// Replays the exact call of a reverted transaction at its mined block, with
/// a zero gas price and a generous gas budget, and decodes the standard
/// `Error(string)` payload out of the result.
pub(crate) async fn revert_reason(
    client: &Client,
    from: Address,
    contract_address: Address,
    tx_data: &[u8],
    block_number: u64,
) -> Result<String, DeployerError> {
    let request = TransactionRequest {
        from: Some(from),
        to: Some(TxKind::Call(contract_address)),
        gas_price: Some(0),
        gas: Some(REVERT_REPLAY_GAS),
        input: TransactionInput::new(Bytes::from(tx_data.to_vec())),
        ..Default::default()
    };

    match client.call(request, Some(BlockId::from(block_number))).await {
        Ok(result) => decode_error_string(&result).ok_or(DeployerError::NoRevertReason),
        Err(DeployerError::Rpc(err)) => {
            // Some nodes reject the replay outright and put the revert data
            // in the error payload instead.
            rpc_revert_reason(&err).ok_or(DeployerError::Rpc(err))
        }
        Err(err) => Err(err),
    }
}

/// Decodes an ABI-encoded `Error(string)` payload.
pub(crate) fn decode_error_string(data: &[u8]) -> Option<String> {
    if !data.starts_with(&Revert::SELECTOR) {
        return None;
    }
    Revert::abi_decode(data).ok().map(|revert| revert.reason)
}

/// Pulls a revert reason out of an RPC error response, preferring the
/// ABI-encoded data field over the node's message text.
pub(crate) fn rpc_revert_reason(err: &TransportError) -> Option<String> {
    let RpcError::ErrorResp(payload) = err else { return None };

    if let Some(raw) = payload.data.as_ref() {
        if let Ok(serde_json::Value::String(hex_data)) =
            serde_json::from_str::<serde_json::Value>(raw.get())
        {
            if let Ok(bytes) = hex::decode(hex_data.trim_start_matches("0x")) {
                if let Some(reason) = decode_error_string(&bytes) {
                    return Some(reason);
                }
            }
        }
    }

    // geth style: "execution reverted: <reason>"
    let message = payload.message.as_ref();
    message.strip_prefix("execution reverted: ").map(str::to_string)
}

/// Feeds a tagged revert reason to the collector (when one is attached) and
/// strips the tag for display.
///
/// Collection failures never escalate; a tag that fails to parse is
/// reported loudly since it indicates a genuinely malformed marker.
pub(crate) fn fold_coverage_revert(
    contract_name: &str,
    reason: String,
    agent: Option<&Arc<CoverageCollector>>,
) -> String {
    if !has_coverage_report(&reason) {
        return reason;
    }

    if let Some(agent) = agent {
        match agent.collect_coverage_revert(contract_name, &reason) {
            Ok(()) => {}
            Err(err @ CoverageError::MalformedLocation) => {
                error!("failed to collect coverage revert event: {err}");
            }
            Err(err) => {
                warn!("failed to collect coverage revert event: {err}");
            }
        }
    }

    trim_coverage_report(&reason).to_string()
}

/// Scans the receipt of `tx_hash` for coverage marker events and routes
/// them to the collector. Decode failures are logged and skipped.
pub(crate) async fn harvest_coverage_logs(
    client: &Client,
    contract: &Contract,
    context: &CoverageContext,
    agent: &Arc<CoverageCollector>,
    tx_hash: TxHash,
) -> Result<(), DeployerError> {
    let Some(receipt) = client.transaction_receipt(tx_hash).await? else {
        error!("unable to collect coverage: transaction not found");
        return Err(DeployerError::TxNotFound);
    };

    for log in receipt.inner.logs() {
        if log.topic0() != Some(&context.topic) {
            continue;
        }

        if let Err(err) =
            agent.collect_coverage_event(&contract.name, &context.event, &log.inner.data)
        {
            warn!(contract = %contract.name, "failed to collect coverage event from contract: {err}");
        }
    }

    Ok(())
}

/// Renders a decoded ABI value as JSON for CLI output. Numbers that exceed
/// 64 bits are rendered as decimal strings.
pub fn sol_value_to_json(value: &DynSolValue) -> serde_json::Value {
    use serde_json::{json, Value};

    match value {
        DynSolValue::Bool(b) => json!(b),
        DynSolValue::Int(n, _) => {
            if let Ok(small) = i64::try_from(*n) {
                json!(small)
            } else {
                json!(n.to_string())
            }
        }
        DynSolValue::Uint(n, _) => {
            if let Ok(small) = u64::try_from(*n) {
                json!(small)
            } else {
                json!(n.to_string())
            }
        }
        DynSolValue::Address(address) => json!(address.to_string()),
        DynSolValue::FixedBytes(word, size) => json!(format!("0x{}", hex::encode(&word[..*size]))),
        DynSolValue::Bytes(bytes) => json!(format!("0x{}", hex::encode(bytes))),
        DynSolValue::String(s) => json!(s),
        DynSolValue::Function(f) => json!(f.to_string()),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            Value::Array(items.iter().map(sol_value_to_json).collect())
        }
        DynSolValue::Tuple(items) => Value::Array(items.iter().map(sol_value_to_json).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_provider::{mock::Asserter, Provider, ProviderBuilder};

    #[test]
    fn test_decode_error_string() {
        let encoded = Revert { reason: "Not enough Ether provided.".to_string() }.abi_encode();
        assert_eq!(decode_error_string(&encoded).unwrap(), "Not enough Ether provided.");

        assert!(decode_error_string(&[]).is_none());
        assert!(decode_error_string(&[0x01, 0x02, 0x03, 0x04]).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_timeout_bounded() {
        // A node that never finds the receipt: the await loop must give up
        // with the distinct timeout error once the deadline expires, it must
        // never hang.
        let asserter = Asserter::new();
        for _ in 0..8 {
            asserter.push_success(&serde_json::Value::Null);
        }

        let provider = ProviderBuilder::new().connect_mocked_client(asserter);
        let client = Client {
            provider: provider.erased(),
            rpc_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(10),
        };

        let err = await_tx(&client, TxHash::ZERO, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, DeployerError::AwaitTimeout { .. }));
    }

    #[test]
    fn test_rpc_revert_reason_from_data() {
        let encoded = Revert { reason: "nope @coverage,1,2,0".to_string() }.abi_encode();
        let payload = alloy_json_rpc::ErrorPayload {
            code: 3,
            message: "execution reverted".into(),
            data: Some(
                serde_json::value::RawValue::from_string(format!(
                    "\"0x{}\"",
                    hex::encode(&encoded)
                ))
                .unwrap(),
            ),
        };
        let err: TransportError = RpcError::ErrorResp(payload);

        assert_eq!(rpc_revert_reason(&err).unwrap(), "nope @coverage,1,2,0");
    }

    #[test]
    fn test_rpc_revert_reason_from_message() {
        let payload = alloy_json_rpc::ErrorPayload {
            code: 3,
            message: "execution reverted: out of range".into(),
            data: None,
        };
        let err: TransportError = RpcError::ErrorResp(payload);

        assert_eq!(rpc_revert_reason(&err).unwrap(), "out of range");
    }

    #[test]
    fn test_sol_value_to_json() {
        let big = U256::from(10u64).pow(U256::from(30u64));

        assert_eq!(sol_value_to_json(&DynSolValue::Uint(U256::from(7u64), 256)), serde_json::json!(7));
        assert_eq!(
            sol_value_to_json(&DynSolValue::Uint(big, 256)),
            serde_json::json!("1000000000000000000000000000000")
        );
        assert_eq!(sol_value_to_json(&DynSolValue::Bool(true)), serde_json::json!(true));
        assert_eq!(
            sol_value_to_json(&DynSolValue::Bytes(vec![0xde, 0xad])),
            serde_json::json!("0xdead")
        );
        assert_eq!(
            sol_value_to_json(&DynSolValue::Array(vec![
                DynSolValue::Uint(U256::from(1u64), 256),
                DynSolValue::Uint(U256::from(2u64), 256),
            ])),
            serde_json::json!([1, 2])
        );
    }
}
