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

//! Coverage instrumentation of solc syntax trees.
//!
//! This module rewrites the JSON AST that solc emits in combined-JSON mode
//! so that every executable statement announces its own execution:
//!
//! - each non-interface contract definition gains a synthetic
//!   `___coverage_<id>` event and a `___coverage_id_<Name>` constant,
//! - every `view`/`pure` function is demoted to `nonpayable`, since the
//!   injected markers are event emissions and require a mutating context,
//! - every statement is preceded by an `emit ___coverage_<id>(start, end,
//!   file)` marker, except `require(cond, "msg")` calls, whose message
//!   literal is instead tagged with an ` @coverage,<start>,<end>,<file>`
//!   suffix so the failing branch is recoverable from the revert reason.
//!
//! The tree is mutated through typed node-kind classification and explicit
//! child-list splicing. Nested blocks are processed in post-order: a
//! statement's inner blocks are fully instrumented before the statement is
//! spliced back into its parent's list, so splice offsets of outer blocks
//! are never invalidated by later inner rewrites.
//!
//! Fields the instrumenter does not understand are preserved verbatim, which
//! is what lets the patched tree round-trip through `solc --import-ast`.

use alloy_primitives::keccak256;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::StatementLoc;

mod codegen;

type JsonMap = Map<String, Value>;

/// Errors produced while instrumenting a source AST.
#[derive(Debug, Error)]
pub enum InstrumentError {
    /// A statement node carries no `src` reference.
    #[error("statement without src reference")]
    StatementWithoutSrc,
    /// A `src` reference does not split into `start:length:file`.
    #[error("src reference has wrong amount of parts: {0}")]
    MalformedSrc(usize),
    /// A `Block` node has no `statements` list.
    #[error("expected statements in the block")]
    BlockWithoutStatements,
    /// Any other structural surprise in the tree.
    #[error("malformed AST node: {0}")]
    MalformedNode(String),
}

/// The node kinds the instrumenter distinguishes. Every other node passes
/// through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    ContractDefinition,
    Block,
    FunctionCall,
}

fn kind_of(node: &JsonMap) -> Option<NodeKind> {
    match node.get("nodeType")?.as_str()? {
        "ContractDefinition" => Some(NodeKind::ContractDefinition),
        "Block" => Some(NodeKind::Block),
        "FunctionCall" => Some(NodeKind::FunctionCall),
        _ => None,
    }
}

/// A byte range within one source file, as encoded by solc `src` fields:
/// `start:length:file`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    /// Byte offset of the first character.
    pub start: i64,
    /// Length of the range in bytes.
    pub length: i64,
    /// Index of the source file within the compilation unit.
    pub file: i64,
}

impl SourceSpan {
    fn parse(src: &str) -> Result<Self, InstrumentError> {
        let parts: Vec<&str> = src.split(':').collect();
        if parts.len() != 3 {
            return Err(InstrumentError::MalformedSrc(parts.len()));
        }

        // solc only emits decimal (possibly negative) components here, so a
        // parse failure counts as a malformed reference.
        let mut nums = [0i64; 3];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| InstrumentError::MalformedSrc(parts.len()))?;
        }

        Ok(Self { start: nums[0], length: nums[1], file: nums[2] })
    }

    fn as_loc(&self) -> StatementLoc {
        [self.start, self.length, self.file]
    }
}

/// Rewrites the AST of one source file and returns the patched tree together
/// with the ordered list of recorded statement locations.
///
/// `file_idx` is the file's index within the compilation unit; it offsets
/// the per-compilation random definition ID so that per-file event topics
/// stay distinct within one compilation unit.
pub fn add_coverage_markers(
    file_idx: usize,
    contract_name: &str,
    ast: &Value,
) -> Result<(Value, Vec<StatementLoc>), InstrumentError> {
    let definition_id = codegen::random_ast_id() + file_idx as u64;

    let mut ast = ast.clone();
    append_contract_declarations(&mut ast, contract_name, definition_id)?;
    demote_view_mutability(&mut ast);

    let mut instrumenter = Instrumenter { definition_id, statements: Vec::new() };
    instrumenter.visit(&mut ast)?;

    Ok((ast, instrumenter.statements))
}

/// Appends the coverage event definition and the coverage-id constant to the
/// node list of every non-interface contract definition in the file.
fn append_contract_declarations(
    ast: &mut Value,
    contract_name: &str,
    definition_id: u64,
) -> Result<(), InstrumentError> {
    let root = ast
        .as_object_mut()
        .ok_or_else(|| InstrumentError::MalformedNode("source unit is not an object".into()))?;

    let Some(nodes) = root.get_mut("nodes").and_then(Value::as_array_mut) else {
        return Err(InstrumentError::MalformedNode("source unit without nodes".into()));
    };

    for node in nodes {
        let Some(obj) = node.as_object_mut() else { continue };
        if kind_of(obj) != Some(NodeKind::ContractDefinition) {
            continue;
        }
        if obj.get("contractKind").and_then(Value::as_str) == Some("interface") {
            continue;
        }

        let Some(contract_nodes) = obj.get_mut("nodes").and_then(Value::as_array_mut) else {
            return Err(InstrumentError::MalformedNode("contract definition without nodes".into()));
        };

        contract_nodes.push(codegen::event_definition(definition_id));
        contract_nodes.push(codegen::id_constant(contract_name, definition_id));
    }

    Ok(())
}

/// Rewrites every `view`/`pure` state mutability in the file to
/// `nonpayable`. Yul subtrees (`"AST"` keys of inline assembly) are left
/// alone.
fn demote_view_mutability(value: &mut Value) {
    match value {
        Value::Object(obj) => {
            if let Some(mutability) = obj.get_mut("stateMutability") {
                if matches!(mutability.as_str(), Some("view") | Some("pure")) {
                    *mutability = Value::String("nonpayable".into());
                }
            }
            for (key, child) in obj.iter_mut() {
                if key == "AST" {
                    continue;
                }
                demote_view_mutability(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                demote_view_mutability(item);
            }
        }
        _ => {}
    }
}

struct Instrumenter {
    definition_id: u64,
    statements: Vec<StatementLoc>,
}

impl Instrumenter {
    /// Walks the tree looking for lexical blocks. Once a block is found its
    /// entire subtree is handled by [`Self::instrument_block`], so the walk
    /// does not descend into it again. Yul subtrees are skipped.
    fn visit(&mut self, value: &mut Value) -> Result<(), InstrumentError> {
        match value {
            Value::Object(obj) => {
                if kind_of(obj) == Some(NodeKind::Block) {
                    return self.instrument_block(obj);
                }
                for (key, child) in obj.iter_mut() {
                    if key == "AST" {
                        continue;
                    }
                    self.visit(child)?;
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.visit(item)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Instruments one block: records every statement's span, recursively
    /// instruments blocks nested inside each statement, then rebuilds the
    /// statement list with markers spliced in (or the require message
    /// tagged).
    fn instrument_block(&mut self, block: &mut JsonMap) -> Result<(), InstrumentError> {
        let list = block
            .get("statements")
            .and_then(Value::as_array)
            .ok_or(InstrumentError::BlockWithoutStatements)?
            .clone();

        let mut spliced = Vec::with_capacity(list.len() * 2);

        for mut stmt in list {
            let span = statement_span(&stmt)?;
            self.statements.push(span.as_loc());

            // Post-order: inner blocks first, so this statement is final
            // before it lands in the parent's list. A statement that is
            // itself a block is instrumented whole.
            self.visit(&mut stmt)?;

            if rewrite_require_message(&mut stmt, span) {
                spliced.push(stmt);
            } else {
                spliced.push(codegen::coverage_marker(
                    self.definition_id,
                    span.start.max(0) as u64,
                    span.length.max(0) as u64,
                    span.file.max(0) as u64,
                ));
                spliced.push(stmt);
            }
        }

        block.insert("statements".into(), Value::Array(spliced));
        Ok(())
    }
}

/// Resolves the source span of one statement.
///
/// A statement that is itself a block (e.g. an `if` body) only gets credit
/// for its "head": the effective length runs up to the start of its first
/// child statement, so the marker does not claim the whole compound body.
fn statement_span(stmt: &Value) -> Result<SourceSpan, InstrumentError> {
    let obj = stmt
        .as_object()
        .ok_or_else(|| InstrumentError::MalformedNode("statement is not an object".into()))?;

    let src = obj
        .get("src")
        .and_then(Value::as_str)
        .ok_or(InstrumentError::StatementWithoutSrc)?;
    let mut span = SourceSpan::parse(src)?;

    if kind_of(obj) != Some(NodeKind::Block) {
        return Ok(span);
    }

    let Some(inner) = obj.get("statements").and_then(Value::as_array) else {
        return Ok(span);
    };
    let Some(first) = inner.first() else {
        return Ok(span);
    };

    let first_src = first
        .as_object()
        .and_then(|node| node.get("src"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            InstrumentError::MalformedNode("statement expected to have src reference".into())
        })?;
    let first_span = SourceSpan::parse(first_src)?;

    if first_span.file != span.file {
        return Err(InstrumentError::MalformedNode(format!(
            "wrong inner statement src reference: {first_src}"
        )));
    }

    span.length = first_span.start - span.start;
    Ok(span)
}

/// Tags the message literal of a `require(cond, "msg")` call with the
/// coverage suffix, keeping the literal's derived type-string and hex fields
/// consistent with the new value.
///
/// Returns `false` — meaning "treat as an ordinary statement" — whenever the
/// node does not structurally match a two-argument require with a string
/// literal message.
fn rewrite_require_message(stmt: &mut Value, span: SourceSpan) -> bool {
    let Some(obj) = stmt.as_object() else { return false };

    let Some(expr) = obj.get("expression").and_then(Value::as_object) else { return false };
    if kind_of(expr) != Some(NodeKind::FunctionCall) {
        return false;
    }

    let Some(callee) = expr.get("expression").and_then(Value::as_object) else { return false };
    if callee.get("name").and_then(Value::as_str) != Some("require") {
        return false;
    }

    let Some(message) = expr
        .get("arguments")
        .and_then(Value::as_array)
        .and_then(|args| args.get(1))
        .and_then(|arg| arg.get("value"))
        .and_then(Value::as_str)
    else {
        return false;
    };

    let tagged = format!("{message} @coverage,{},{},{}", span.start, span.length, span.file);
    let hash = hex::encode(keccak256(tagged.as_bytes()));
    let type_string = format!("t_stringliteral_{hash}");
    let type_identifier = format!("literal_string \"{tagged}\"");
    let hex_value = hex::encode(&tagged);

    // All structural checks passed; now mutate in place.
    let Some(expr) = stmt.get_mut("expression") else { return false };

    if let Some(arg) = expr
        .get_mut("arguments")
        .and_then(Value::as_array_mut)
        .and_then(|args| args.get_mut(1))
        .and_then(Value::as_object_mut)
    {
        arg.insert("value".into(), Value::String(tagged));
        arg.insert("hexValue".into(), Value::String(hex_value));
        if let Some(descriptions) =
            arg.get_mut("typeDescriptions").and_then(Value::as_object_mut)
        {
            descriptions.insert("typeString".into(), Value::String(type_string.clone()));
            descriptions.insert("typeIdentifier".into(), Value::String(type_identifier.clone()));
        }
    }

    if let Some(arg_type) = expr
        .get_mut("expression")
        .and_then(|callee| callee.get_mut("argumentTypes"))
        .and_then(Value::as_array_mut)
        .and_then(|types| types.get_mut(1))
        .and_then(Value::as_object_mut)
    {
        arg_type.insert("typeString".into(), Value::String(type_string));
        arg_type.insert("typeIdentifier".into(), Value::String(type_identifier));
    }

    true
}
