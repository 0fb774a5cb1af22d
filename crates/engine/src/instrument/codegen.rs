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

//! Synthetic AST node construction.
//!
//! Builds the coverage event definition, the per-contract coverage-id
//! constant, and the `emit ___coverage_<id>(...)` marker statements that get
//! spliced into instrumented sources. The nodes carry `src: "-1:-1:-1"` so
//! they never collide with real source locations, and fresh random internal
//! IDs so they never collide with the compiler's own node numbering.

use serde_json::{json, Value};

/// Lower bound of generated AST node IDs, far above anything solc assigns.
const ID_OFFSET: u64 = 1_000_000_000;

/// A fresh random AST node ID in `[1e9, 1e10)`.
pub(crate) fn random_ast_id() -> u64 {
    use rand::Rng;
    rand::rng().random_range(ID_OFFSET..10 * ID_OFFSET)
}

/// Encodes a number the way solc encodes literal `hexValue` fields: the hex
/// bytes of its decimal string representation.
fn ast_hex(value: u64) -> String {
    hex::encode(value.to_string())
}

fn uint64_parameter(name: &str, scope: u64) -> Value {
    json!({
        "constant": false,
        "id": random_ast_id(),
        "indexed": false,
        "mutability": "mutable",
        "name": name,
        "nameLocation": "-1:-1:-1",
        "nodeType": "VariableDeclaration",
        "scope": scope,
        "src": "-1:-1:-1",
        "stateVariable": false,
        "storageLocation": "default",
        "typeDescriptions": {
            "typeIdentifier": "t_uint64",
            "typeString": "uint64"
        },
        "typeName": {
            "id": random_ast_id(),
            "name": "uint64",
            "nodeType": "ElementaryTypeName",
            "src": "-1:-1:-1",
            "typeDescriptions": {
                "typeIdentifier": "t_uint64",
                "typeString": "uint64"
            }
        },
        "visibility": "internal"
    })
}

/// The `event ___coverage_<id>(uint64 start, uint64 end, uint64 file)`
/// definition appended to every instrumented contract.
pub(crate) fn event_definition(definition_id: u64) -> Value {
    let scope = random_ast_id();
    json!({
        "anonymous": false,
        "id": definition_id,
        "name": format!("___coverage_{definition_id}"),
        "nameLocation": "-1:-1:-1",
        "nodeType": "EventDefinition",
        "parameters": {
            "id": random_ast_id(),
            "nodeType": "ParameterList",
            "parameters": [
                uint64_parameter("start", scope),
                uint64_parameter("end", scope),
                uint64_parameter("file", scope),
            ],
            "src": "-1:-1:-1"
        },
        "src": "-1:-1:-1"
    })
}

/// The `uint64 public constant ___coverage_id_<Name> = <id>` state variable
/// that lets the deployed contract report its coverage definition ID.
pub(crate) fn id_constant(contract_name: &str, definition_id: u64) -> Value {
    json!({
        "constant": true,
        "id": random_ast_id(),
        "mutability": "constant",
        "name": format!("___coverage_id_{contract_name}"),
        "nameLocation": "-1:-1:-1",
        "nodeType": "VariableDeclaration",
        "scope": random_ast_id(),
        "src": "-1:-1:-1",
        "stateVariable": true,
        "storageLocation": "default",
        "typeDescriptions": {
            "typeIdentifier": "t_uint64",
            "typeString": "uint64"
        },
        "typeName": {
            "id": random_ast_id(),
            "name": "uint64",
            "nodeType": "ElementaryTypeName",
            "src": "-1:-1:-1",
            "typeDescriptions": {
                "typeIdentifier": "t_uint64",
                "typeString": "uint64"
            }
        },
        "value": {
            "hexValue": ast_hex(definition_id),
            "id": random_ast_id(),
            "isConstant": false,
            "isLValue": false,
            "isPure": true,
            "kind": "number",
            "lValueRequested": false,
            "nodeType": "Literal",
            "src": "-1:-1:-1",
            "typeDescriptions": {
                "typeIdentifier": format!("t_rational_{definition_id}_by_1"),
                "typeString": format!("int_const {definition_id}")
            },
            "value": definition_id.to_string()
        },
        "visibility": "public"
    })
}

fn number_literal(value: u64) -> Value {
    json!({
        "hexValue": ast_hex(value),
        "id": random_ast_id(),
        "isConstant": false,
        "isLValue": false,
        "isPure": true,
        "kind": "number",
        "lValueRequested": false,
        "nodeType": "Literal",
        "src": "-1:-1:-1",
        "typeDescriptions": {
            "typeIdentifier": format!("t_rational_{value}_by_1"),
            "typeString": format!("int_const {value}")
        },
        "value": value.to_string()
    })
}

fn number_argument_type(value: u64) -> Value {
    json!({
        "typeIdentifier": format!("t_rational_{value}_by_1"),
        "typeString": format!("int_const {value}")
    })
}

/// An `emit ___coverage_<id>(start, end, file)` statement, spliced in front
/// of the statement whose execution it records.
pub(crate) fn coverage_marker(definition_id: u64, start: u64, end: u64, file: u64) -> Value {
    json!({
        "eventCall": {
            "arguments": [
                number_literal(start),
                number_literal(end),
                number_literal(file),
            ],
            "expression": {
                "argumentTypes": [
                    number_argument_type(start),
                    number_argument_type(end),
                    number_argument_type(file),
                ],
                "id": random_ast_id(),
                "name": format!("___coverage_{definition_id}"),
                "nodeType": "Identifier",
                "overloadedDeclarations": [],
                "referencedDeclaration": definition_id,
                "src": "-1:-1:-1",
                "typeDescriptions": {
                    "typeIdentifier": "t_function_event_nonpayable$_t_uint64_$_t_uint64_$_t_uint64_$returns$__$",
                    "typeString": "function (uint64,uint64,uint64)"
                }
            },
            "id": random_ast_id(),
            "isConstant": false,
            "isLValue": false,
            "isPure": false,
            "kind": "functionCall",
            "lValueRequested": false,
            "names": [],
            "nodeType": "FunctionCall",
            "src": "-1:-1:-1",
            "tryCall": false,
            "typeDescriptions": {
                "typeIdentifier": "t_tuple$__$",
                "typeString": "tuple()"
            }
        },
        "id": random_ast_id(),
        "nodeType": "EmitStatement",
        "src": "-1:-1:-1"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ast_hex_is_hex_of_decimal_digits() {
        assert_eq!(ast_hex(42), "3432");
        assert_eq!(ast_hex(0), "30");
        assert_eq!(ast_hex(1070000001), "31303730303030303031");
    }

    #[test]
    fn test_event_definition_shape() {
        let def = event_definition(1234567890);
        assert_eq!(def["nodeType"], "EventDefinition");
        assert_eq!(def["name"], "___coverage_1234567890");
        let params = def["parameters"]["parameters"].as_array().unwrap();
        assert_eq!(params.len(), 3);
        assert_eq!(params[0]["name"], "start");
        assert_eq!(params[1]["name"], "end");
        assert_eq!(params[2]["name"], "file");
    }

    #[test]
    fn test_marker_references_event_definition() {
        let marker = coverage_marker(1234567890, 10, 20, 0);
        assert_eq!(marker["nodeType"], "EmitStatement");
        assert_eq!(marker["src"], "-1:-1:-1");
        let call = &marker["eventCall"];
        assert_eq!(call["expression"]["referencedDeclaration"], 1234567890);
        assert_eq!(call["arguments"][0]["value"], "10");
        assert_eq!(call["arguments"][1]["value"], "20");
        assert_eq!(call["arguments"][2]["value"], "0");
    }

    #[test]
    fn test_id_constant_value() {
        let constant = id_constant("Counter", 1234567890);
        assert_eq!(constant["name"], "___coverage_id_Counter");
        assert_eq!(constant["value"]["value"], "1234567890");
        assert!(constant["constant"].as_bool().unwrap());
    }
}
