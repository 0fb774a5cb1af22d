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

//! End-to-end instrumentation checks against a realistic solc AST shape.

#![recursion_limit = "256"]

use serde_json::{json, Value};
use soldep_engine::add_coverage_markers;

/// A trimmed-down (but structurally faithful) combined-JSON AST of:
///
/// ```solidity
/// contract Vault {
///     uint256 balance;
///     function withdraw(uint256 amount) public {
///         require(balance >= amount, "insufficient");
///         if (amount > 0) {
///             balance -= amount;
///         }
///         emit Withdrawn(amount);
///     }
/// }
/// ```
fn vault_ast() -> Value {
    json!({
        "absolutePath": "vault.sol",
        "exportedSymbols": { "Vault": [52] },
        "id": 53,
        "nodeType": "SourceUnit",
        "src": "0:321:0",
        "nodes": [
            {
                "id": 1,
                "literals": ["solidity", "^", "0.8", ".0"],
                "nodeType": "PragmaDirective",
                "src": "0:23:0"
            },
            {
                "abstract": false,
                "contractDependencies": [],
                "contractKind": "contract",
                "id": 52,
                "name": "Vault",
                "nodeType": "ContractDefinition",
                "src": "25:296:0",
                "nodes": [
                    {
                        "constant": false,
                        "id": 3,
                        "mutability": "mutable",
                        "name": "balance",
                        "nodeType": "VariableDeclaration",
                        "src": "47:15:0",
                        "stateVariable": true,
                        "visibility": "internal"
                    },
                    {
                        "id": 51,
                        "implemented": true,
                        "kind": "function",
                        "name": "withdraw",
                        "nodeType": "FunctionDefinition",
                        "src": "69:250:0",
                        "stateMutability": "nonpayable",
                        "visibility": "public",
                        "body": {
                            "id": 50,
                            "nodeType": "Block",
                            "src": "112:207:0",
                            "statements": [
                                {
                                    "id": 20,
                                    "nodeType": "ExpressionStatement",
                                    "src": "122:44:0",
                                    "expression": {
                                        "id": 19,
                                        "kind": "functionCall",
                                        "nodeType": "FunctionCall",
                                        "src": "122:43:0",
                                        "expression": {
                                            "id": 14,
                                            "name": "require",
                                            "nodeType": "Identifier",
                                            "src": "122:7:0",
                                            "argumentTypes": [
                                                { "typeIdentifier": "t_bool", "typeString": "bool" },
                                                {
                                                    "typeIdentifier": "literal_string \"insufficient\"",
                                                    "typeString": "t_stringliteral_8c3d"
                                                }
                                            ]
                                        },
                                        "arguments": [
                                            {
                                                "id": 17,
                                                "nodeType": "BinaryOperation",
                                                "operator": ">=",
                                                "src": "130:17:0"
                                            },
                                            {
                                                "hexValue": "696e73756666696369656e74",
                                                "id": 18,
                                                "kind": "string",
                                                "nodeType": "Literal",
                                                "src": "149:14:0",
                                                "value": "insufficient",
                                                "typeDescriptions": {
                                                    "typeIdentifier": "literal_string \"insufficient\"",
                                                    "typeString": "t_stringliteral_8c3d"
                                                }
                                            }
                                        ]
                                    }
                                },
                                {
                                    "id": 40,
                                    "nodeType": "IfStatement",
                                    "src": "176:76:0",
                                    "condition": {
                                        "id": 23,
                                        "nodeType": "BinaryOperation",
                                        "operator": ">",
                                        "src": "180:10:0"
                                    },
                                    "trueBody": {
                                        "id": 39,
                                        "nodeType": "Block",
                                        "src": "192:60:0",
                                        "statements": [
                                            {
                                                "id": 38,
                                                "nodeType": "ExpressionStatement",
                                                "src": "206:17:0",
                                                "expression": {
                                                    "id": 37,
                                                    "nodeType": "Assignment",
                                                    "operator": "-=",
                                                    "src": "206:17:0"
                                                }
                                            }
                                        ]
                                    }
                                },
                                {
                                    "id": 49,
                                    "nodeType": "EmitStatement",
                                    "src": "262:23:0",
                                    "eventCall": {
                                        "id": 48,
                                        "kind": "functionCall",
                                        "nodeType": "FunctionCall",
                                        "src": "267:17:0"
                                    }
                                }
                            ]
                        }
                    }
                ]
            }
        ]
    })
}

#[test]
fn test_vault_instrumentation_records_every_statement() {
    let (instrumented, statements) = add_coverage_markers(0, "Vault", &vault_ast()).unwrap();

    // require, if, inner assignment, emit: four executable statements.
    assert_eq!(
        statements,
        vec![[122, 44, 0], [176, 76, 0], [206, 17, 0], [262, 23, 0]]
    );

    // The contract gained the synthetic event and the id constant.
    let contract_nodes = instrumented["nodes"][1]["nodes"].as_array().unwrap();
    assert_eq!(contract_nodes.len(), 4);
    assert_eq!(contract_nodes[2]["nodeType"], "EventDefinition");
    assert_eq!(contract_nodes[3]["name"].as_str().unwrap(), "___coverage_id_Vault");

    let body = instrumented["nodes"][1]["nodes"][1]["body"]["statements"].as_array().unwrap();

    // require is tag-rewritten in place, the other two top-level statements
    // each gained one preceding marker: 1 + (2 * 2) = 5 nodes.
    assert_eq!(body.len(), 5);
    assert_eq!(body[0]["src"], "122:44:0");
    assert_eq!(body[1]["nodeType"], "EmitStatement");
    assert_eq!(body[1]["src"], "-1:-1:-1");
    assert_eq!(body[2]["src"], "176:76:0");
    assert_eq!(body[3]["nodeType"], "EmitStatement");
    assert_eq!(body[4]["src"], "262:23:0");

    // The require message now carries the coverage tag.
    let tagged = body[0]["expression"]["arguments"][1]["value"].as_str().unwrap();
    assert_eq!(tagged, "insufficient @coverage,122,44,0");

    // The if body was instrumented recursively.
    let inner = body[2]["trueBody"]["statements"].as_array().unwrap();
    assert_eq!(inner.len(), 2);
    assert_eq!(inner[0]["nodeType"], "EmitStatement");
    assert_eq!(inner[1]["src"], "206:17:0");
}

#[test]
fn test_instrumented_ast_round_trips_through_serde() {
    let (instrumented, _) = add_coverage_markers(0, "Vault", &vault_ast()).unwrap();

    let raw = serde_json::to_vec(&instrumented).unwrap();
    let reparsed: Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(reparsed, instrumented);

    // Unknown solc fields survive untouched for the --import-ast pass.
    assert_eq!(reparsed["exportedSymbols"]["Vault"][0], 52);
    assert_eq!(reparsed["nodes"][1]["nodes"][0]["name"], "balance");
}

#[test]
fn test_view_functions_demoted_everywhere() {
    let mut ast = vault_ast();
    ast["nodes"][1]["nodes"][1]["stateMutability"] = json!("view");

    let (instrumented, _) = add_coverage_markers(0, "Vault", &ast).unwrap();
    assert_eq!(instrumented["nodes"][1]["nodes"][1]["stateMutability"], "nonpayable");
}

#[test]
fn test_file_index_flows_into_recorded_locations() {
    let mut ast = vault_ast();
    // Pretend this source sits at index 2 of the compilation unit.
    fn rewrite_src(value: &mut Value) {
        match value {
            Value::Object(obj) => {
                if let Some(src) = obj.get_mut("src") {
                    if let Some(text) = src.as_str() {
                        if let Some(prefix) = text.strip_suffix(":0") {
                            *src = json!(format!("{prefix}:2"));
                        }
                    }
                }
                for child in obj.values_mut() {
                    rewrite_src(child);
                }
            }
            Value::Array(items) => items.iter_mut().for_each(rewrite_src),
            _ => {}
        }
    }
    rewrite_src(&mut ast);

    let (_, statements) = add_coverage_markers(2, "Vault", &ast).unwrap();
    assert!(statements.iter().all(|loc| loc[2] == 2));
}
