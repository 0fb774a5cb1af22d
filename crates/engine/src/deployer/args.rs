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

//! Positional string arguments to ABI-typed values.
//!
//! Maps the strings a user passes on the command line onto the
//! [`DynSolValue`] variants the encoder consumes, guided by the ABI input
//! types of the target method or constructor. Covers signed and unsigned
//! integers of every width (big-integer backed), bool, string, address,
//! fixed and dynamic bytes, and one level of comma-separated arrays of the
//! above. Nested arrays are not supported.

use alloy_dyn_abi::{DynSolType, DynSolValue, Specifier};
use alloy_json_abi::Param;
use alloy_primitives::{Address, B256, I256, U256};
use thiserror::Error;

/// Argument mapping failures.
#[derive(Debug, Error)]
pub enum ArgError {
    /// The argument count does not match the ABI input count.
    #[error("wrong args count, expected {expected} but got {got}")]
    CountMismatch {
        /// Inputs the ABI declares.
        expected: usize,
        /// Arguments actually supplied.
        got: usize,
    },
    /// One argument failed to parse as its ABI type.
    #[error("argument {name} (idx {index}) type {ty} failed to parse: {value}")]
    Parse {
        /// ABI input name.
        name: String,
        /// Positional index of the argument.
        index: usize,
        /// ABI type the argument was expected to be.
        ty: String,
        /// The offending value.
        value: String,
    },
    /// Arrays of arrays are a non-goal.
    #[error("wrong argument {name} (idx {index}) - nested arrays unsupported")]
    NestedArray {
        /// ABI input name.
        name: String,
        /// Positional index of the argument.
        index: usize,
    },
    /// The ABI declares a type the mapper does not cover.
    #[error("argument {name} (idx {index}) has unsupported type: {ty}")]
    UnsupportedType {
        /// ABI input name.
        name: String,
        /// Positional index of the argument.
        index: usize,
        /// The unsupported ABI type.
        ty: String,
    },
    /// The ABI input type string itself did not resolve.
    #[error("failed to resolve ABI type: {0}")]
    TypeResolve(#[from] alloy_dyn_abi::Error),
}

/// Maps positional string arguments onto the ABI input types.
pub fn map_string_args(inputs: &[Param], args: &[String]) -> Result<Vec<DynSolValue>, ArgError> {
    if inputs.len() != args.len() {
        return Err(ArgError::CountMismatch { expected: inputs.len(), got: args.len() });
    }

    inputs
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (input, arg))| {
            let ty = input.resolve()?;
            map_input(index, 0, arg, &ty, &input.name)
        })
        .collect()
}

fn parse_error(index: usize, name: &str, ty: &DynSolType, value: &str) -> ArgError {
    ArgError::Parse {
        name: name.to_string(),
        index,
        ty: ty.to_string(),
        value: value.to_string(),
    }
}

fn map_input(
    index: usize,
    level: u8,
    arg: &str,
    ty: &DynSolType,
    name: &str,
) -> Result<DynSolValue, ArgError> {
    match ty {
        DynSolType::Int(size) => {
            let value =
                I256::from_dec_str(arg).map_err(|_| parse_error(index, name, ty, arg))?;
            Ok(DynSolValue::Int(value, *size))
        }
        DynSolType::Uint(size) => {
            let value = U256::from_str_radix(arg, 10)
                .map_err(|_| parse_error(index, name, ty, arg))?;
            Ok(DynSolValue::Uint(value, *size))
        }
        DynSolType::Bool => Ok(DynSolValue::Bool(arg.eq_ignore_ascii_case("true"))),
        DynSolType::String => Ok(DynSolValue::String(arg.to_string())),
        DynSolType::Address => {
            let address: Address = arg.parse().map_err(|_| parse_error(index, name, ty, arg))?;
            Ok(DynSolValue::Address(address))
        }
        DynSolType::Bytes => {
            let bytes = decode_hex(arg).ok_or_else(|| parse_error(index, name, ty, arg))?;
            Ok(DynSolValue::Bytes(bytes))
        }
        DynSolType::FixedBytes(size) => {
            let bytes = decode_hex(arg).ok_or_else(|| parse_error(index, name, ty, arg))?;
            let mut word = B256::ZERO;
            let len = bytes.len().min(*size).min(32);
            word[..len].copy_from_slice(&bytes[..len]);
            Ok(DynSolValue::FixedBytes(word, *size))
        }
        DynSolType::Array(element) => {
            let items = map_array_elements(index, level, arg, element, name)?;
            Ok(DynSolValue::Array(items))
        }
        DynSolType::FixedArray(element, _) => {
            let items = map_array_elements(index, level, arg, element, name)?;
            Ok(DynSolValue::FixedArray(items))
        }
        other => Err(ArgError::UnsupportedType {
            name: name.to_string(),
            index,
            ty: other.to_string(),
        }),
    }
}

fn map_array_elements(
    index: usize,
    level: u8,
    arg: &str,
    element: &DynSolType,
    name: &str,
) -> Result<Vec<DynSolValue>, ArgError> {
    if level > 0 {
        return Err(ArgError::NestedArray { name: name.to_string(), index });
    }

    arg.split(',')
        .enumerate()
        .map(|(element_idx, element_arg)| {
            map_input(index, level + 1, element_arg, element, &format!("{name}[{element_idx}]"))
        })
        .collect()
}

fn decode_hex(arg: &str) -> Option<Vec<u8>> {
    hex::decode(arg.trim_start_matches("0x")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, ty: &str) -> Param {
        Param {
            ty: ty.to_string(),
            name: name.to_string(),
            components: Vec::new(),
            internal_type: None,
        }
    }

    fn one(ty: &str, arg: &str) -> Result<DynSolValue, ArgError> {
        map_string_args(&[param("a", ty)], &[arg.to_string()]).map(|mut v| v.remove(0))
    }

    #[test]
    fn test_uint256_decimal() {
        let value = one("uint256", "42").unwrap();
        assert_eq!(value, DynSolValue::Uint(U256::from(42u64), 256));

        // The packed representation is the 32-byte big-endian encoding.
        let encoded = value.abi_encode();
        let mut expected = [0u8; 32];
        expected[31] = 42;
        assert_eq!(encoded, expected);
    }

    #[test]
    fn test_small_widths_keep_declared_size() {
        assert_eq!(one("uint8", "255").unwrap(), DynSolValue::Uint(U256::from(255u64), 8));
        assert_eq!(
            one("int8", "-5").unwrap(),
            DynSolValue::Int(I256::from_dec_str("-5").unwrap(), 8)
        );
    }

    #[test]
    fn test_bool_values() {
        assert_eq!(one("bool", "true").unwrap(), DynSolValue::Bool(true));
        assert_eq!(one("bool", "TRUE").unwrap(), DynSolValue::Bool(true));
        assert_eq!(one("bool", "false").unwrap(), DynSolValue::Bool(false));
        // anything that is not "true" maps to false
        assert_eq!(one("bool", "yes").unwrap(), DynSolValue::Bool(false));
    }

    #[test]
    fn test_address_and_bytes() {
        let addr = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
        assert_eq!(
            one("address", addr).unwrap(),
            DynSolValue::Address(addr.parse().unwrap())
        );

        assert_eq!(one("bytes", "0xdeadbeef").unwrap(), DynSolValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(one("bytes", "deadbeef").unwrap(), DynSolValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef]));
    }

    #[test]
    fn test_fixed_bytes_left_aligned() {
        let value = one("bytes4", "0x01020304").unwrap();
        match value {
            DynSolValue::FixedBytes(word, 4) => {
                assert_eq!(&word[..4], &[1, 2, 3, 4]);
                assert_eq!(&word[4..], &[0u8; 28]);
            }
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_array_of_uints() {
        let value = one("uint256[]", "1,2,3").unwrap();
        assert_eq!(
            value,
            DynSolValue::Array(vec![
                DynSolValue::Uint(U256::from(1u64), 256),
                DynSolValue::Uint(U256::from(2u64), 256),
                DynSolValue::Uint(U256::from(3u64), 256),
            ])
        );
    }

    #[test]
    fn test_nested_array_rejected() {
        let err = one("uint256[][]", "1,2").unwrap_err();
        assert!(matches!(err, ArgError::NestedArray { .. }));
    }

    #[test]
    fn test_count_mismatch() {
        let err = map_string_args(&[param("a", "uint256")], &[]).unwrap_err();
        assert!(matches!(err, ArgError::CountMismatch { expected: 1, got: 0 }));
    }

    #[test]
    fn test_parse_failure_names_argument() {
        let err = one("uint256", "not-a-number").unwrap_err();
        match err {
            ArgError::Parse { name, index, .. } => {
                assert_eq!(name, "a");
                assert_eq!(index, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
