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

//! Soldep Common - Shared functionality for soldep components
//!
//! This crate provides shared utilities used by both the soldep binary
//! and the engine crate, including the build-artifact cache layer and
//! logging setup.

/// Caching utilities for storing and retrieving build artifacts on disk
pub mod cache;
/// Logging setup and utilities for consistent logging across soldep components
pub mod logging;

pub use cache::*;
pub use logging::*;
