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

//! Logging configuration for soldep components
//!
//! Provides centralized logging setup with:
//! - Structured console output
//! - Environment variable support (RUST_LOG)
//! - Default level override from the CLI

use std::sync::Once;

use eyre::Result;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

static TEST_LOGGING_INIT: Once = Once::new();

/// Initialize logging for soldep components.
///
/// The filter is taken from `RUST_LOG` when set, otherwise `default_level`
/// is used. Returns an error if a global subscriber is already installed.
pub fn init_logging(default_level: Level) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level.to_string().to_lowercase()))?;

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| eyre::eyre!("failed to install tracing subscriber: {err}"))?;

    Ok(())
}

/// Ensure logging is initialized exactly once in tests.
///
/// Safe to call from any number of tests in the same process; initialization
/// failures are ignored since they only mean a subscriber is already set up.
pub fn ensure_test_logging() {
    TEST_LOGGING_INIT.call_once(|| {
        let _ = init_logging(Level::INFO);
    });
}
