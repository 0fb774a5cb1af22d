//! Soldep - EVM Contract Deployer
//!
//! Deploys arbitrary contracts on an arbitrary EVM chain, with optional
//! source-level statement coverage. Requires solc 0.6.x or later.

use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use eyre::Result;
use tracing::Level;

mod cmd;

/// Command-line interface for soldep
#[derive(Debug, Parser)]
#[command(name = "soldep")]
#[command(about = "Deploys arbitrary contracts on an arbitrary EVM chain. Requires solc 0.6.x or later.")]
#[command(version)]
pub struct Cli {
    /// Path to the solc executable. Found using `which` otherwise
    #[arg(long, env = "DEPLOYER_SOLC_PATH")]
    pub solc_path: Option<PathBuf>,

    /// Contract name to use
    #[arg(short = 'N', long, env = "DEPLOYER_CONTRACT_NAME", default_value = "Counter")]
    pub name: String,

    /// Path of the .sol source file of the contract
    #[arg(
        short = 'S',
        long,
        env = "DEPLOYER_SOL_SOURCE_FILE",
        default_value = "contracts/Counter.sol"
    )]
    pub source: PathBuf,

    /// Allowed paths for solc, for importing contracts from outside the workdir
    #[arg(long, env = "DEPLOYER_SOL_ALLOWED_PATHS", value_delimiter = ',')]
    pub allowed_paths: Vec<PathBuf>,

    /// JSON-RPC endpoint for accessing the Ethereum node
    #[arg(short = 'E', long, env = "DEPLOYER_RPC_URI", default_value = "http://localhost:8545")]
    pub endpoint: String,

    /// Overall timeout of an RPC request (e.g. 15s)
    #[arg(long, env = "DEPLOYER_RPC_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub rpc_timeout: Duration,

    /// Overall timeout of a transaction, including confirmation await (e.g. 50s)
    #[arg(long, env = "DEPLOYER_TX_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub tx_timeout: Duration,

    /// Overall timeout of an EVM call (e.g. 15s)
    #[arg(long, env = "DEPLOYER_CALL_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub call_timeout: Duration,

    /// Override the estimated gas price
    #[arg(short = 'G', long, env = "DEPLOYER_TX_GAS_PRICE")]
    pub gas_price: Option<u128>,

    /// Set the maximum gas for tx; estimated when not given
    #[arg(short = 'L', long, env = "DEPLOYER_TX_GAS_LIMIT")]
    pub gas_limit: Option<u64>,

    /// Cache dir for build artifacts
    #[arg(long, env = "DEPLOYER_CACHE_DIR", default_value = "build")]
    pub cache_dir: PathBuf,

    /// Disables the build cache completely
    #[arg(long, env = "DEPLOYER_DISABLE_CACHE")]
    pub no_cache: bool,

    /// Enables code coverage collection
    #[arg(long = "cover", env = "DEPLOYER_ENABLE_COVERAGE")]
    pub coverage: bool,

    /// Coverage report mode: count or set
    #[arg(long, env = "DEPLOYER_COVERAGE_MODE", default_value = "count")]
    pub cover_mode: String,

    /// Write the coverage text profile to this file after the command
    #[arg(long, env = "DEPLOYER_COVERAGE_PROFILE")]
    pub cover_profile: Option<PathBuf>,

    /// Write an HTML coverage report to this file after the command
    #[arg(long, env = "DEPLOYER_COVERAGE_HTML")]
    pub cover_html: Option<PathBuf>,

    /// Signature scheme: eip155 or homestead
    #[arg(long, env = "DEPLOYER_SIGNER_TYPE", default_value = "eip155")]
    pub signer_type: String,

    /// Sender private key in hex
    #[arg(short = 'P', long = "from-pk", env = "DEPLOYER_FROM_PK")]
    pub from_pk: Option<String>,

    /// Available levels: error, warn, info, debug
    #[arg(short = 'l', long, env = "DEPLOYER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Builds the given contract and caches build artifacts. Optional step.
    Build {
        /// Print the standard-JSON compiler input instead of the bytecode
        #[arg(long)]
        standard_json: bool,
    },
    /// Deploys the given contract on the EVM chain. Caches build artifacts.
    Deploy {
        /// Produce hex-encoded contract bytecode only. Do not interact with RPC.
        #[arg(long)]
        bytecode: bool,
        /// Do not await transaction confirmation from the RPC
        #[arg(long)]
        no_await: bool,
        /// Contract constructor's arguments. Will be ABI-encoded.
        args: Vec<String>,
    },
    /// Creates a transaction for a particular contract method. Uses build cache.
    Tx {
        /// Produce hex-encoded ABI-packed calldata only. Do not interact with RPC.
        #[arg(long)]
        bytecode: bool,
        /// Do not await transaction confirmation from the RPC
        #[arg(long)]
        no_await: bool,
        /// Contract address to interact with
        address: String,
        /// Contract method to transact
        method: String,
        /// Method transaction arguments. Will be ABI-encoded.
        args: Vec<String>,
    },
    /// Calls a method of a particular contract. Uses build cache.
    Call {
        /// Estimate the call using the specified from address
        #[arg(long, default_value = "0x0000000000000000000000000000000000000000")]
        from: String,
        /// Contract address to interact with
        address: String,
        /// Contract method to call
        method: String,
        /// Method call arguments. Will be ABI-encoded.
        args: Vec<String>,
    },
    /// Loads logs of a particular event from a contract.
    Logs {
        /// Contract address to interact with
        address: String,
        /// Transaction hash to find the receipt
        tx_hash: String,
        /// Contract event to find in the logs
        event_name: String,
    },
}

fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .ok_or_else(|| format!("missing duration unit in {text:?}"))?;
    let (number, unit) = text.split_at(split);
    let number: f64 = number.parse().map_err(|_| format!("invalid duration: {text:?}"))?;

    let secs = match unit {
        "ms" => number / 1000.0,
        "s" => number,
        "m" => number * 60.0,
        "h" => number * 3600.0,
        other => return Err(format!("unknown duration unit: {other:?}")),
    };

    Ok(Duration::from_secs_f64(secs))
}

fn log_level(text: &str) -> Level {
    match text {
        "1" | "error" => Level::ERROR,
        "2" | "warn" => Level::WARN,
        "3" | "info" => Level::INFO,
        "4" | "debug" => Level::DEBUG,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables, similar to the dotenv Node package.
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    soldep_common::logging::init_logging(log_level(&cli.log_level))?;

    cmd::run(cli).await
}
