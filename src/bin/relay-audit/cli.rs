//! Command-line interface definition.

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::eyre;
use relay_audit::{Address, AuditConfig, Hash32};
use std::path::PathBuf;

/// Relay-proof commitment, audit and settlement tooling.
#[derive(Parser, Debug)]
#[command(name = "relay-audit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG", global = true)]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Path to configuration file.
    #[arg(long, short, env = "RELAY_AUDIT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Root directory for data.
    #[arg(long, env = "RELAY_AUDIT_ROOT_DIR", global = true)]
    pub root_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve relays concurrently on an in-memory chain and settle the session.
    Simulate(SimulateArgs),
    /// Derive the audit index for given entropy, session and record count.
    DeriveIndex(DeriveIndexArgs),
    /// Write a default configuration file.
    InitConfig {
        /// Output path (defaults to `<root-dir>/config.toml`).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

/// Arguments for `simulate`.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of relays to serve.
    #[arg(long, default_value = "100")]
    pub relays: u64,

    /// Number of concurrent relay tasks.
    #[arg(long, default_value = "4")]
    pub workers: u64,

    /// Hex-encoded servicer address.
    #[arg(long, default_value = "0101010101010101010101010101010101010101", value_parser = parse_address)]
    pub servicer: Address,

    /// Application public key (hex).
    #[arg(long, default_value = "a1b2c3d4")]
    pub app_key: String,

    /// Target chain identifier.
    #[arg(long, default_value = "0021")]
    pub chain: String,

    /// Seed for the in-memory chain's block hashes.
    #[arg(long, default_value = "relay-audit-devnet")]
    pub seed: String,
}

/// Arguments for `derive-index`.
#[derive(Args, Debug)]
pub struct DeriveIndexArgs {
    /// Hex-encoded 32-byte block hash of the lookahead block.
    #[arg(long, value_parser = parse_hash)]
    pub entropy: Hash32,

    /// Application public key (hex).
    #[arg(long)]
    pub app_key: String,

    /// Target chain identifier.
    #[arg(long)]
    pub chain: String,

    /// Session start height.
    #[arg(long)]
    pub start_height: u64,

    /// Number of records committed to.
    #[arg(long)]
    pub total: u64,
}

fn parse_address(s: &str) -> Result<Address, String> {
    s.parse().map_err(|e: relay_audit::Error| e.to_string())
}

fn parse_hash(s: &str) -> Result<Hash32, String> {
    let bytes = hex::decode(s).map_err(|e| e.to_string())?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("expected 32 bytes, got {}", b.len()))
}

impl Cli {
    /// Load the configuration and apply CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn load_config(&self) -> color_eyre::Result<AuditConfig> {
        let mut config = if let Some(ref path) = self.config {
            AuditConfig::from_file(path)
                .map_err(|e| eyre!("failed to load {}: {e}", path.display()))?
        } else {
            AuditConfig::default()
        };

        if let Some(ref root_dir) = self.root_dir {
            config.root_dir.clone_from(root_dir);
        }
        config.log_level.clone_from(&self.log_level);

        Ok(config)
    }
}
