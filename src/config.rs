//! Service configuration
//!
//! Loaded once at startup from the environment (and an optional `.env`).
//! Secrets are redacted from `Debug` output.

use std::env;
use std::fmt;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use eyre::{eyre, Result, WrapErr};

use crate::encoder::{parse_address, ContractMode};
use crate::fees::{parse_avax, FeeSchedule};
use crate::orchestrator::OrchestratorConfig;

pub const DEFAULT_RPC_URL: &str = "https://api.avax-test.network/ext/bc/C/rpc";

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Only test networks and local nodes are accepted
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "test" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(eyre!("Invalid ICM_ENV '{}'", other)),
        }
    }
}

/// Ledger and contract settings
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    /// Zero address when no Teleporter contract is deployed
    pub teleporter_address: Address,
}

impl ChainConfig {
    pub fn mode(&self) -> ContractMode {
        ContractMode::from_address(self.teleporter_address)
    }
}

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_address: String,
    pub port: u16,
}

/// Database configuration
#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Custom Debug that redacts the database URL (may contain credentials).
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .finish()
    }
}

/// Send-flow limits and timings
#[derive(Debug, Clone)]
pub struct SendConfig {
    pub default_gas_limit: u64,
    pub wallet_gas_limit: u64,
    pub default_fee_amount: U256,
    pub max_amount: U256,
    pub fee_schedule: FeeSchedule,
    pub confirmation_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
}

/// Background status tracking
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub poll_interval_ms: u64,
    pub delivery_expiry_secs: u64,
}

/// Full service configuration
#[derive(Clone)]
pub struct Config {
    pub environment: Environment,
    pub chain: ChainConfig,
    pub api: ApiConfig,
    /// `None` selects the in-memory store
    pub database: Option<DatabaseConfig>,
    pub send: SendConfig,
    pub tracker: TrackerConfig,
    /// Only needed for CLI sends
    pub private_key: Option<String>,
    pub json_logs: bool,
}

/// Custom Debug that redacts private_key to prevent accidental log leakage.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("environment", &self.environment)
            .field("chain", &self.chain)
            .field("api", &self.api)
            .field("database", &self.database)
            .field("send", &self.send)
            .field("tracker", &self.tracker)
            .field(
                "private_key",
                &self.private_key.as_ref().map(|_| "<redacted>"),
            )
            .field("json_logs", &self.json_logs)
            .finish()
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match var(name) {
        Some(v) => v.parse().map_err(|_| eyre!("Invalid {}: '{}'", name, v)),
        None => Ok(default),
    }
}

fn avax_or(name: &str, default: &str) -> Result<U256> {
    let raw = var(name).unwrap_or_else(|| default.to_string());
    parse_avax(&raw).wrap_err_with(|| format!("Invalid {}", name))
}

/// Reject RPC endpoints that do not look like a test network or local node
pub fn check_network(environment: Environment, rpc_url: &str) -> Result<()> {
    if environment != Environment::Development {
        return Ok(());
    }
    let url = rpc_url.to_ascii_lowercase();
    if url.contains("test") || url.contains("localhost") || url.contains("127.0.0.1") {
        Ok(())
    } else {
        Err(eyre!(
            "Refusing RPC URL '{}' in development mode: only test networks or local nodes are allowed",
            rpc_url
        ))
    }
}

impl Config {
    /// Load configuration from environment
    pub fn load() -> Result<Self> {
        // Try to load .env file
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }
        Self::from_env()
    }

    /// Build from the current process environment without reading `.env`
    pub fn from_env() -> Result<Self> {
        let environment =
            Environment::parse(&var("ICM_ENV").unwrap_or_else(|| "development".to_string()))?;

        let rpc_url = var("AVALANCHE_FUJI_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        check_network(environment, &rpc_url)?;

        let teleporter_address = match var("TELEPORTER_CONTRACT_ADDRESS") {
            Some(raw) => parse_address(&raw)
                .map_err(|e| eyre!("Invalid TELEPORTER_CONTRACT_ADDRESS: {}", e))?,
            None => Address::ZERO,
        };

        let fee_schedule = FeeSchedule::from_display(
            &var("FEE_BASE").unwrap_or_else(|| "0.001".to_string()),
            &var("FEE_PER_BYTE").unwrap_or_else(|| "0.0001".to_string()),
            &var("FEE_PER_GAS_GWEI").unwrap_or_else(|| "25".to_string()),
        )?;

        let default_gas_limit: u64 = parse_or("DEFAULT_GAS_LIMIT", 200_000)?;
        if default_gas_limit == 0 {
            return Err(eyre!("DEFAULT_GAS_LIMIT must be positive"));
        }

        let json_logs = var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(Self {
            environment,
            chain: ChainConfig {
                rpc_url,
                teleporter_address,
            },
            api: ApiConfig {
                bind_address: var("API_BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or("API_PORT", 3001)?,
            },
            database: var("DATABASE_URL").map(|url| DatabaseConfig { url }),
            send: SendConfig {
                default_gas_limit,
                wallet_gas_limit: parse_or("WALLET_GAS_LIMIT", 500_000)?,
                default_fee_amount: avax_or("DEFAULT_FEE_AMOUNT", "0.01")?,
                max_amount: avax_or("MAX_AMOUNT", "10")?,
                fee_schedule,
                confirmation_timeout_secs: parse_or("CONFIRMATION_TIMEOUT_SECS", 120)?,
                receipt_poll_interval_ms: parse_or("RECEIPT_POLL_INTERVAL_MS", 1000)?,
            },
            tracker: TrackerConfig {
                poll_interval_ms: parse_or("STATUS_POLL_INTERVAL_MS", 30_000)?,
                delivery_expiry_secs: parse_or("DELIVERY_EXPIRY_SECS", 3600)?,
            },
            private_key: var("EVM_PRIVATE_KEY"),
            json_logs,
        })
    }

    pub fn mode(&self) -> ContractMode {
        self.chain.mode()
    }

    /// Settings handed to the orchestrator
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            mode: self.mode(),
            default_gas_limit: self.send.default_gas_limit,
            wallet_gas_limit: self.send.wallet_gas_limit,
            default_fee_amount: self.send.default_fee_amount,
            max_amount: self.send.max_amount,
            confirmation_timeout: Duration::from_secs(self.send.confirmation_timeout_secs),
            receipt_poll_interval: Duration::from_millis(self.send.receipt_poll_interval_ms),
        }
    }
}
