//! Relayer fee estimation
//!
//! `fee = base + size * per_byte + gas_limit * per_gas`, all in wei. The
//! constants are fixed at startup; no network call is made.

use alloy::primitives::utils::{format_ether, parse_units};
use alloy::primitives::U256;
use eyre::{eyre, Result};

use crate::types::FeeQuote;

/// 0.001 AVAX
const DEFAULT_BASE_FEE_WEI: u64 = 1_000_000_000_000_000;
/// 0.0001 AVAX per message byte
const DEFAULT_PER_BYTE_FEE_WEI: u64 = 100_000_000_000_000;
/// 25 gwei per unit of gas
const DEFAULT_PER_GAS_FEE_WEI: u64 = 25_000_000_000;

/// Fee constants in wei
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub base_fee: U256,
    pub per_byte_fee: U256,
    pub per_gas_fee: U256,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            base_fee: U256::from(DEFAULT_BASE_FEE_WEI),
            per_byte_fee: U256::from(DEFAULT_PER_BYTE_FEE_WEI),
            per_gas_fee: U256::from(DEFAULT_PER_GAS_FEE_WEI),
        }
    }
}

impl FeeSchedule {
    /// Build from display-unit strings: base and per-byte in AVAX, per-gas in gwei
    pub fn from_display(base_avax: &str, per_byte_avax: &str, per_gas_gwei: &str) -> Result<Self> {
        Ok(Self {
            base_fee: parse_non_negative(base_avax, "ether")
                .map_err(|e| eyre!("Invalid base fee: {}", e))?,
            per_byte_fee: parse_non_negative(per_byte_avax, "ether")
                .map_err(|e| eyre!("Invalid per-byte fee: {}", e))?,
            per_gas_fee: parse_non_negative(per_gas_gwei, "gwei")
                .map_err(|e| eyre!("Invalid per-gas fee: {}", e))?,
        })
    }
}

/// Deterministic fee estimator
#[derive(Debug, Clone, Default)]
pub struct FeeEstimator {
    schedule: FeeSchedule,
}

impl FeeEstimator {
    pub fn new(schedule: FeeSchedule) -> Self {
        Self { schedule }
    }

    /// Quote the relayer fee for a message.
    ///
    /// The destination chain does not affect the price; it is part of the
    /// signature so per-chain pricing can be added without changing callers.
    pub fn estimate(
        &self,
        _destination_chain_id: &str,
        message_size_bytes: u64,
        gas_limit: u64,
    ) -> FeeQuote {
        let fee = self.schedule.base_fee
            + U256::from(message_size_bytes) * self.schedule.per_byte_fee
            + U256::from(gas_limit) * self.schedule.per_gas_fee;

        FeeQuote {
            fee_in_wei: fee,
            fee_in_avax: format_avax(fee),
        }
    }
}

/// Format wei as AVAX, trimming trailing zeros but keeping one decimal
/// (`16000000000000000` -> `"0.016"`, `10^18` -> `"1.0"`).
pub fn format_avax(wei: U256) -> String {
    let formatted = format_ether(wei);
    match formatted.split_once('.') {
        Some((whole, frac)) => {
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() {
                format!("{}.0", whole)
            } else {
                format!("{}.{}", whole, frac)
            }
        }
        None => format!("{}.0", formatted),
    }
}

/// Parse an AVAX amount string into wei. Negative amounts are rejected.
pub fn parse_avax(amount: &str) -> Result<U256> {
    parse_non_negative(amount, "ether")
}

// parse_units accepts a sign and get_absolute() would silently drop it
fn parse_non_negative(value: &str, units: &str) -> Result<U256> {
    let value = value.trim();
    if value.starts_with('-') {
        return Err(eyre!("'{}' is negative", value));
    }
    let parsed = parse_units(value, units).map_err(|e| eyre!("'{}': {}", value, e))?;
    Ok(parsed.get_absolute())
}
