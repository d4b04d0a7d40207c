//! Scanner configuration: tuning constants, the Base token reference table,
//! and the pool registry loader.

use alloy::primitives::{address, Address};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

use crate::pools::Pool;

pub const CHAIN_NAME: &str = "Base Mainnet";

/// Multicall3 on Base (same deployment address on every major EVM chain).
pub const MULTICALL3_ADDRESS: Address = address!("ca11bde05977b3631167028862be2a173976ca11");

/// Reference notional per route, in USD.
pub const NOTIONAL_USD: Decimal = dec!(10000);

/// Principal when the start token has no reference price: 10,000 units at 18 decimals.
pub const FALLBACK_PRINCIPAL_POW10: u32 = 22;

/// Aave flash-loan fee, percent of principal.
pub const FLASH_LOAN_FEE_PCT: Decimal = dec!(0.05);

/// Net profit above this means corrupt quote data, not opportunity.
pub const MAX_REALISTIC_PROFIT_PCT: Decimal = dec!(15.0);

/// Reserves above 10^35 raw units fail the plausibility check.
pub const RESERVE_SANITY_POW10: u32 = 35;

/// Fallback when a dynamic-fee pool's live fee() query fails (0.05%).
pub const DYNAMIC_FEE_FALLBACK_PPM: u32 = 500;

/// Opportunities shown per cycle.
pub const DEFAULT_TOP_K: usize = 10;

/// Watch-mode poll interval (~6 Base blocks).
pub const DEFAULT_INTERVAL_MS: u64 = 12_000;

/// Canonical token addresses on Base Mainnet with USD reference prices.
/// Prices size the notional trade and feed the USD display columns; profit
/// truth comes from token amounts only.
pub mod tokens {
    use super::*;

    pub const WETH: Address = address!("4200000000000000000000000000000000000006");
    pub const USDC: Address = address!("833589fcd6edb6e08f4c7c32d4f71b54bda02913");
    pub const CBBTC: Address = address!("cbb7c0000ab88b473b1f5afd9ef808440eed33bf");
    pub const CBETH: Address = address!("2ae3f1ec7f1f5012cfeab0185bfc7aa3cf0dec22");
    pub const BRETT: Address = address!("532f27101965dd16442e59d40670faf5ebb142e4");
    pub const AAVE: Address = address!("63706e401c06ac8513145b7687a14804d17f814b");

    /// Display symbol for a known token
    pub fn symbol(addr: Address) -> Option<&'static str> {
        match addr {
            a if a == WETH => Some("WETH"),
            a if a == USDC => Some("USDC"),
            a if a == CBBTC => Some("cbBTC"),
            a if a == CBETH => Some("cbETH"),
            a if a == BRETT => Some("BRETT"),
            a if a == AAVE => Some("AAVE"),
            _ => None,
        }
    }

    /// USD reference price for a known token
    pub fn usd_price(addr: Address) -> Option<Decimal> {
        match addr {
            a if a == WETH => Some(dec!(2500)),
            a if a == USDC => Some(dec!(1)),
            a if a == CBBTC => Some(dec!(65000)),
            a if a == CBETH => Some(dec!(2200)),
            a if a == BRETT => Some(dec!(0.01)),
            a if a == AAVE => Some(dec!(80)),
            _ => None,
        }
    }
}

/// One entry of the pool registry file (`pools.json`)
#[derive(Debug, Clone, Deserialize)]
pub struct PoolRecord {
    pub address: Address,
    pub protocol: String,
    /// Static fee in parts per million; protocol default applies when absent
    #[serde(default)]
    pub fee: Option<u32>,
    /// token0/token1 hint; pools without one are resolved on-chain at startup
    #[serde(default)]
    pub tokens: Option<[Address; 2]>,
    #[serde(default)]
    pub label: Option<String>,
    /// Pool exposes a live fee() query instead of a static tier
    #[serde(default)]
    pub dynamic_fee: bool,
}

/// Parses the registry file into pool models.
/// Entries with an unknown protocol tag are skipped with a warning, not fatal.
pub fn load_registry(path: &Path) -> eyre::Result<Vec<Pool>> {
    let raw = std::fs::read_to_string(path)?;
    let records: Vec<PoolRecord> = serde_json::from_str(&raw)?;
    Ok(pools_from_records(records))
}

pub fn pools_from_records(records: Vec<PoolRecord>) -> Vec<Pool> {
    let mut pools = Vec::with_capacity(records.len());
    for record in records {
        match Pool::from_record(&record) {
            Ok(pool) => pools.push(pool),
            Err(e) => warn!("Skipping registry entry {}: {}", record.address, e),
        }
    }
    pools
}
