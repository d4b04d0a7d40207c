//! Read-mostly token metadata cache: decimals, display symbol, USD reference
//! price. Constructed once at startup, populated read-through, never
//! invalidated within a process run.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::warn;

use crate::config;
use crate::multicall::{CallOutcome, CallSpec, ChainClient};

sol! {
    function decimals() external view returns (uint8);
}

/// Decimals assumed when the on-chain query fails
pub const DEFAULT_DECIMALS: u8 = 18;

#[derive(Debug, Clone)]
pub struct TokenMeta {
    pub decimals: u8,
    pub symbol: Option<&'static str>,
    pub usd_price: Option<Decimal>,
}

pub struct TokenCache {
    entries: DashMap<Address, TokenMeta>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Populates entries for every uncached token with one batched
    /// `decimals()` wave. Failures default to 18 decimals with a warning.
    pub async fn resolve(&self, client: &dyn ChainClient, tokens: &[Address]) {
        let mut missing: Vec<Address> = tokens
            .iter()
            .copied()
            .filter(|t| !self.entries.contains_key(t))
            .collect();
        missing.dedup();
        if missing.is_empty() {
            return;
        }

        let specs: Vec<CallSpec> = missing
            .iter()
            .map(|&t| CallSpec {
                target: t,
                calldata: Bytes::from(decimalsCall {}.abi_encode()),
            })
            .collect();

        let outcomes = match client.batch_call(&specs).await {
            Ok(outcomes) if outcomes.len() == specs.len() => outcomes,
            Ok(_) | Err(_) => {
                warn!(
                    "Decimals multicall failed; defaulting {} tokens to {} decimals",
                    missing.len(),
                    DEFAULT_DECIMALS
                );
                vec![
                    CallOutcome {
                        success: false,
                        data: Bytes::new(),
                    };
                    missing.len()
                ]
            }
        };

        for (token, outcome) in missing.into_iter().zip(outcomes) {
            let decimals = match decode_decimals(&outcome) {
                Some(d) => d,
                None => {
                    warn!("decimals() failed for {token}; assuming {DEFAULT_DECIMALS}");
                    DEFAULT_DECIMALS
                }
            };
            self.insert(token, decimals);
        }
    }

    /// Inserts a token, attaching the reference table's symbol and USD price
    pub fn insert(&self, token: Address, decimals: u8) {
        self.entries.insert(
            token,
            TokenMeta {
                decimals,
                symbol: config::tokens::symbol(token),
                usd_price: config::tokens::usd_price(token),
            },
        );
    }

    pub fn decimals(&self, token: Address) -> u8 {
        self.entries
            .get(&token)
            .map(|m| m.decimals)
            .unwrap_or(DEFAULT_DECIMALS)
    }

    pub fn usd_price(&self, token: Address) -> Option<Decimal> {
        self.entries.get(&token).and_then(|m| m.usd_price)
    }

    /// Display symbol, falling back to the abbreviated address
    pub fn symbol(&self, token: Address) -> String {
        match self.entries.get(&token).and_then(|m| m.symbol) {
            Some(symbol) => symbol.to_string(),
            None => crate::pools::abbrev(token),
        }
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_decimals(outcome: &CallOutcome) -> Option<u8> {
    if !outcome.success || outcome.data.len() < 32 {
        return None;
    }
    let word = U256::from_be_slice(&outcome.data[..32]);
    word.try_into().ok()
}

/// Scales a raw token amount down by its decimal exponent.
/// `None` when the amount exceeds what a `Decimal` can hold.
pub fn units_to_decimal(amount: U256, decimals: u8) -> Option<Decimal> {
    if decimals > 28 {
        return None;
    }
    let raw: Decimal = amount.to_string().parse().ok()?;
    raw.checked_mul(Decimal::from_i128_with_scale(1, decimals as u32))
}

/// Converts a USD value to raw token units through the reference price,
/// exactly, in integer space.
pub fn usd_to_units(usd: Decimal, price: Decimal, decimals: u8) -> Option<U256> {
    if price.is_zero() || price.is_sign_negative() || usd.is_sign_negative() {
        return None;
    }
    let ten = U256::from(10u8);
    let numerator = U256::from(usd.mantissa().unsigned_abs())
        * ten.pow(U256::from(decimals as u32 + price.scale()));
    let denominator =
        U256::from(price.mantissa().unsigned_abs()) * ten.pow(U256::from(usd.scale()));
    Some(numerator / denominator)
}
