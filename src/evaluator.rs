//! Pricing phase: chains three simulated swaps per (triangle, ordering),
//! scores the cycle, and keeps it only when net profit is positive.
//!
//! Each leg pays its DEX fee inside the simulation, so net profit is gross
//! minus the flash-loan financing fee; the accumulated DEX fee rides the
//! record as a reported figure. Profit truth is token amounts: the cycle ends
//! in its starting token, so reference prices only size the principal and
//! fill the USD columns.

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{
    FALLBACK_PRINCIPAL_POW10, FLASH_LOAN_FEE_PCT, MAX_REALISTIC_PROFIT_PCT, NOTIONAL_USD,
};
use crate::error::ScanError;
use crate::pools::Pool;
use crate::routes::{token_orders, Triangle};
use crate::tokens::{units_to_decimal, usd_to_units, TokenCache};

/// One simulated leg of a route
#[derive(Debug, Clone, Serialize)]
pub struct LegDetail {
    pub pool: Address,
    pub pool_name: String,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub amount_out: U256,
    /// Output per input, decimal-normalized; includes fee and price impact
    pub effective_rate: Decimal,
    pub fee_pct: Decimal,
}

/// A retained arbitrage route, immutable once built
#[derive(Debug, Clone, Serialize)]
pub struct Opportunity {
    /// Pools in traversal order
    pub route: [Address; 3],
    /// Directed token cycle t0 -> t1 -> t2 -> t0
    pub order: [Address; 3],
    pub legs: Vec<LegDetail>,
    pub principal: U256,
    pub final_amount: U256,
    pub principal_usd: Option<Decimal>,
    pub final_usd: Option<Decimal>,
    pub gross_profit_pct: Decimal,
    pub net_profit_pct: Decimal,
    pub gross_profit_usd: Option<Decimal>,
    pub net_profit_usd: Option<Decimal>,
    pub total_dex_fee_pct: Decimal,
    pub flash_loan_fee_pct: Decimal,
    pub detected_at: DateTime<Utc>,
}

/// Notional principal in the start token's smallest unit: the reference
/// notional through the cached price and decimals, else a fixed default.
fn principal_units(token: Address, cache: &TokenCache) -> U256 {
    let fallback = U256::from(10u8).pow(U256::from(FALLBACK_PRINCIPAL_POW10));
    match cache.usd_price(token) {
        Some(price) => usd_to_units(NOTIONAL_USD, price, cache.decimals(token))
            .filter(|units| !units.is_zero())
            .unwrap_or(fallback),
        None => fallback,
    }
}

/// Walks one directed ordering through the triangle's pools.
///
/// Returns `Ok(None)` when the route completes but is not worth keeping;
/// errors surface only for legs that could not be simulated and abandon the
/// permutation.
pub fn evaluate_permutation(
    pools: &[Pool],
    triangle: &Triangle,
    order: [Address; 3],
    cache: &TokenCache,
) -> Result<Option<Opportunity>, ScanError> {
    let principal = principal_units(order[0], cache);
    let mut amount = principal;
    let mut legs: Vec<LegDetail> = Vec::with_capacity(3);
    let mut route = [Address::ZERO; 3];
    let mut total_dex_fee_pct = Decimal::ZERO;

    for i in 0..3 {
        let token_in = order[i];
        let token_out = order[(i + 1) % 3];

        // The structural filter guarantees at most one matching pool; it may
        // still be missing if that pool was excluded after enumeration
        let leg_pool = triangle
            .pools
            .iter()
            .map(|&idx| &pools[idx])
            .find(|p| p.state.is_some() && p.pair_matches(token_in, token_out))
            .ok_or(ScanError::UnmatchedLeg {
                token_in,
                token_out,
            })?;
        let Some((token0, _)) = leg_pool.tokens() else {
            return Err(ScanError::UnmatchedLeg {
                token_in,
                token_out,
            });
        };

        let zero_for_one = token_in == token0;
        let result = leg_pool.simulate_swap(amount, zero_for_one)?;

        let rate = match (
            units_to_decimal(amount, cache.decimals(token_in)),
            units_to_decimal(result.amount_out, cache.decimals(token_out)),
        ) {
            (Some(amount_in), Some(amount_out)) if !amount_in.is_zero() => amount_out / amount_in,
            _ => Decimal::ZERO,
        };

        total_dex_fee_pct += leg_pool.fee_pct();
        legs.push(LegDetail {
            pool: leg_pool.address,
            pool_name: leg_pool.display_name(),
            token_in,
            token_out,
            amount_in: amount,
            amount_out: result.amount_out,
            effective_rate: rate,
            fee_pct: leg_pool.fee_pct(),
        });
        route[i] = leg_pool.address;
        amount = result.amount_out;
    }

    // Start token == end token, so the profit ratio needs no price conversion
    let (Some(principal_dec), Some(final_dec)) = (
        units_to_decimal(principal, 0),
        units_to_decimal(amount, 0),
    ) else {
        warn!("Route amounts exceed decimal range; permutation dropped");
        return Ok(None);
    };
    if principal_dec.is_zero() {
        return Ok(None);
    }

    let gross_profit_pct = (final_dec - principal_dec) / principal_dec * Decimal::from(100u8);
    let net_profit_pct = gross_profit_pct - FLASH_LOAN_FEE_PCT;

    if net_profit_pct <= Decimal::ZERO {
        return Ok(None);
    }
    if net_profit_pct > MAX_REALISTIC_PROFIT_PCT {
        warn!(
            "Discarding implausible {net_profit_pct:.2}% route through {}",
            legs[0].pool_name
        );
        return Ok(None);
    }

    let usd = cache.usd_price(order[0]).and_then(|price| {
        let decimals = cache.decimals(order[0]);
        let principal_usd = units_to_decimal(principal, decimals)?.checked_mul(price)?;
        let final_usd = units_to_decimal(amount, decimals)?.checked_mul(price)?;
        Some((principal_usd, final_usd))
    });

    Ok(Some(Opportunity {
        route,
        order,
        legs,
        principal,
        final_amount: amount,
        principal_usd: usd.map(|(p, _)| p),
        final_usd: usd.map(|(_, f)| f),
        gross_profit_pct,
        net_profit_pct,
        gross_profit_usd: usd.map(|(p, f)| f - p),
        net_profit_usd: usd.map(|(p, f)| f - p - p * FLASH_LOAN_FEE_PCT / Decimal::from(100u8)),
        total_dex_fee_pct,
        flash_loan_fee_pct: FLASH_LOAN_FEE_PCT,
        detected_at: Utc::now(),
    }))
}

/// Fans out one task per (triangle, ordering) and joins them in spawn order.
/// Failed permutations are skipped, never fatal to the cycle.
pub async fn evaluate_all(
    pools: Arc<Vec<Pool>>,
    triangles: Arc<Vec<Triangle>>,
    cache: Arc<TokenCache>,
) -> Vec<Opportunity> {
    let mut tasks = Vec::new();
    for triangle in triangles.iter() {
        for order in token_orders(triangle) {
            let pools = Arc::clone(&pools);
            let cache = Arc::clone(&cache);
            let triangle = triangle.clone();
            tasks.push(tokio::spawn(async move {
                evaluate_permutation(&pools, &triangle, order, &cache)
            }));
        }
    }

    let mut opportunities = Vec::new();
    for joined in join_all(tasks).await {
        match joined {
            Ok(Ok(Some(opportunity))) => opportunities.push(opportunity),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => debug!("Permutation skipped: {e}"),
            Err(e) => warn!("Evaluation task failed: {e}"),
        }
    }
    opportunities
}
