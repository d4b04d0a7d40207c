//! Concentrated-liquidity family: state decoding and the single-range swap.
//!
//! The swap deliberately stays inside the current tick's liquidity band:
//! output is the in-band maximum, clamped at the adjacent spacing boundary,
//! and ticks are never crossed. This under-simulates price impact for inputs
//! that would exhaust the band; a tick-crossing loop is a known extension.

use alloy::primitives::{Address, U256};

use crate::error::ScanError;
use crate::multicall::CallOutcome;
use crate::pools::{apply_fee, signed_word, uint_word, PoolState, SwapResult};
use crate::tick_math::{
    amount0_delta, amount1_delta, sqrt_price_at_tick, MAX_SQRT_RATIO, MAX_TICK, MIN_SQRT_RATIO,
    MIN_TICK, Q96,
};

/// Decodes slot0 (first two words: sqrt price, tick), liquidity, and tick
/// spacing. Both the 7-word Uniswap layout and shorter metapool layouts carry
/// the price and tick up front.
pub(super) fn load(
    pool: Address,
    slot0: &CallOutcome,
    liquidity: &CallOutcome,
    tick_spacing: &CallOutcome,
) -> Result<PoolState, ScanError> {
    let sqrt_price_x96 = uint_word(pool, &slot0.data, 0)?;
    let tick = signed_word(pool, &slot0.data, 1)?;
    let liquidity_raw = uint_word(pool, &liquidity.data, 0)?;
    let tick_spacing = signed_word(pool, &tick_spacing.data, 0)?;

    if sqrt_price_x96.is_zero() {
        return Err(ScanError::stale(pool, "zero sqrt price"));
    }
    if sqrt_price_x96 >> 160 != U256::ZERO {
        return Err(ScanError::stale(pool, "sqrt price exceeds 160 bits"));
    }
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(ScanError::stale(pool, "tick outside protocol domain"));
    }
    let liquidity: u128 = liquidity_raw
        .try_into()
        .map_err(|_| ScanError::decode(pool, "liquidity exceeds 128 bits"))?;
    if liquidity == 0 {
        return Err(ScanError::stale(pool, "zero active liquidity"));
    }
    if tick_spacing <= 0 {
        return Err(ScanError::stale(pool, "non-positive tick spacing"));
    }

    Ok(PoolState::Concentrated {
        sqrt_price_x96,
        tick,
        liquidity,
        tick_spacing,
    })
}

/// Single-range swap: maximum in-band output clamped at the adjacent spacing
/// boundary, fee off the input, price marker shifted by `in_after_fee / L`.
pub(super) fn swap(
    sqrt_price_x96: U256,
    tick: i32,
    liquidity: u128,
    tick_spacing: i32,
    amount_in: U256,
    zero_for_one: bool,
    fee_ppm: u32,
) -> Result<SwapResult, ScanError> {
    let (limit, boundary_tick) = if zero_for_one {
        (MIN_SQRT_RATIO + U256::from(1u8), tick - tick_spacing)
    } else {
        (MAX_SQRT_RATIO - U256::from(1u8), tick + tick_spacing)
    };
    let boundary = sqrt_price_at_tick(boundary_tick)?;

    let amount_out = if zero_for_one {
        amount1_delta(sqrt_price_x96, limit, liquidity)
            .min(amount1_delta(sqrt_price_x96, boundary, liquidity))
    } else {
        amount0_delta(limit, sqrt_price_x96, liquidity)
            .min(amount0_delta(boundary, sqrt_price_x96, liquidity))
    };

    let in_after_fee = apply_fee(amount_in, fee_ppm);
    let shift = in_after_fee.saturating_mul(Q96) / U256::from(liquidity);
    let price_marker_x96 = if zero_for_one {
        sqrt_price_x96.saturating_sub(shift)
    } else {
        sqrt_price_x96.saturating_add(shift)
    }
    .clamp(MIN_SQRT_RATIO, MAX_SQRT_RATIO);

    Ok(SwapResult {
        amount_out,
        price_marker_x96,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_bytes(v: U256) -> [u8; 32] {
        v.to_be_bytes::<32>()
    }

    fn signed_bytes(v: i32) -> [u8; 32] {
        if v < 0 {
            U256::ZERO.wrapping_sub(U256::from(v.unsigned_abs())).to_be_bytes::<32>()
        } else {
            U256::from(v as u32).to_be_bytes::<32>()
        }
    }

    fn slot0_outcome(sqrt_price: U256, tick: i32, extra_words: usize) -> CallOutcome {
        let mut data = Vec::new();
        data.extend_from_slice(&word_bytes(sqrt_price));
        data.extend_from_slice(&signed_bytes(tick));
        for _ in 0..extra_words {
            data.extend_from_slice(&word_bytes(U256::from(1u8)));
        }
        CallOutcome {
            success: true,
            data: data.into(),
        }
    }

    fn uint_outcome(v: U256) -> CallOutcome {
        CallOutcome {
            success: true,
            data: word_bytes(v).to_vec().into(),
        }
    }

    fn signed_outcome(v: i32) -> CallOutcome {
        CallOutcome {
            success: true,
            data: signed_bytes(v).to_vec().into(),
        }
    }

    const L: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn slot0_decodes_across_dialects() {
        // Uniswap's 7-word slot0 and a shorter metapool layout both decode
        for extra in [5usize, 4] {
            let state = load(
                Address::ZERO,
                &slot0_outcome(Q96, -600, extra),
                &uint_outcome(U256::from(L)),
                &signed_outcome(60),
            )
            .unwrap();
            assert_eq!(
                state,
                PoolState::Concentrated {
                    sqrt_price_x96: Q96,
                    tick: -600,
                    liquidity: L,
                    tick_spacing: 60,
                }
            );
        }
    }

    #[test]
    fn implausible_slot0_values_are_stale() {
        let liq = uint_outcome(U256::from(L));
        let spacing = signed_outcome(60);

        let zero_price = load(Address::ZERO, &slot0_outcome(U256::ZERO, 0, 5), &liq, &spacing);
        assert!(matches!(zero_price, Err(ScanError::StaleData { .. })));

        let wide_price = load(
            Address::ZERO,
            &slot0_outcome(U256::from(1u8) << 161, 0, 5),
            &liq,
            &spacing,
        );
        assert!(matches!(wide_price, Err(ScanError::StaleData { .. })));

        let no_liquidity = load(
            Address::ZERO,
            &slot0_outcome(Q96, 0, 5),
            &uint_outcome(U256::ZERO),
            &spacing,
        );
        assert!(matches!(no_liquidity, Err(ScanError::StaleData { .. })));

        let bad_spacing = load(
            Address::ZERO,
            &slot0_outcome(Q96, 0, 5),
            &liq,
            &signed_outcome(0),
        );
        assert!(matches!(bad_spacing, Err(ScanError::StaleData { .. })));
    }

    #[test]
    fn output_is_clamped_at_the_adjacent_boundary() {
        // At tick 0 the band to tick -60 is tiny next to the full-range delta,
        // so the boundary clamp must win regardless of input size
        let band_max = amount1_delta(Q96, sqrt_price_at_tick(-60).unwrap(), L);
        let small = swap(Q96, 0, L, 60, U256::from(10u64).pow(U256::from(12u8)), true, 0).unwrap();
        let large = swap(Q96, 0, L, 60, U256::from(10u64).pow(U256::from(24u8)), true, 0).unwrap();
        assert_eq!(small.amount_out, band_max);
        assert_eq!(large.amount_out, band_max);
    }

    #[test]
    fn direction_picks_the_boundary_side() {
        let up = amount0_delta(sqrt_price_at_tick(60).unwrap(), Q96, L);
        let r = swap(Q96, 0, L, 60, U256::from(10u64).pow(U256::from(12u8)), false, 0).unwrap();
        assert_eq!(r.amount_out, up);
    }

    #[test]
    fn marker_moves_with_the_swap_and_stays_in_bounds() {
        let amount = U256::from(10u64).pow(U256::from(12u8));
        let down = swap(Q96, 0, L, 60, amount, true, 0).unwrap();
        assert!(down.price_marker_x96 < Q96);
        assert!(down.price_marker_x96 > MIN_SQRT_RATIO);

        let up = swap(Q96, 0, L, 60, amount, false, 0).unwrap();
        assert!(up.price_marker_x96 > Q96);

        // A huge input against dust liquidity pins the marker at the bound
        let pinned = swap(Q96, 0, 1, 60, U256::from(10u64).pow(U256::from(30u8)), false, 0).unwrap();
        assert_eq!(pinned.price_marker_x96, MAX_SQRT_RATIO);
    }

    #[test]
    fn fee_shrinks_the_price_shift() {
        let amount = U256::from(10u64).pow(U256::from(15u8));
        let free = swap(Q96, 0, L, 60, amount, true, 0).unwrap();
        let taxed = swap(Q96, 0, L, 60, amount, true, 500).unwrap();
        assert!(taxed.price_marker_x96 > free.price_marker_x96);
    }

    #[test]
    fn boundary_outside_tick_domain_fails_the_computation() {
        let sqrt = sqrt_price_at_tick(MAX_TICK).unwrap();
        let r = swap(sqrt, MAX_TICK, L, 60, U256::from(1_000u32), false, 0);
        assert!(matches!(r, Err(ScanError::TickOutOfRange(_))));
    }
}
