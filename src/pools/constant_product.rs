//! Constant-product family: state decoding and the closed-form swap.

use alloy::primitives::{Address, U256, U512};

use crate::config::RESERVE_SANITY_POW10;
use crate::error::ScanError;
use crate::multicall::CallOutcome;
use crate::pools::{apply_fee, uint_word, PoolState, SwapResult};
use crate::tick_math::{narrow_saturating, Q96};

/// Decodes `getReserves()` from the first two return words. Covers both the
/// uint112 pair layout and plain uint256 reserve getters.
pub(super) fn load(pool: Address, reserves: &CallOutcome) -> Result<PoolState, ScanError> {
    let reserve0 = uint_word(pool, &reserves.data, 0)?;
    let reserve1 = uint_word(pool, &reserves.data, 1)?;

    if reserve0.is_zero() || reserve1.is_zero() {
        return Err(ScanError::stale(pool, "zero reserve"));
    }
    let ceiling = U256::from(10u8).pow(U256::from(RESERVE_SANITY_POW10));
    if reserve0 > ceiling || reserve1 > ceiling {
        return Err(ScanError::stale(pool, "reserve exceeds sanity ceiling"));
    }

    Ok(PoolState::ConstantProduct { reserve0, reserve1 })
}

/// `out = reserve_out * in_after_fee / (reserve_in + in_after_fee)`, fee off
/// the input. The price marker is the post-swap reserve ratio in Q96.
///
/// Inputs arrive unbounded (a concentrated leg's band output can dwarf the
/// reserves), so the products run over 512-bit intermediates. The quotients
/// cannot exceed the reserves, so narrowing back is exact.
pub(super) fn swap(
    reserve0: U256,
    reserve1: U256,
    amount_in: U256,
    zero_for_one: bool,
    fee_ppm: u32,
) -> SwapResult {
    let (reserve_in, reserve_out) = if zero_for_one {
        (reserve0, reserve1)
    } else {
        (reserve1, reserve0)
    };

    let in_after_fee = apply_fee(amount_in, fee_ppm);
    let amount_out = narrow_saturating(
        U512::from(reserve_out) * U512::from(in_after_fee)
            / (U512::from(reserve_in) + U512::from(in_after_fee)),
    );

    let new_reserve_in = U512::from(reserve_in) + U512::from(amount_in);
    let new_reserve_out = reserve_out - amount_out;
    let price_marker_x96 =
        narrow_saturating(U512::from(new_reserve_out) * U512::from(Q96) / new_reserve_in);

    SwapResult {
        amount_out,
        price_marker_x96,
    }
}
