//! Concentrated-liquidity fixed-point math.
//!
//! Tick/sqrt-price conversion and the liquidity delta formulas, kept exact:
//! all arithmetic is integer, sqrt prices carry the protocol's Q96 scale, and
//! the bit-interpolation constants are the protocol-mandated values. Rounding
//! errors here would compound across the three chained legs of a route, so
//! nothing in this module touches floating point.

use alloy::primitives::{U256, U512};

use crate::error::ScanError;

pub const MIN_TICK: i32 = -887272;
pub const MAX_TICK: i32 = 887272;

/// 2^96, the fixed-point scale of sqrt prices.
pub const Q96: U256 = U256::from_limbs([0, 4294967296, 0, 0]);

/// Sqrt price at MIN_TICK, the lowest representable price.
pub const MIN_SQRT_RATIO: U256 = U256::from_limbs([4295128739, 0, 0, 0]);

/// Sqrt price at MAX_TICK (1461446703485210103287273052203988822378723970342).
pub const MAX_SQRT_RATIO: U256 = U256::from_limbs([
    6743328256752651558,
    17280870778742802505,
    4294805859,
    0,
]);

/// Seed ratio (Q128) when the tick's lowest magnitude bit is set.
const SEED_ODD: u128 = 0xfffcb933bd6fad37aa2d162d1a594001;

/// Per-magnitude-bit Q128 multipliers, bit 1 through bit 19.
const RATIO_STEPS: [(u32, u128); 19] = [
    (0x2, 0xfff97272373d413259a46990580e213a),
    (0x4, 0xfff2e50f5f656932ef12357cf3c7fdcc),
    (0x8, 0xffe5caca7e10e4e61c3624eaa0941cd0),
    (0x10, 0xffcb9843d60f6159c9db58835c926644),
    (0x20, 0xff973b41fa98c081472e6896dfb254c0),
    (0x40, 0xff2ea16466c96a3843ec78b326b52861),
    (0x80, 0xfe5dee046a99a2a811c461f1969c3053),
    (0x100, 0xfcbe86c7900a88aedcffc83b479aa3a4),
    (0x200, 0xf987a7253ac413176f2b074cf7815e54),
    (0x400, 0xf3392b0822b70005940c7a398e4b70f3),
    (0x800, 0xe7159475a2c29b7443b29c7fa6e889d9),
    (0x1000, 0xd097f3bdfd2022b8845ad8f792aa5825),
    (0x2000, 0xa9f746462d870fdf8a65dc1f90e061e5),
    (0x4000, 0x70d869a156d2a1b890bb3df62baf32f7),
    (0x8000, 0x31be135f97d08fd981231505542fcfa6),
    (0x10000, 0x9aa508b5b7a84e1c677de54f3e99bc9),
    (0x20000, 0x5d6af8dedb81196699c329225ee604),
    (0x40000, 0x2216e584f5fa1ea926041bedfe98),
    (0x80000, 0x48a170391f7dc42444e8fa2),
];

/// Returns the Q96 sqrt price for `tick`.
///
/// Bit-interpolated power: each set magnitude bit multiplies a Q128 ratio by
/// its precomputed constant; negative ticks invert via full-width reciprocal;
/// the final 32-bit downshift rounds up on any remainder.
pub fn sqrt_price_at_tick(tick: i32) -> Result<U256, ScanError> {
    let abs_tick = tick.unsigned_abs();
    if abs_tick > MAX_TICK as u32 {
        return Err(ScanError::TickOutOfRange(tick));
    }

    let mut ratio = if abs_tick & 1 != 0 {
        U256::from(SEED_ODD)
    } else {
        U256::from(1u8) << 128
    };
    for (mask, step) in RATIO_STEPS {
        if abs_tick & mask != 0 {
            ratio = (ratio * U256::from(step)) >> 128;
        }
    }
    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    let shifted = ratio >> 32;
    if ratio & U256::from(0xffffffffu64) != U256::ZERO {
        Ok(shifted + U256::from(1u8))
    } else {
        Ok(shifted)
    }
}

/// Returns the largest tick whose sqrt price does not exceed `sqrt_price_x96`.
///
/// Binary search over the tick domain with `sqrt_price_at_tick` as the
/// monotonic probe; converges in at most 21 steps.
pub fn tick_at_sqrt_price(sqrt_price_x96: U256) -> Result<i32, ScanError> {
    if sqrt_price_x96 < MIN_SQRT_RATIO || sqrt_price_x96 > MAX_SQRT_RATIO {
        return Err(ScanError::SqrtPriceOutOfRange(sqrt_price_x96.to_string()));
    }

    let mut low = MIN_TICK;
    let mut high = MAX_TICK;
    while low <= high {
        let mid = (low + high) >> 1;
        let probe = sqrt_price_at_tick(mid)?;
        if probe == sqrt_price_x96 {
            return Ok(mid);
        }
        if probe < sqrt_price_x96 {
            low = mid + 1;
        } else {
            high = mid - 1;
        }
    }
    Ok(high)
}

/// Token0 amount between two sqrt prices at the given liquidity.
///
/// `liquidity * Q96 * (upper - lower) / (lower * upper)`, order-normalized.
pub fn amount0_delta(sqrt_a: U256, sqrt_b: U256, liquidity: u128) -> U256 {
    let (lower, upper) = order(sqrt_a, sqrt_b);
    if lower.is_zero() || liquidity == 0 {
        return U256::ZERO;
    }
    let numerator =
        U512::from(U256::from(liquidity)) * U512::from(Q96) * U512::from(upper - lower);
    let denominator = U512::from(lower) * U512::from(upper);
    narrow_saturating(numerator / denominator)
}

/// Token1 amount between two sqrt prices at the given liquidity.
///
/// `liquidity * (upper - lower) / Q96`, order-normalized.
pub fn amount1_delta(sqrt_a: U256, sqrt_b: U256, liquidity: u128) -> U256 {
    let (lower, upper) = order(sqrt_a, sqrt_b);
    let numerator = U512::from(U256::from(liquidity)) * U512::from(upper - lower);
    narrow_saturating(numerator >> 96)
}

fn order(a: U256, b: U256) -> (U256, U256) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Narrows a 512-bit intermediate to 256 bits, saturating at `U256::MAX`.
pub(crate) fn narrow_saturating(value: U512) -> U256 {
    let limbs = value.as_limbs();
    if limbs[4] | limbs[5] | limbs[6] | limbs[7] != 0 {
        return U256::MAX;
    }
    U256::from_limbs([limbs[0], limbs[1], limbs[2], limbs[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqrt(tick: i32) -> U256 {
        sqrt_price_at_tick(tick).unwrap()
    }

    #[test]
    fn sqrt_price_reference_values() {
        // Published protocol values, exact.
        assert_eq!(sqrt(0), U256::from(79228162514264337593543950336u128));
        assert_eq!(sqrt(1), U256::from(79232123823359799118286999568u128));
        assert_eq!(sqrt(-1), U256::from(79224201403219477170569942574u128));
        assert_eq!(sqrt(10), U256::from(79267784519130042428790663799u128));
        assert_eq!(sqrt(-10), U256::from(79188560314459151373725315960u128));
        assert_eq!(sqrt(100), U256::from(79625275426524748796330556128u128));
        assert_eq!(sqrt(-100), U256::from(78833030112140176575862854579u128));
        assert_eq!(
            sqrt(202500),
            U256::from(1976475185087805964521793822621568u128)
        );
        assert_eq!(sqrt(-202500), U256::from(3175907182010897430259228u128));
        assert_eq!(sqrt(MIN_TICK), MIN_SQRT_RATIO);
        assert_eq!(sqrt(MAX_TICK), MAX_SQRT_RATIO);
        assert_eq!(sqrt(-887271), U256::from(4295343490u64));
    }

    #[test]
    fn sqrt_price_rejects_out_of_range_tick() {
        assert!(sqrt_price_at_tick(MAX_TICK + 1).is_err());
        assert!(sqrt_price_at_tick(MIN_TICK - 1).is_err());
        assert!(sqrt_price_at_tick(i32::MIN).is_err());
    }

    #[test]
    fn tick_round_trips_through_sqrt_price() {
        let mut samples = vec![MIN_TICK, -887271, -202500, -100, -1, 0, 1, 100, 202500, 887271, MAX_TICK];
        let mut t = MIN_TICK;
        while t <= MAX_TICK {
            samples.push(t);
            t += 30011;
        }
        for tick in samples {
            assert_eq!(tick_at_sqrt_price(sqrt(tick)).unwrap(), tick, "tick {tick}");
        }
    }

    #[test]
    fn tick_lookup_floors_between_ticks() {
        let one = U256::from(1u8);
        assert_eq!(tick_at_sqrt_price(sqrt(100) + one).unwrap(), 100);
        assert_eq!(tick_at_sqrt_price(sqrt(-100) + one).unwrap(), -100);
        assert_eq!(tick_at_sqrt_price(sqrt(101) - one).unwrap(), 100);
    }

    #[test]
    fn tick_lookup_rejects_out_of_bounds_price() {
        let one = U256::from(1u8);
        assert!(tick_at_sqrt_price(MIN_SQRT_RATIO - one).is_err());
        assert!(tick_at_sqrt_price(MAX_SQRT_RATIO + one).is_err());
        assert!(tick_at_sqrt_price(U256::ZERO).is_err());
    }

    #[test]
    fn deltas_match_reference_values() {
        let l = 10u128.pow(18);
        assert_eq!(amount1_delta(sqrt(0), sqrt(10), l), U256::from(500100010000500u64));
        assert_eq!(amount0_delta(sqrt(0), sqrt(10), l), U256::from(499850034993001u64));
    }

    #[test]
    fn deltas_are_symmetric_and_non_negative() {
        let l = 5_000_000_000_000u128;
        let pairs = [(-50, 70), (0, 1), (-887272, 887272), (1000, 1010)];
        for (a, b) in pairs {
            let (pa, pb) = (sqrt(a), sqrt(b));
            assert_eq!(amount0_delta(pa, pb, l), amount0_delta(pb, pa, l));
            assert_eq!(amount1_delta(pa, pb, l), amount1_delta(pb, pa, l));
        }
    }

    #[test]
    fn deltas_vanish_on_zero_width_or_zero_liquidity() {
        let p = sqrt(42);
        assert_eq!(amount0_delta(p, p, 10u128.pow(18)), U256::ZERO);
        assert_eq!(amount1_delta(p, p, 10u128.pow(18)), U256::ZERO);
        assert_eq!(amount0_delta(sqrt(0), sqrt(10), 0), U256::ZERO);
        assert_eq!(amount1_delta(sqrt(0), sqrt(10), 0), U256::ZERO);
    }

    #[test]
    fn full_range_deltas_exceed_u128_without_overflow() {
        let a1 = amount1_delta(MIN_SQRT_RATIO, MAX_SQRT_RATIO, u128::MAX);
        let a0 = amount0_delta(MIN_SQRT_RATIO, MAX_SQRT_RATIO, u128::MAX);
        assert_eq!(
            a1,
            U256::from_limbs([7176641170769838997, 5792904869389344080, 18446050711097703530, 0])
        );
        assert_eq!(
            a0,
            U256::from_limbs([3347451487487352839, 4587049269402295200, 18446050707367246063, 0])
        );
    }
}
