//! Pool model: a closed set of protocol variants behind one capability set
//! {tokens, fee, required_state_calls, load_state, simulate_swap}.
//!
//! Variants fall into two math families. Protocol subtypes only change fee
//! resolution; the swap math is the family's. State is decoded from leading
//! return words rather than strict ABI tuples so the protocols' slightly
//! different return dialects all load.

pub mod concentrated;
pub mod constant_product;

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use rust_decimal::Decimal;

use crate::config::{PoolRecord, DYNAMIC_FEE_FALLBACK_PPM};
use crate::error::ScanError;
use crate::multicall::{CallOutcome, CallSpec};

sol! {
    function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
    function slot0() external view returns (
        uint160 sqrtPriceX96,
        int24 tick,
        uint16 observationIndex,
        uint16 observationCardinality,
        uint16 observationCardinalityNext,
        uint8 feeProtocol,
        bool unlocked
    );
    function liquidity() external view returns (uint128);
    function tickSpacing() external view returns (int24);
    function fee() external view returns (uint24);
    function token0() external view returns (address);
    function token1() external view returns (address);
}

/// Registry protocol tags this build understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    UniswapV3,
    SushiswapV3,
    PancakeswapV3,
    UniswapV2,
    AerodromeStatic,
    AerodromeMetapool,
}

impl Protocol {
    pub fn from_tag(tag: &str) -> Result<Self, ScanError> {
        match tag.to_ascii_lowercase().as_str() {
            "uniswap_v3" => Ok(Protocol::UniswapV3),
            "sushiswap_v3" => Ok(Protocol::SushiswapV3),
            "pancakeswap_v3" => Ok(Protocol::PancakeswapV3),
            "uniswap_v2" => Ok(Protocol::UniswapV2),
            "aerodrome_static" => Ok(Protocol::AerodromeStatic),
            "aerodrome_metapool" => Ok(Protocol::AerodromeMetapool),
            other => Err(ScanError::UnsupportedProtocol(other.to_string())),
        }
    }

    pub fn family(self) -> MathFamily {
        match self {
            Protocol::UniswapV3
            | Protocol::SushiswapV3
            | Protocol::PancakeswapV3
            | Protocol::AerodromeMetapool => MathFamily::Concentrated,
            Protocol::UniswapV2 | Protocol::AerodromeStatic => MathFamily::ConstantProduct,
        }
    }

    /// Metapools never carry a static tier; the fee is always queried live
    pub fn forces_dynamic_fee(self) -> bool {
        matches!(self, Protocol::AerodromeMetapool)
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::UniswapV3 => write!(f, "Uniswap V3"),
            Protocol::SushiswapV3 => write!(f, "SushiSwap V3"),
            Protocol::PancakeswapV3 => write!(f, "PancakeSwap V3"),
            Protocol::UniswapV2 => write!(f, "Uniswap V2"),
            Protocol::AerodromeStatic => write!(f, "Aerodrome Static"),
            Protocol::AerodromeMetapool => write!(f, "Aerodrome Metapool"),
        }
    }
}

/// The two swap-math families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFamily {
    ConstantProduct,
    Concentrated,
}

/// Per-cycle state snapshot, replaced wholesale on every fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolState {
    ConstantProduct {
        reserve0: U256,
        reserve1: U256,
    },
    Concentrated {
        sqrt_price_x96: U256,
        tick: i32,
        liquidity: u128,
        tick_spacing: i32,
    },
}

/// Result of one simulated leg
#[derive(Debug, Clone, Copy)]
pub struct SwapResult {
    pub amount_out: U256,
    /// Post-swap price marker in Q96 sqrt-price form (a reserve ratio stand-in
    /// for constant-product pools)
    pub price_marker_x96: U256,
}

/// One pool of the scan universe
#[derive(Debug, Clone)]
pub struct Pool {
    pub address: Address,
    pub protocol: Protocol,
    pub label: Option<String>,
    /// `None` until this cycle's batched fetch loads it; `None` = ineligible
    pub state: Option<PoolState>,
    fee_ppm: Option<u32>,
    dynamic_fee: bool,
    live_fee_ppm: Option<u32>,
    tokens: Option<(Address, Address)>,
}

impl Pool {
    pub fn from_record(record: &PoolRecord) -> Result<Self, ScanError> {
        let protocol = Protocol::from_tag(&record.protocol)?;
        if let Some(ppm) = record.fee {
            if ppm >= 1_000_000 {
                return Err(ScanError::InvalidFee {
                    pool: record.address,
                    ppm,
                });
            }
        }
        Ok(Self {
            address: record.address,
            protocol,
            label: record.label.clone(),
            state: None,
            fee_ppm: record.fee,
            dynamic_fee: record.dynamic_fee || protocol.forces_dynamic_fee(),
            live_fee_ppm: None,
            tokens: record.tokens.map(|[t0, t1]| (t0, t1)),
        })
    }

    pub fn family(&self) -> MathFamily {
        self.protocol.family()
    }

    /// token0/token1 in the pool's on-chain order
    pub fn tokens(&self) -> Option<(Address, Address)> {
        self.tokens
    }

    pub fn set_tokens(&mut self, token0: Address, token1: Address) {
        self.tokens = Some((token0, token1));
    }

    /// Does this pool trade the given unordered token pair?
    pub fn pair_matches(&self, a: Address, b: Address) -> bool {
        match self.tokens {
            Some((t0, t1)) => (t0 == a && t1 == b) || (t0 == b && t1 == a),
            None => false,
        }
    }

    /// Pool still needs its live fee() query resolved
    pub fn needs_fee_query(&self) -> bool {
        self.dynamic_fee && self.live_fee_ppm.is_none()
    }

    /// Caches a live-queried fee for the process lifetime
    pub fn set_live_fee(&mut self, ppm: u32) {
        self.live_fee_ppm = Some(ppm);
    }

    /// Effective fee in parts per million.
    /// Dynamic pools fall back to the registry value, then to the protocol
    /// default, when the live query never succeeded.
    pub fn fee_ppm(&self) -> u32 {
        if self.dynamic_fee {
            self.live_fee_ppm
                .or(self.fee_ppm)
                .unwrap_or(DYNAMIC_FEE_FALLBACK_PPM)
        } else {
            self.fee_ppm.unwrap_or(match self.family() {
                MathFamily::ConstantProduct => 3_000,
                MathFamily::Concentrated => 0,
            })
        }
    }

    /// Fee as a fraction in [0, 1)
    pub fn fee_fraction(&self) -> Decimal {
        Decimal::from(self.fee_ppm()) / Decimal::from(1_000_000u32)
    }

    /// Fee as a percentage
    pub fn fee_pct(&self) -> Decimal {
        self.fee_fraction() * Decimal::from(100u8)
    }

    /// Label if the registry carries one, else the abbreviated address
    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => abbrev(self.address),
        }
    }

    /// Read-only calls whose results `load_state` consumes, in order
    pub fn required_state_calls(&self) -> Vec<CallSpec> {
        match self.family() {
            MathFamily::ConstantProduct => vec![CallSpec {
                target: self.address,
                calldata: Bytes::from(getReservesCall {}.abi_encode()),
            }],
            MathFamily::Concentrated => vec![
                CallSpec {
                    target: self.address,
                    calldata: Bytes::from(slot0Call {}.abi_encode()),
                },
                CallSpec {
                    target: self.address,
                    calldata: Bytes::from(liquidityCall {}.abi_encode()),
                },
                CallSpec {
                    target: self.address,
                    calldata: Bytes::from(tickSpacingCall {}.abi_encode()),
                },
            ],
        }
    }

    /// Replaces the state snapshot from this cycle's raw results, positionally
    /// matching `required_state_calls`. Any failed sub-call or implausible
    /// value leaves the pool stateless for the cycle.
    pub fn load_state(&mut self, results: &[CallOutcome]) -> Result<(), ScanError> {
        self.state = None;
        let expected = match self.family() {
            MathFamily::ConstantProduct => 1,
            MathFamily::Concentrated => 3,
        };
        if results.len() != expected {
            return Err(ScanError::decode(
                self.address,
                format!("expected {expected} results, got {}", results.len()),
            ));
        }
        if let Some(failed) = results.iter().position(|r| !r.success) {
            return Err(ScanError::decode(
                self.address,
                format!("state sub-call {failed} failed"),
            ));
        }
        let state = match self.family() {
            MathFamily::ConstantProduct => constant_product::load(self.address, &results[0])?,
            MathFamily::Concentrated => {
                concentrated::load(self.address, &results[0], &results[1], &results[2])?
            }
        };
        self.state = Some(state);
        Ok(())
    }

    /// Simulates one swap against the current snapshot.
    /// `zero_for_one` is derived by the caller from the input token vs token0.
    pub fn simulate_swap(
        &self,
        amount_in: U256,
        zero_for_one: bool,
    ) -> Result<SwapResult, ScanError> {
        match &self.state {
            None => Err(ScanError::stale(self.address, "no state loaded this cycle")),
            Some(PoolState::ConstantProduct { reserve0, reserve1 }) => Ok(constant_product::swap(
                *reserve0,
                *reserve1,
                amount_in,
                zero_for_one,
                self.fee_ppm(),
            )),
            Some(PoolState::Concentrated {
                sqrt_price_x96,
                tick,
                liquidity,
                tick_spacing,
            }) => concentrated::swap(
                *sqrt_price_x96,
                *tick,
                *liquidity,
                *tick_spacing,
                amount_in,
                zero_for_one,
                self.fee_ppm(),
            ),
        }
    }
}

pub fn abbrev(addr: Address) -> String {
    let hex = format!("{addr:#x}");
    hex[..10].to_string()
}

/// Deducts the pool fee from the input, parts-per-million
pub(crate) fn apply_fee(amount_in: U256, fee_ppm: u32) -> U256 {
    amount_in * U256::from(1_000_000 - fee_ppm.min(999_999)) / U256::from(1_000_000u32)
}

/// Extracts the `idx`-th 32-byte return word
pub(crate) fn word(pool: Address, data: &[u8], idx: usize) -> Result<[u8; 32], ScanError> {
    let start = idx * 32;
    let end = start + 32;
    if data.len() < end {
        return Err(ScanError::decode(
            pool,
            format!("payload too short for word {idx}: {} bytes", data.len()),
        ));
    }
    let mut w = [0u8; 32];
    w.copy_from_slice(&data[start..end]);
    Ok(w)
}

pub(crate) fn uint_word(pool: Address, data: &[u8], idx: usize) -> Result<U256, ScanError> {
    Ok(U256::from_be_bytes(word(pool, data, idx)?))
}

/// Decodes a sign-extended int24 return word (tick, tickSpacing)
pub(crate) fn signed_word(pool: Address, data: &[u8], idx: usize) -> Result<i32, ScanError> {
    let w = word(pool, data, idx)?;
    let negative = w[0] & 0x80 != 0;
    let fill = if negative { 0xff } else { 0x00 };
    if w[..28].iter().any(|&b| b != fill) {
        return Err(ScanError::decode(
            pool,
            format!("word {idx} is not a sign-extended int24"),
        ));
    }
    let raw = u32::from_be_bytes([w[28], w[29], w[30], w[31]]);
    Ok(raw as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn record(protocol: &str, fee: Option<u32>, dynamic_fee: bool) -> PoolRecord {
        PoolRecord {
            address: address!("d0b53d9277642d899df5c87a3966a349a798f224"),
            protocol: protocol.to_string(),
            fee,
            tokens: None,
            label: None,
            dynamic_fee,
        }
    }

    #[test]
    fn call_selectors_match_protocol() {
        // getReserves 0x0902f1ac, slot0 0x3850c7bd, liquidity 0x1a686502,
        // tickSpacing 0xd0c93a7c
        let v2 = Pool::from_record(&record("uniswap_v2", None, false)).unwrap();
        let calls = v2.required_state_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(&calls[0].calldata[..4], &[0x09, 0x02, 0xf1, 0xac]);

        let v3 = Pool::from_record(&record("uniswap_v3", Some(500), false)).unwrap();
        let calls = v3.required_state_calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(&calls[0].calldata[..4], &[0x38, 0x50, 0xc7, 0xbd]);
        assert_eq!(&calls[1].calldata[..4], &[0x1a, 0x68, 0x65, 0x02]);
        assert_eq!(&calls[2].calldata[..4], &[0xd0, 0xc9, 0x3a, 0x7c]);
        assert_eq!(&feeCall {}.abi_encode()[..4], &[0xdd, 0xca, 0x3f, 0x43]);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(matches!(
            Protocol::from_tag("balancer_weighted"),
            Err(ScanError::UnsupportedProtocol(_))
        ));
        assert_eq!(Protocol::from_tag("UNISWAP_V3").unwrap(), Protocol::UniswapV3);
    }

    #[test]
    fn fee_resolution_per_variant() {
        // Static tiers pass through; missing static fee gets the family default
        let v3 = Pool::from_record(&record("uniswap_v3", Some(500), false)).unwrap();
        assert_eq!(v3.fee_ppm(), 500);
        let v3_untiered = Pool::from_record(&record("pancakeswap_v3", None, false)).unwrap();
        assert_eq!(v3_untiered.fee_ppm(), 0);
        let v2 = Pool::from_record(&record("uniswap_v2", None, false)).unwrap();
        assert_eq!(v2.fee_ppm(), 3_000);

        // Metapools are always dynamic; fallback applies until a live value lands
        let mut meta = Pool::from_record(&record("aerodrome_metapool", None, false)).unwrap();
        assert!(meta.needs_fee_query());
        assert_eq!(meta.fee_ppm(), DYNAMIC_FEE_FALLBACK_PPM);
        meta.set_live_fee(300);
        assert!(!meta.needs_fee_query());
        assert_eq!(meta.fee_ppm(), 300);
    }

    #[test]
    fn oversized_static_fee_is_rejected() {
        // fee_fraction must stay below 1, so a 100% tier is a bad entry
        assert!(matches!(
            Pool::from_record(&record("uniswap_v3", Some(1_000_000), false)),
            Err(ScanError::InvalidFee { ppm: 1_000_000, .. })
        ));
        assert!(matches!(
            Pool::from_record(&record("uniswap_v2", Some(2_500_000), false)),
            Err(ScanError::InvalidFee { .. })
        ));
        let edge = Pool::from_record(&record("uniswap_v3", Some(999_999), false)).unwrap();
        assert_eq!(edge.fee_ppm(), 999_999);
    }

    #[test]
    fn fee_fraction_is_rational() {
        let v3 = Pool::from_record(&record("uniswap_v3", Some(500), false)).unwrap();
        assert_eq!(v3.fee_fraction().to_string(), "0.0005");
        assert_eq!(v3.fee_pct().to_string(), "0.0500");
    }

    #[test]
    fn pair_matching_is_unordered() {
        let a = address!("4200000000000000000000000000000000000006");
        let b = address!("833589fcd6edb6e08f4c7c32d4f71b54bda02913");
        let c = address!("cbb7c0000ab88b473b1f5afd9ef808440eed33bf");
        let mut pool = Pool::from_record(&record("uniswap_v2", None, false)).unwrap();
        assert!(!pool.pair_matches(a, b));
        pool.set_tokens(a, b);
        assert!(pool.pair_matches(a, b));
        assert!(pool.pair_matches(b, a));
        assert!(!pool.pair_matches(a, c));
    }

    #[test]
    fn signed_word_decoding() {
        let pool = Address::ZERO;
        let neg = U256::ZERO
            .wrapping_sub(U256::from(887272u32))
            .to_be_bytes::<32>();
        assert_eq!(signed_word(pool, &neg, 0).unwrap(), -887272);
        let pos = U256::from(60u8).to_be_bytes::<32>();
        assert_eq!(signed_word(pool, &pos, 0).unwrap(), 60);
        // A full uint word is not a valid int24
        let junk = (U256::from(1u8) << 200usize).to_be_bytes::<32>();
        assert!(signed_word(pool, &junk, 0).is_err());
    }

    #[test]
    fn swap_without_state_is_stale() {
        let pool = Pool::from_record(&record("uniswap_v2", None, false)).unwrap();
        assert!(matches!(
            pool.simulate_swap(U256::from(1_000u32), true),
            Err(ScanError::StaleData { .. })
        ));
    }
}
