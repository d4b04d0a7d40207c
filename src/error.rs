//! Failure taxonomy for the scan pipeline.
//!
//! Every variant maps to a local recovery decision: a math error kills one
//! computation, a decode/stale error excludes one pool for the cycle, an
//! unmatched leg abandons one permutation, an unknown tag skips one registry
//! entry. Nothing here aborts a scan cycle.

use alloy::primitives::Address;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ScanError {
    /// Math input outside the protocol-defined domain.
    #[error("tick {0} outside [-887272, 887272]")]
    TickOutOfRange(i32),

    /// Sqrt price outside the protocol's representable bounds.
    #[error("sqrt price {0} outside protocol bounds")]
    SqrtPriceOutOfRange(String),

    /// On-chain payload that does not decode to the expected shape.
    #[error("undecodable payload from {pool}: {reason}")]
    Decode { pool: Address, reason: String },

    /// Payload decoded but the values are implausible for a live pool.
    #[error("implausible state for {pool}: {reason}")]
    StaleData { pool: Address, reason: String },

    /// No loaded pool in the combination supplies the requested edge.
    #[error("no pool supplies edge {token_in} -> {token_out}")]
    UnmatchedLeg { token_in: Address, token_out: Address },

    /// Registry entry with a protocol tag this build does not know.
    #[error("unsupported protocol tag \"{0}\"")]
    UnsupportedProtocol(String),

    /// Registry fee at or above 100%; the entry is unusable.
    #[error("invalid fee {ppm} ppm for {pool}")]
    InvalidFee { pool: Address, ppm: u32 },
}

impl ScanError {
    pub fn decode(pool: Address, reason: impl Into<String>) -> Self {
        Self::Decode {
            pool,
            reason: reason.into(),
        }
    }

    pub fn stale(pool: Address, reason: impl Into<String>) -> Self {
        Self::StaleData {
            pool,
            reason: reason.into(),
        }
    }
}
