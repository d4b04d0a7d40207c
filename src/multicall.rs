//! Batched on-chain reads via Multicall3.
//!
//! Everything the scanner reads from the chain rides one `aggregate3` request
//! per wave: pool state each cycle, plus token and fee resolution at startup.
//! Every sub-call allows failure; results map back to their pools strictly by
//! position, so a failed or garbled sub-call excludes exactly one pool.

use alloy::primitives::{Address, Bytes};
use alloy::providers::Provider;
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use eyre::Result;
use tracing::{debug, warn};

use crate::config::MULTICALL3_ADDRESS;
use crate::pools::{feeCall, token0Call, token1Call, Pool};

// Multicall3 interface
sol! {
    #[derive(Debug)]
    struct Call3 {
        address target;
        bool allowFailure;
        bytes callData;
    }

    #[derive(Debug)]
    struct MulticallResult {
        bool success;
        bytes returnData;
    }

    #[derive(Debug)]
    function aggregate3(Call3[] calldata calls) external payable returns (MulticallResult[] memory returnData);
}

/// One read-only call descriptor
#[derive(Debug, Clone)]
pub struct CallSpec {
    pub target: Address,
    pub calldata: Bytes,
}

/// Raw outcome of one sub-call
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub success: bool,
    pub data: Bytes,
}

/// Transport seam: one batched round trip, outcomes positionally aligned
/// with the request. Tests inject canned outcomes here.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn batch_call(&self, calls: &[CallSpec]) -> Result<Vec<CallOutcome>>;
}

/// Production transport: Multicall3 `aggregate3` over an alloy provider
pub struct Multicall3Client<P> {
    provider: P,
}

impl<P: Provider> Multicall3Client<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: Provider> ChainClient for Multicall3Client<P> {
    async fn batch_call(&self, calls: &[CallSpec]) -> Result<Vec<CallOutcome>> {
        let start = std::time::Instant::now();

        let entries: Vec<Call3> = calls
            .iter()
            .map(|c| Call3 {
                target: c.target,
                allowFailure: true,
                callData: c.calldata.clone(),
            })
            .collect();

        let calldata = aggregate3Call { calls: entries }.abi_encode();
        debug!(
            "aggregate3: {} sub-calls, {} bytes of calldata",
            calls.len(),
            hex::encode(&calldata).len() / 2
        );

        let tx = alloy::rpc::types::TransactionRequest::default()
            .to(MULTICALL3_ADDRESS)
            .input(alloy::rpc::types::TransactionInput::new(Bytes::from(
                calldata,
            )));

        let result = self.provider.call(tx).await?;
        let decoded = aggregate3Call::abi_decode_returns(&result)?;

        debug!(
            "aggregate3 returned {} results in {}ms",
            decoded.len(),
            start.elapsed().as_millis()
        );

        Ok(decoded
            .into_iter()
            .map(|r| CallOutcome {
                success: r.success,
                data: r.returnData,
            })
            .collect())
    }
}

/// Replaces every pool's state snapshot in one batched round trip.
///
/// Pools whose sub-calls failed or decoded to implausible values are left
/// stateless for the cycle and logged; a failed batch leaves every pool
/// stateless. Returns the number of pools loaded.
pub async fn refresh_pool_states(client: &dyn ChainClient, pools: &mut [Pool]) -> usize {
    let mut specs = Vec::new();
    let mut counts = Vec::with_capacity(pools.len());
    for pool in pools.iter() {
        let calls = pool.required_state_calls();
        counts.push(calls.len());
        specs.extend(calls);
    }

    // Last cycle's snapshots are stale the moment a new cycle starts
    for pool in pools.iter_mut() {
        pool.state = None;
    }
    if specs.is_empty() {
        return 0;
    }

    let outcomes = match client.batch_call(&specs).await {
        Ok(outcomes) if outcomes.len() == specs.len() => outcomes,
        Ok(outcomes) => {
            warn!(
                "State multicall returned {} results for {} calls; cycle has no state",
                outcomes.len(),
                specs.len()
            );
            return 0;
        }
        Err(e) => {
            warn!("State multicall failed: {e:#}");
            return 0;
        }
    };

    let mut loaded = 0;
    let mut cursor = 0;
    for (pool, count) in pools.iter_mut().zip(counts) {
        let slice = &outcomes[cursor..cursor + count];
        cursor += count;
        match pool.load_state(slice) {
            Ok(()) => loaded += 1,
            Err(e) => warn!("{} excluded this cycle: {}", pool.display_name(), e),
        }
    }
    loaded
}

/// Resolves token0/token1 for pools the registry gave no hint for.
/// A pool whose resolution fails keeps no token pair and drops out of route
/// enumeration until a later attempt succeeds.
pub async fn resolve_pool_tokens(client: &dyn ChainClient, pools: &mut [Pool]) {
    let pending: Vec<usize> = (0..pools.len())
        .filter(|&i| pools[i].tokens().is_none())
        .collect();
    if pending.is_empty() {
        return;
    }

    let mut specs = Vec::with_capacity(pending.len() * 2);
    for &i in &pending {
        specs.push(CallSpec {
            target: pools[i].address,
            calldata: Bytes::from(token0Call {}.abi_encode()),
        });
        specs.push(CallSpec {
            target: pools[i].address,
            calldata: Bytes::from(token1Call {}.abi_encode()),
        });
    }

    let outcomes = match client.batch_call(&specs).await {
        Ok(outcomes) if outcomes.len() == specs.len() => outcomes,
        Ok(_) | Err(_) => {
            warn!("Token resolution multicall failed for {} pools", pending.len());
            return;
        }
    };

    for (slot, &i) in pending.iter().enumerate() {
        let t0 = decode_address(&outcomes[slot * 2]);
        let t1 = decode_address(&outcomes[slot * 2 + 1]);
        match (t0, t1) {
            (Some(token0), Some(token1)) => pools[i].set_tokens(token0, token1),
            _ => warn!(
                "Could not resolve token pair for {}; pool stays out of routes",
                pools[i].display_name()
            ),
        }
    }
}

/// Resolves live fees for dynamic-fee pools, once per process.
/// Query failure is tolerated; the pool's fallback fee applies.
pub async fn resolve_dynamic_fees(client: &dyn ChainClient, pools: &mut [Pool]) {
    let pending: Vec<usize> = (0..pools.len())
        .filter(|&i| pools[i].needs_fee_query())
        .collect();
    if pending.is_empty() {
        return;
    }

    let specs: Vec<CallSpec> = pending
        .iter()
        .map(|&i| CallSpec {
            target: pools[i].address,
            calldata: Bytes::from(feeCall {}.abi_encode()),
        })
        .collect();

    let outcomes = match client.batch_call(&specs).await {
        Ok(outcomes) if outcomes.len() == specs.len() => outcomes,
        Ok(_) | Err(_) => {
            warn!(
                "Fee resolution multicall failed; {} pools keep fallback fees",
                pending.len()
            );
            return;
        }
    };

    for (outcome, &i) in outcomes.iter().zip(&pending) {
        match decode_fee_ppm(outcome) {
            Some(ppm) => pools[i].set_live_fee(ppm),
            None => warn!(
                "Live fee query failed for {}; using fallback",
                pools[i].display_name()
            ),
        }
    }
}

fn decode_address(outcome: &CallOutcome) -> Option<Address> {
    if !outcome.success || outcome.data.len() < 32 {
        return None;
    }
    Some(Address::from_slice(&outcome.data[12..32]))
}

fn decode_fee_ppm(outcome: &CallOutcome) -> Option<u32> {
    if !outcome.success || outcome.data.len() < 32 {
        return None;
    }
    if outcome.data[..28].iter().any(|&b| b != 0) {
        return None;
    }
    let ppm = u32::from_be_bytes([
        outcome.data[28],
        outcome.data[29],
        outcome.data[30],
        outcome.data[31],
    ]);
    // A fee at or above 100% means a garbage payload, not a tier
    (ppm < 1_000_000).then_some(ppm)
}
