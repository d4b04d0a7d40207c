//! Cycle orchestration: refresh state, enumerate routes, evaluate, rank.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::evaluator::{evaluate_all, Opportunity};
use crate::multicall::{
    refresh_pool_states, resolve_dynamic_fees, resolve_pool_tokens, ChainClient,
};
use crate::pools::Pool;
use crate::ranker::rank;
use crate::routes::enumerate_triangles;
use crate::tokens::TokenCache;

/// Counters for one completed cycle
#[derive(Debug, Clone, Default)]
pub struct CycleStats {
    pub pools_total: usize,
    pub pools_loaded: usize,
    pub triangles: usize,
    pub permutations: usize,
    pub opportunities: usize,
    pub elapsed_ms: u128,
}

/// Everything a cycle produced, ranked best-first
pub struct ScanOutcome {
    pub opportunities: Vec<Opportunity>,
    pub stats: CycleStats,
}

pub struct Scanner {
    pools: Vec<Pool>,
    cache: Arc<TokenCache>,
    client: Arc<dyn ChainClient>,
}

impl Scanner {
    pub fn new(pools: Vec<Pool>, client: Arc<dyn ChainClient>) -> Self {
        Self {
            pools,
            cache: Arc::new(TokenCache::new()),
            client,
        }
    }

    /// One-time startup resolution: token pairs for hint-less pools, token
    /// decimals, and live fees for dynamic-fee pools. Each step tolerates
    /// failure; affected pools degrade rather than abort the run.
    pub async fn prepare(&mut self) {
        resolve_pool_tokens(self.client.as_ref(), &mut self.pools).await;

        let mut tokens = Vec::new();
        for pool in &self.pools {
            if let Some((t0, t1)) = pool.tokens() {
                tokens.push(t0);
                tokens.push(t1);
            }
        }
        tokens.sort();
        tokens.dedup();
        self.cache.resolve(self.client.as_ref(), &tokens).await;

        resolve_dynamic_fees(self.client.as_ref(), &mut self.pools).await;
        info!(
            "Prepared {} pools over {} tokens",
            self.pools.len(),
            tokens.len()
        );
    }

    /// One full detection cycle against a single state snapshot.
    /// A cycle that loads no pools is an empty outcome, not an error.
    pub async fn run_cycle(&mut self) -> ScanOutcome {
        let start = Instant::now();
        let mut stats = CycleStats {
            pools_total: self.pools.len(),
            ..Default::default()
        };

        stats.pools_loaded = refresh_pool_states(self.client.as_ref(), &mut self.pools).await;
        if stats.pools_loaded == 0 {
            warn!("No pool state loaded this cycle");
            stats.elapsed_ms = start.elapsed().as_millis();
            return ScanOutcome {
                opportunities: Vec::new(),
                stats,
            };
        }

        let triangles = enumerate_triangles(&self.pools);
        stats.triangles = triangles.len();
        stats.permutations = triangles.len() * 6;

        let opportunities = rank(
            evaluate_all(
                Arc::new(self.pools.clone()),
                Arc::new(triangles),
                Arc::clone(&self.cache),
            )
            .await,
        );
        stats.opportunities = opportunities.len();
        stats.elapsed_ms = start.elapsed().as_millis();

        info!(
            "Cycle: {}/{} pools, {} triangles, {} opportunities in {}ms",
            stats.pools_loaded,
            stats.pools_total,
            stats.triangles,
            stats.opportunities,
            stats.elapsed_ms
        );
        ScanOutcome {
            opportunities,
            stats,
        }
    }

    pub fn token_cache(&self) -> Arc<TokenCache> {
        Arc::clone(&self.cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{tokens, PoolRecord};
    use crate::multicall::{CallOutcome, CallSpec};
    use alloy::primitives::{Address, Bytes, U256};
    use async_trait::async_trait;
    use eyre::Result;
    use std::sync::Mutex;

    /// Serves one canned outcome vector per batch, in order
    struct ScriptedClient {
        script: Mutex<Vec<Vec<CallOutcome>>>,
    }

    impl ScriptedClient {
        fn new(script: Vec<Vec<CallOutcome>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
            })
        }
    }

    #[async_trait]
    impl ChainClient for ScriptedClient {
        async fn batch_call(&self, _calls: &[CallSpec]) -> Result<Vec<CallOutcome>> {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                eyre::bail!("script exhausted");
            }
            Ok(script.remove(0))
        }
    }

    fn reserves(r0: U256, r1: U256) -> CallOutcome {
        let mut data = Vec::new();
        data.extend_from_slice(&r0.to_be_bytes::<32>());
        data.extend_from_slice(&r1.to_be_bytes::<32>());
        CallOutcome {
            success: true,
            data: data.into(),
        }
    }

    fn pool(n: u8, t0: Address, t1: Address) -> Pool {
        let mut addr = [0u8; 20];
        addr[0] = n;
        Pool::from_record(&PoolRecord {
            address: Address::from(addr),
            protocol: "uniswap_v2".to_string(),
            fee: Some(500),
            tokens: Some([t0, t1]),
            label: None,
            dynamic_fee: false,
        })
        .unwrap()
    }

    fn pow10(n: u32) -> U256 {
        U256::from(10u8).pow(U256::from(n))
    }

    #[tokio::test]
    async fn end_to_end_cycle_surfaces_the_mispricing() {
        let pools = vec![
            pool(1, tokens::USDC, tokens::WETH),
            pool(2, tokens::WETH, tokens::CBBTC),
            pool(3, tokens::CBBTC, tokens::USDC),
        ];
        // Batch 1: state refresh with a 2% rate-product mispricing
        let client = ScriptedClient::new(vec![vec![
            reserves(pow10(16), pow10(24) * U256::from(4u8)),
            reserves(
                pow10(24) * U256::from(4u8),
                pow10(13) * U256::from(16u8) / U256::from(10u8),
            ),
            reserves(
                pow10(13) * U256::from(16u8) / U256::from(10u8),
                pow10(16) * U256::from(102u8) / U256::from(100u8),
            ),
        ]]);

        let mut scanner = Scanner::new(pools, client);
        scanner.token_cache().insert(tokens::USDC, 6);
        scanner.token_cache().insert(tokens::WETH, 18);
        scanner.token_cache().insert(tokens::CBBTC, 8);

        let outcome = scanner.run_cycle().await;
        assert_eq!(outcome.stats.pools_loaded, 3);
        assert_eq!(outcome.stats.triangles, 1);
        assert_eq!(outcome.stats.permutations, 6);
        assert_eq!(outcome.opportunities.len(), 3);
        assert!(outcome
            .opportunities
            .windows(2)
            .all(|w| w[0].net_profit_pct >= w[1].net_profit_pct));
    }

    #[tokio::test]
    async fn failed_pool_collapses_the_only_triangle() {
        let pools = vec![
            pool(1, tokens::USDC, tokens::WETH),
            pool(2, tokens::WETH, tokens::CBBTC),
            pool(3, tokens::CBBTC, tokens::USDC),
        ];
        let client = ScriptedClient::new(vec![vec![
            reserves(pow10(16), pow10(24)),
            CallOutcome {
                success: false,
                data: Bytes::new(),
            },
            reserves(pow10(13), pow10(16)),
        ]]);

        let mut scanner = Scanner::new(pools, client);
        let outcome = scanner.run_cycle().await;
        assert_eq!(outcome.stats.pools_loaded, 2);
        assert_eq!(outcome.stats.triangles, 0);
        assert!(outcome.opportunities.is_empty());
    }

    #[tokio::test]
    async fn transport_outage_yields_an_empty_outcome() {
        let pools = vec![pool(1, tokens::USDC, tokens::WETH)];
        let client = ScriptedClient::new(vec![]);
        let mut scanner = Scanner::new(pools, client);
        let outcome = scanner.run_cycle().await;
        assert_eq!(outcome.stats.pools_loaded, 0);
        assert!(outcome.opportunities.is_empty());
    }
}
