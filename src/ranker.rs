//! Ordering and truncation of retained opportunities.

use crate::evaluator::Opportunity;

/// Sorts by net profit percentage, best first. The sort is stable, so routes
/// with equal nets keep their evaluation order.
pub fn rank(mut opportunities: Vec<Opportunity>) -> Vec<Opportunity> {
    opportunities.sort_by(|a, b| b.net_profit_pct.cmp(&a.net_profit_pct));
    opportunities
}

/// The leading `k` entries of an already-ranked list
pub fn top(opportunities: &[Opportunity], k: usize) -> &[Opportunity] {
    &opportunities[..opportunities.len().min(k)]
}
