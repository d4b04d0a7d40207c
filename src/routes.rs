//! Structural phase of the route search: 3-pool combinations forming a
//! 3-cycle over exactly 3 tokens, and the 6 directed token orderings per
//! candidate. No pricing is consulted here; the pricing phase pays for
//! structurally valid candidates only.

use alloy::primitives::Address;

use crate::pools::Pool;

/// One triangle candidate: indices into the pool slice plus its 3 tokens
#[derive(Debug, Clone)]
pub struct Triangle {
    pub pools: [usize; 3],
    pub tokens: [Address; 3],
}

/// Enumerates every 3-pool combination of the loaded pools whose token pairs
/// form exactly 3 distinct tokens and 3 distinct undirected edges.
/// Stateless pools and pools without a resolved token pair never enter a
/// candidate, so triangles touching an excluded pool vanish silently.
pub fn enumerate_triangles(pools: &[Pool]) -> Vec<Triangle> {
    let eligible: Vec<usize> = (0..pools.len())
        .filter(|&i| pools[i].state.is_some() && pools[i].tokens().is_some())
        .collect();

    let mut triangles = Vec::new();
    for a in 0..eligible.len() {
        for b in (a + 1)..eligible.len() {
            for c in (b + 1)..eligible.len() {
                let combo = [eligible[a], eligible[b], eligible[c]];
                if let Some(tokens) = triangle_tokens(pools, combo) {
                    triangles.push(Triangle {
                        pools: combo,
                        tokens,
                    });
                }
            }
        }
    }
    triangles
}

/// Validates the triangle invariant for one combination and returns its token
/// set: 3 distinct tokens, 3 distinct undirected edges.
fn triangle_tokens(pools: &[Pool], combo: [usize; 3]) -> Option<[Address; 3]> {
    let mut tokens: Vec<Address> = Vec::with_capacity(6);
    let mut edges: Vec<(Address, Address)> = Vec::with_capacity(3);

    for idx in combo {
        let (t0, t1) = pools[idx].tokens()?;
        if t0 == t1 {
            return None;
        }
        let edge = if t0 < t1 { (t0, t1) } else { (t1, t0) };
        if edges.contains(&edge) {
            return None;
        }
        edges.push(edge);
        for t in [t0, t1] {
            if !tokens.contains(&t) {
                tokens.push(t);
            }
        }
    }

    (tokens.len() == 3).then(|| [tokens[0], tokens[1], tokens[2]])
}

/// The 6 directed token cycles of a triangle
pub fn token_orders(triangle: &Triangle) -> [[Address; 3]; 6] {
    let [a, b, c] = triangle.tokens;
    [
        [a, b, c],
        [a, c, b],
        [b, a, c],
        [b, c, a],
        [c, a, b],
        [c, b, a],
    ]
}
