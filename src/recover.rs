// src/recover.rs - Mapping solution edges back to their nonces
// Tree location: ./src/recover.rs

//! Nonce recovery: re-run the endpoint oracle over the whole nonce range
//! and match each candidate-cycle edge `(u, v)` back to the nonce that
//! generated it.
//!
//! The scan is chunked across rayon workers writing into atomic slots;
//! a slot left unfilled or a non-ascending result fails the candidate
//! (the oracle is expected to be collision-free on a genuine solution
//! set, so failures mean the candidate was a compression artifact).

use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::params::CuckooParams;
use crate::siphash::SipKeys;

const UNFILLED: u32 = u32::MAX;

/// Recover the nonces behind `edges`, sorted ascending. `None` when any
/// edge has no generating nonce or the recovered set is degenerate.
pub fn recover<P: CuckooParams>(
    keys: &SipKeys,
    edges: &[(u32, u32)],
    chunks: usize,
) -> Option<Vec<u32>> {
    if edges.is_empty() {
        return None;
    }
    let slots: Vec<AtomicU32> = (0..edges.len()).map(|_| AtomicU32::new(UNFILLED)).collect();

    let num_edges = P::NUM_EDGES as u32;
    let chunks = if chunks == 0 {
        rayon::current_num_threads() * 4
    } else {
        chunks
    };
    let chunks = chunks.clamp(1, num_edges.max(1) as usize);
    let chunk_len = (num_edges as usize).div_ceil(chunks) as u32;

    (0..chunks as u32).into_par_iter().for_each(|chunk| {
        let lo = chunk * chunk_len;
        let hi = (lo + chunk_len).min(num_edges);
        for nonce in lo..hi {
            let u = keys.node_hash::<P>(nonce, 0);
            let mut v = None;
            for (i, &(eu, ev)) in edges.iter().enumerate() {
                if eu != u {
                    continue;
                }
                let v = *v.get_or_insert_with(|| keys.node_hash::<P>(nonce, 1));
                if ev == v {
                    slots[i].store(nonce, Ordering::Relaxed);
                }
            }
        }
    });

    let mut nonces: Vec<u32> = Vec::with_capacity(edges.len());
    for slot in &slots {
        let nonce = slot.load(Ordering::Relaxed);
        if nonce == UNFILLED {
            tracing::debug!("recovery failed: edge with no generating nonce");
            return None;
        }
        nonces.push(nonce);
    }
    nonces.sort_unstable();
    if nonces.windows(2).any(|w| w[0] >= w[1]) {
        tracing::debug!("recovery failed: degenerate nonce set");
        return None;
    }
    Some(nonces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Cyclone8;
    use hashbrown::HashSet;

    type P = Cyclone8;

    fn keys() -> SipKeys {
        SipKeys::from_header(&[0u8; 80], 0, false).unwrap()
    }

    fn edge(keys: &SipKeys, n: u32) -> (u32, u32) {
        (keys.node_hash::<P>(n, 0), keys.node_hash::<P>(n, 1))
    }

    #[test]
    fn test_recover_round_trips_distinct_edges() {
        let keys = keys();
        // Pick four nonces whose endpoint pairs are pairwise distinct so
        // the recovered set cannot degenerate.
        let mut picked = Vec::new();
        let mut pairs = HashSet::new();
        for n in 0..P::NUM_EDGES as u32 {
            if pairs.insert(edge(&keys, n)) {
                picked.push(n);
                if picked.len() == 4 {
                    break;
                }
            }
        }
        let edges: Vec<(u32, u32)> = picked.iter().map(|&n| edge(&keys, n)).collect();

        let nonces = recover::<P>(&keys, &edges, 3).expect("all edges recoverable");
        assert_eq!(nonces.len(), 4);
        assert!(nonces.windows(2).all(|w| w[0] < w[1]));
        for &n in &nonces {
            assert!(edges.contains(&edge(&keys, n)));
        }
    }

    #[test]
    fn test_recover_fails_on_unreachable_edge() {
        let keys = keys();
        let image: HashSet<(u32, u32)> =
            (0..P::NUM_EDGES as u32).map(|n| edge(&keys, n)).collect();
        let phantom = (0..=P::EDGE_MASK)
            .flat_map(|u| (0..=P::EDGE_MASK).map(move |v| (u, v)))
            .find(|pair| !image.contains(pair))
            .expect("256 nonces cannot cover 65536 pairs");

        assert!(recover::<P>(&keys, &[edge(&keys, 1), phantom], 0).is_none());
    }

    #[test]
    fn test_recover_empty_is_none() {
        assert!(recover::<P>(&keys(), &[], 0).is_none());
    }
}
