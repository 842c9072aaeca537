// src/trimmer/tail.rs - Survivor export to the host edge list
// Tree location: ./src/trimmer/tail.rs

//! Tail pass: unpack the final arena's endpoint pairs into a flat
//! `(u, v)` edge list for the cycle finder.
//!
//! The list is capped at `MAX_EDGES`; exceeding the cap truncates and
//! flags the solve as abandoned for this nonce (the range driver moves
//! on). Survivors are sorted so downstream cycle finding sees the same
//! input regardless of how buckets were scheduled.

use rayon::prelude::*;

use super::arena::Arena;
use super::round::pair_side;
use crate::params::CuckooParams;

/// Outcome of the tail pass.
#[derive(Debug, Clone)]
pub struct TailEdges {
    /// Surviving `(u = side-0 hash, v = side-1 hash)` pairs, sorted.
    pub edges: Vec<(u32, u32)>,
    /// Survivors exceeded `MAX_EDGES`; `edges` is truncated and the solve
    /// must be abandoned for this nonce.
    pub overflowed: bool,
}

/// Collect the final arena into a sorted edge list, capped at
/// `P::MAX_EDGES` unless `capped` is false (the relay pipeline consumes
/// the full survivor set).
pub fn tail_collect<P: CuckooParams>(src: &Arena, capped: bool) -> TailEdges {
    let mut per_bucket: Vec<Vec<(u32, u32)>> = (0..P::NUM_BUCKETS)
        .into_par_iter()
        .map(|bucket| {
            let mut entries = Vec::new();
            src.load_bucket(bucket, &mut entries);
            entries
                .iter()
                .map(|&pair| (pair_side(pair, 0), pair_side(pair, 1)))
                .collect()
        })
        .collect();

    let total: usize = per_bucket.iter().map(Vec::len).sum();
    let overflowed = capped && total > P::MAX_EDGES;

    let mut edges = Vec::with_capacity(total.min(if capped { P::MAX_EDGES } else { total }));
    'fill: for bucket in per_bucket.iter_mut() {
        for edge in bucket.drain(..) {
            if capped && edges.len() == P::MAX_EDGES {
                break 'fill;
            }
            edges.push(edge);
        }
    }
    edges.sort_unstable();

    TailEdges { edges, overflowed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Cyclone8;
    use crate::trimmer::round::pack_pair;

    type P = Cyclone8;

    fn arena_with_pairs(pairs: &[(u32, u32)]) -> Arena {
        let arena = Arena::new(P::NUM_BUCKETS, 64);
        for &(h0, h1) in pairs {
            let bucket = (h0 >> P::Z_BITS) as usize;
            let (slot, got) = arena.reserve(bucket, 1);
            assert_eq!(got, 1);
            arena.write(bucket, slot, pack_pair(h1, h0));
        }
        arena
    }

    #[test]
    fn test_tail_unpacks_and_sorts() {
        let pairs = [(0xf3, 0x21), (0x05, 0xaa), (0x9c, 0x10)];
        let tail = tail_collect::<P>(&arena_with_pairs(&pairs), true);
        assert!(!tail.overflowed);
        assert_eq!(tail.edges, vec![(0x05, 0xaa), (0x9c, 0x10), (0xf3, 0x21)]);
    }

    #[test]
    fn test_tail_overflow_truncates_and_flags() {
        // MAX_EDGES is 16 for the toy geometry; emit one more.
        let pairs: Vec<(u32, u32)> = (0..P::MAX_EDGES as u32 + 1).map(|i| (i, i)).collect();
        let tail = tail_collect::<P>(&arena_with_pairs(&pairs), true);
        assert!(tail.overflowed);
        assert_eq!(tail.edges.len(), P::MAX_EDGES);

        let uncapped = tail_collect::<P>(&arena_with_pairs(&pairs), false);
        assert!(!uncapped.overflowed);
        assert_eq!(uncapped.edges.len(), P::MAX_EDGES + 1);
    }
}
