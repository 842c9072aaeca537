// src/graph.rs - Cycle detection over the trimmed survivor set
// Tree location: ./src/graph.rs

//! Host-side cycle finder
//!
//! Builds a union-find forest over compressed node slots as survivor
//! edges stream in. Sibling endpoint hashes (values differing only in
//! their lowest bit) name the same node, so a slot is the hash with the
//! parity bit and the top `IDX_SHIFT` bits dropped, tagged with its side.
//! Every forest link remembers the edge that created it; when an
//! incoming edge's two endpoints already share a root, the recorded
//! paths are walked to their junction and the loop is reported as a
//! candidate iff it closes with exactly L edges.
//!
//! Slot compression can alias distinct nodes, so candidates may be false
//! cycles; callers verify each proof against the oracle before reporting
//! it. Duplicate `(u, v)` pairs are dropped at insertion and counted.

use hashbrown::HashSet;
use std::marker::PhantomData;

use crate::params::CuckooParams;

/// Forest paths longer than this abort the edge instead of the solve.
const MAX_PATH_LEN: usize = 8192;

const NONE: u32 = u32::MAX;

/// Counters from one finder pass.
#[derive(Debug, Clone, Default)]
pub struct FinderStats {
    /// Edges processed (after dedup).
    pub edges: usize,
    /// Duplicate edges dropped at insertion.
    pub dups: usize,
    /// Edges skipped because a forest path exceeded the walk bound.
    pub path_overflows: usize,
    /// Root collisions whose loop length was not L.
    pub wrong_length: usize,
    /// Candidate L-cycles recorded.
    pub candidates: usize,
}

/// Union-find cycle finder over one survivor list.
pub struct CycleFinder<P: CuckooParams> {
    /// Parent slot per node slot; `NONE` marks a root.
    prev: Vec<u32>,
    /// Edge index that created the link to the parent.
    prev_edge: Vec<u32>,
    stats: FinderStats,
    _params: PhantomData<P>,
}

impl<P: CuckooParams> CycleFinder<P> {
    /// Allocate a finder with all `2 · MAX_EDGES` slots isolated.
    pub fn new() -> Self {
        CycleFinder {
            prev: vec![NONE; 2 * P::MAX_EDGES],
            prev_edge: vec![NONE; 2 * P::MAX_EDGES],
            stats: FinderStats::default(),
            _params: PhantomData,
        }
    }

    /// Compressed, side-tagged slot of an endpoint hash.
    #[inline]
    fn slot(hash: u32, side: u32) -> u32 {
        (((hash >> 1) & (P::MAX_EDGES as u32 - 1)) << 1) | side
    }

    /// Feed the survivor list and return candidate cycles as lists of
    /// edge indices (positions in `edges`), at most `MAX_SOLS` of them.
    pub fn find_cycles(mut self, edges: &[(u32, u32)]) -> (Vec<Vec<u32>>, FinderStats) {
        let mut seen: HashSet<(u32, u32)> = HashSet::with_capacity(edges.len());
        let mut sols: Vec<Vec<u32>> = Vec::new();

        for (idx, &(u, v)) in edges.iter().enumerate() {
            if !seen.insert((u, v)) {
                self.stats.dups += 1;
                continue;
            }
            self.stats.edges += 1;

            let us = Self::slot(u, 0);
            let vs = Self::slot(v, 1);
            let (Some(pu), Some(pv)) = (self.path(us), self.path(vs)) else {
                self.stats.path_overflows += 1;
                continue;
            };

            if pu.last().unwrap().0 == pv.last().unwrap().0 {
                // Shared root: the new edge closes a loop.
                let (mut i, mut j) = (pu.len() - 1, pv.len() - 1);
                while i > 0 && j > 0 && pu[i - 1].0 == pv[j - 1].0 {
                    i -= 1;
                    j -= 1;
                }
                let len = i + j + 1;
                if len != P::PROOF_SIZE {
                    self.stats.wrong_length += 1;
                    continue;
                }
                self.stats.candidates += 1;
                if sols.len() < P::MAX_SOLS {
                    let mut cycle: Vec<u32> = Vec::with_capacity(len);
                    cycle.extend(pu[1..=i].iter().map(|&(_, e)| e));
                    cycle.extend(pv[1..=j].iter().map(|&(_, e)| e));
                    cycle.push(idx as u32);
                    cycle.sort_unstable();
                    tracing::debug!("{}-cycle candidate closed by edge {}", len, idx);
                    sols.push(cycle);
                }
            } else if pu.len() <= pv.len() {
                self.attach(&pu, vs, idx as u32);
            } else {
                self.attach(&pv, us, idx as u32);
            }
        }

        tracing::debug!(
            "cycle search: {} edges, {} dups, {} candidates, {} off-length loops",
            self.stats.edges,
            self.stats.dups,
            self.stats.candidates,
            self.stats.wrong_length
        );
        (sols, self.stats)
    }

    /// Walk a slot to its root, recording `(slot, edge linking the
    /// previous slot here)` per hop. `None` when the walk exceeds
    /// [`MAX_PATH_LEN`].
    fn path(&self, start: u32) -> Option<Vec<(u32, u32)>> {
        let mut path = vec![(start, NONE)];
        let mut cur = start;
        while self.prev[cur as usize] != NONE {
            let next = self.prev[cur as usize];
            path.push((next, self.prev_edge[cur as usize]));
            cur = next;
            if path.len() > MAX_PATH_LEN {
                return None;
            }
        }
        Some(path)
    }

    /// Re-root the recorded path at its head and hang it under `onto`
    /// through the new edge.
    fn attach(&mut self, path: &[(u32, u32)], onto: u32, edge: u32) {
        for k in 1..path.len() {
            let (slot, link_edge) = path[k];
            self.prev[slot as usize] = path[k - 1].0;
            self.prev_edge[slot as usize] = link_edge;
        }
        let head = path[0].0;
        self.prev[head as usize] = onto;
        self.prev_edge[head as usize] = edge;
    }
}

impl<P: CuckooParams> Default for CycleFinder<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Cyclone8;

    type P = Cyclone8;

    #[test]
    fn test_planted_four_cycle_is_found() {
        // u-siblings (2,3), (6,7); v-siblings (10,11), (9,8): edges
        // 0-1-2-3 close a 4-cycle.
        let edges = vec![(2, 8), (3, 10), (6, 11), (7, 9)];
        let (sols, stats) = CycleFinder::<P>::new().find_cycles(&edges);
        assert_eq!(sols, vec![vec![0, 1, 2, 3]]);
        assert_eq!(stats.candidates, 1);
        assert_eq!(stats.dups, 0);
    }

    #[test]
    fn test_duplicate_edges_are_counted_not_followed() {
        let edges = vec![(2, 8), (2, 8), (3, 10)];
        let (sols, stats) = CycleFinder::<P>::new().find_cycles(&edges);
        assert!(sols.is_empty());
        assert_eq!(stats.dups, 1);
        assert_eq!(stats.edges, 2);
    }

    #[test]
    fn test_acyclic_input_yields_nothing() {
        let edges = vec![(2, 8), (3, 10), (6, 11)];
        let (sols, stats) = CycleFinder::<P>::new().find_cycles(&edges);
        assert!(sols.is_empty());
        assert_eq!(stats.candidates, 0);
    }

    #[test]
    fn test_two_cycle_rejected_for_length() {
        // Parallel edges between the same node pair: a 2-cycle, not a
        // 4-cycle. The second pair uses sibling hashes so it is not a
        // duplicate entry.
        let edges = vec![(2, 8), (3, 9)];
        let (sols, stats) = CycleFinder::<P>::new().find_cycles(&edges);
        assert!(sols.is_empty());
        assert_eq!(stats.wrong_length, 1);
    }

    #[test]
    fn test_empty_input() {
        let (sols, stats) = CycleFinder::<P>::new().find_cycles(&[]);
        assert!(sols.is_empty());
        assert_eq!(stats.edges, 0);
    }
}
