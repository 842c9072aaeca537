// src/trimmer/reference.rs - Sequential reference trimmer
// Tree location: ./src/trimmer/reference.rs

//! Naive single-threaded trimmer used as the correctness baseline.
//!
//! Keeps the whole surviving nonce set in one vector and applies the
//! round retention rule globally: an edge survives round `r` iff some
//! current survivor's keyed endpoint is its sibling. Because a bucket is
//! exactly the set of edges sharing the keyed endpoint's high bits, this
//! is the same edge set the bucketed pipeline retains (when no bucket
//! overflows), just without the arenas, staging, or parallelism.

use crate::params::CuckooParams;
use crate::siphash::SipKeys;

/// Run `ntrims` sequential trim rounds and return the sorted survivor
/// edge list as `(side-0 hash, side-1 hash)` pairs.
pub fn reference_trim<P: CuckooParams>(keys: &SipKeys, ntrims: u32) -> Vec<(u32, u32)> {
    reference_trim_observed::<P>(keys, ntrims, |_, _| {})
}

/// [`reference_trim`] with a per-round survivor-count observer.
pub fn reference_trim_observed<P: CuckooParams>(
    keys: &SipKeys,
    ntrims: u32,
    mut observer: impl FnMut(u32, u64),
) -> Vec<(u32, u32)> {
    let mut survivors: Vec<u32> = (0..P::NUM_EDGES as u32).collect();
    let words = (P::NUM_EDGES as usize).div_ceil(64);
    let mut present = vec![0u64; words];

    for round in 0..ntrims {
        let side = round & 1;
        present.fill(0);
        for &nonce in &survivors {
            let h = keys.node_hash::<P>(nonce, side);
            present[(h >> 6) as usize] |= 1u64 << (h & 63);
        }
        survivors.retain(|&nonce| {
            let sib = keys.node_hash::<P>(nonce, side) ^ 1;
            present[(sib >> 6) as usize] & (1u64 << (sib & 63)) != 0
        });
        observer(round, survivors.len() as u64);
    }

    let mut edges: Vec<(u32, u32)> = survivors
        .iter()
        .map(|&n| (keys.node_hash::<P>(n, 0), keys.node_hash::<P>(n, 1)))
        .collect();
    edges.sort_unstable();
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Cyclone8;

    type P = Cyclone8;

    #[test]
    fn test_reference_monotonic_and_sibling_closed() {
        let keys = SipKeys::from_header(&[0u8; 80], 0, false).unwrap();
        let mut counts = Vec::new();
        let edges = reference_trim_observed::<P>(&keys, 8, |_, kept| counts.push(kept));

        for pair in counts.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
        assert_eq!(edges.len() as u64, *counts.last().unwrap());

        // The last round keyed side 1, so every survivor's side-1 sibling
        // must still be in the set. (Side 0 is only guaranteed at a fixed
        // point; see the idempotence test.)
        for &(_, v) in &edges {
            assert!(
                edges.iter().any(|&(_, v2)| v2 == v ^ 1),
                "survivor lost its keyed-side sibling"
            );
        }
    }

    #[test]
    fn test_reference_idempotent_after_convergence() {
        let keys = SipKeys::from_header(&[3u8; 80], 5, true).unwrap();
        // Walk out in same-parity steps until two consecutive results
        // agree; equal sets two rounds apart mean a fixed point for both
        // keyed sides, so any longer schedule must reproduce it.
        let mut prev = reference_trim::<P>(&keys, 4);
        let mut fixed = None;
        for ntrims in (6..=600u32).step_by(2) {
            let cur = reference_trim::<P>(&keys, ntrims);
            if cur == prev {
                fixed = Some(ntrims);
                break;
            }
            prev = cur;
        }
        let ntrims = fixed.expect("toy edge set reaches a fixed point");
        assert_eq!(reference_trim::<P>(&keys, ntrims + 8), prev);
    }
}
