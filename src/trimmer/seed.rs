// src/trimmer/seed.rs - Parallel nonce scatter into the first arena
// Tree location: ./src/trimmer/seed.rs

//! Seeding pass: enumerate every candidate nonce and scatter it into
//! arena A, bucketed by the high B bits of its side-0 endpoint hash.
//!
//! The nonce range is split into contiguous chunks processed in parallel;
//! each chunk stages entries per destination bucket and reserves batched
//! slot ranges, so bucket counters see one atomic operation per
//! [`FLUSH`](super::arena::FLUSH) entries rather than one per nonce.
//! Nonce 0 is an ordinary edge: slot reservations are exact, so no
//! empty-slot sentinel exists.
//!
//! Intra-bucket entry order depends on chunk scheduling and is
//! unspecified; only the entry set is deterministic.

use rayon::prelude::*;

use super::arena::{Arena, BucketWriter};
use crate::params::CuckooParams;
use crate::siphash::SipKeys;

/// Scatter all `NUM_EDGES` nonces into `dst`, bucketed by the side-0
/// endpoint. `chunks` controls task granularity (0 = one chunk per
/// rayon thread, times four for load balance).
pub fn seed<P: CuckooParams>(keys: &SipKeys, dst: &Arena, chunks: usize) {
    let num_edges = P::NUM_EDGES as u32;
    let chunks = effective_chunks(chunks, num_edges);
    let chunk_len = (num_edges as usize).div_ceil(chunks) as u32;

    (0..chunks as u32).into_par_iter().for_each(|chunk| {
        let lo = chunk * chunk_len;
        let hi = (lo + chunk_len).min(num_edges);
        let mut writer = BucketWriter::new(dst);
        for nonce in lo..hi {
            let h0 = keys.node_hash::<P>(nonce, 0);
            writer.push((h0 >> P::Z_BITS) as usize, nonce as u64);
        }
        writer.drain();
    });
}

fn effective_chunks(requested: usize, num_edges: u32) -> usize {
    let chunks = if requested == 0 {
        rayon::current_num_threads() * 4
    } else {
        requested
    };
    chunks.clamp(1, num_edges.max(1) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Cyclone8;

    fn toy_arena() -> Arena {
        // Generous capacity so nothing is dropped at toy scale.
        Arena::new(Cyclone8::NUM_BUCKETS, 64)
    }

    fn collect(arena: &Arena) -> Vec<Vec<u64>> {
        let mut out = Vec::new();
        let mut bucket = Vec::new();
        for b in 0..arena.buckets() {
            arena.load_bucket(b, &mut bucket);
            bucket.sort_unstable();
            out.push(bucket.clone());
        }
        out
    }

    #[test]
    fn test_seed_places_every_nonce_once() {
        let keys = SipKeys::from_header(&[0u8; 80], 0, false).unwrap();
        let arena = toy_arena();
        seed::<Cyclone8>(&keys, &arena, 0);

        assert_eq!(arena.total(), Cyclone8::NUM_EDGES);
        assert_eq!(arena.dropped(), 0);
        for (b, entries) in collect(&arena).iter().enumerate() {
            for &entry in entries {
                let nonce = entry as u32;
                let h0 = keys.node_hash::<Cyclone8>(nonce, 0);
                assert_eq!((h0 >> Cyclone8::Z_BITS) as usize, b);
            }
        }
    }

    #[test]
    fn test_seed_set_independent_of_chunking() {
        let keys = SipKeys::from_header(&[7u8; 80], 3, true).unwrap();
        let a = toy_arena();
        let b = toy_arena();
        seed::<Cyclone8>(&keys, &a, 1);
        seed::<Cyclone8>(&keys, &b, 13);
        assert_eq!(collect(&a), collect(&b));
    }

    #[test]
    fn test_seed_includes_nonce_zero() {
        let keys = SipKeys::from_header(&[0u8; 80], 0, false).unwrap();
        let arena = toy_arena();
        seed::<Cyclone8>(&keys, &arena, 0);

        let bucket = (keys.node_hash::<Cyclone8>(0, 0) >> Cyclone8::Z_BITS) as usize;
        let mut entries = Vec::new();
        arena.load_bucket(bucket, &mut entries);
        assert!(entries.contains(&0));
    }
}
