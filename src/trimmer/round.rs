// src/trimmer/round.rs - Bitmap-keyed leaf-pruning rounds
// Tree location: ./src/trimmer/round.rs

//! One trimming round: per bucket, mark the in-bucket offsets of the keyed
//! endpoint in a bitmap, then re-emit exactly the edges whose sibling bit
//! (offset with the lowest bit flipped) was also marked, routed into the
//! destination arena by the opposite endpoint's high bits.
//!
//! An edge's keyed endpoint and its sibling share the high B bits, so the
//! sibling test never leaves the bucket; it is the local screen for "this
//! node has the matching-parity partner an alternating cycle needs".
//!
//! # Round schedule
//!
//! Round `r` keys side `r & 1` and reads the arena the previous round
//! wrote (A for even rounds, B for odd rounds):
//!
//! - rounds 0-1 carry bare nonces and recompute endpoints on the fly;
//! - round 2 widens surviving entries into packed endpoint pairs;
//! - rounds ≥ 3 project the keyed endpoint straight from the stored pair.

use rayon::prelude::*;

use super::arena::{Arena, BucketWriter};
use crate::params::CuckooParams;
use crate::siphash::SipKeys;

/// Pack both endpoint hashes of an edge: side 1 in the high word,
/// side 0 in the low word.
#[inline]
pub fn pack_pair(h1: u32, h0: u32) -> u64 {
    ((h1 as u64) << 32) | h0 as u64
}

/// Project one side's endpoint hash out of a packed pair.
#[inline]
pub fn pair_side(pair: u64, side: u32) -> u32 {
    if side == 0 {
        pair as u32
    } else {
        (pair >> 32) as u32
    }
}

/// Run trim round `r` from `src` into `dst`. The caller is responsible
/// for clearing `dst` first and for passing arenas in schedule order.
pub fn trim_round<P: CuckooParams>(keys: &SipKeys, round: u32, src: &Arena, dst: &Arena) {
    let side = round & 1;
    (0..P::NUM_BUCKETS).into_par_iter().for_each_init(
        || (Vec::new(), Bitmap::new(P::NUM_Z)),
        |(entries, bitmap), bucket| {
            src.load_bucket(bucket, entries);
            if entries.is_empty() {
                return;
            }
            bitmap.clear();

            // Mark pass: one bit per keyed in-bucket offset.
            for &entry in entries.iter() {
                bitmap.set(keyed_z::<P>(keys, round, side, entry));
            }

            // Emit pass: keep the edge iff its sibling offset is marked.
            let mut writer = BucketWriter::new(dst);
            for &entry in entries.iter() {
                let z = keyed_z::<P>(keys, round, side, entry);
                if !bitmap.get(z ^ 1) {
                    continue;
                }
                let (dst_bucket, out) = route::<P>(keys, round, side, entry);
                writer.push(dst_bucket, out);
            }
            writer.drain();
        },
    );
}

/// In-bucket offset of the keyed endpoint for this round's entry payload.
#[inline]
fn keyed_z<P: CuckooParams>(keys: &SipKeys, round: u32, side: u32, entry: u64) -> u32 {
    let h = if round < 3 {
        keys.node_hash::<P>(entry as u32, side)
    } else {
        pair_side(entry, side)
    };
    h & P::Z_MASK
}

/// Destination bucket (keyed by the opposite endpoint) and outgoing
/// payload for a retained entry.
#[inline]
fn route<P: CuckooParams>(keys: &SipKeys, round: u32, side: u32, entry: u64) -> (usize, u64) {
    let other = 1 - side;
    if round < 2 {
        let nonce = entry as u32;
        let h_other = keys.node_hash::<P>(nonce, other);
        ((h_other >> P::Z_BITS) as usize, entry)
    } else if round == 2 {
        // Widening round: nonces become endpoint pairs.
        let nonce = entry as u32;
        let h0 = keys.node_hash::<P>(nonce, 0);
        let h1 = keys.node_hash::<P>(nonce, 1);
        ((h1 >> P::Z_BITS) as usize, pack_pair(h1, h0))
    } else {
        let h_other = pair_side(entry, other);
        ((h_other >> P::Z_BITS) as usize, entry)
    }
}

/// Fixed-size bit set over in-bucket offsets.
struct Bitmap {
    words: Vec<u64>,
}

impl Bitmap {
    fn new(bits: usize) -> Self {
        Bitmap {
            words: vec![0u64; bits.div_ceil(64)],
        }
    }

    fn clear(&mut self) {
        self.words.fill(0);
    }

    #[inline]
    fn set(&mut self, bit: u32) {
        self.words[(bit >> 6) as usize] |= 1u64 << (bit & 63);
    }

    #[inline]
    fn get(&self, bit: u32) -> bool {
        self.words[(bit >> 6) as usize] & (1u64 << (bit & 63)) != 0
    }
}
