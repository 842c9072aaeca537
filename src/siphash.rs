// src/siphash.rs - SipHash-2-4 node oracle and key derivation
// Tree location: ./src/siphash.rs

//! SipHash-2-4 endpoint oracle for Cuckoo Cycle graphs
//!
//! SipHash is the keyed pseudorandom function that pins down the implicit
//! bipartite graph: edge `n` connects the side-0 node derived from input
//! `2n` and the side-1 node derived from `2n + 1`. The four 64-bit keys are
//! obtained by hashing the block header with Blake2b-256 and splitting the
//! digest little-endian.
//!
//! # Node addressing
//!
//! [`SipKeys::node_hash`] returns the raw N-bit oracle value used by the
//! trimmer (bucket = high B bits, in-bucket offset = low `N-B` bits). Two
//! hashes differing only in their lowest bit are *siblings*: they name the
//! same underlying node on that side, and sibling matching is what links
//! edges into paths and cycles. [`SipKeys::node_id`] is the external
//! parity-tagged form `2·hash + side`, even on side 0 and odd on side 1.
//!
//! # Version History
//! - 0.1.0: Initial port of the four-key SipHash-2-4 core
//! - 0.2.0: Header mutation support for nonce-in-header mining

use blake2_rfc::blake2b::blake2b;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::params::CuckooParams;
use crate::Cyclone29Error;

/// Immutable SipHash-2-4 key set for one (header, nonce) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SipKeys {
    /// The four key words `k0..k3`, used directly as the initial state.
    pub k: [u64; 4],
}

impl SipKeys {
    /// Derive keys from a raw header.
    ///
    /// When `mutate_nonce` is set, the last 4 bytes of the header are
    /// overwritten with the little-endian nonce before hashing; otherwise
    /// the header is hashed as-is and the nonce is ignored.
    pub fn from_header(header: &[u8], nonce: u64, mutate_nonce: bool) -> Result<Self, Cyclone29Error> {
        if mutate_nonce && header.len() < 4 {
            return Err(Cyclone29Error::Header(format!(
                "header too short to mutate: {} bytes",
                header.len()
            )));
        }

        let digest;
        let hash = if mutate_nonce {
            let mut mutated = header.to_vec();
            let at = mutated.len() - 4;
            mutated[at..].copy_from_slice(&(nonce as u32).to_le_bytes());
            digest = blake2b(32, &[], &mutated);
            digest.as_bytes()
        } else {
            digest = blake2b(32, &[], header);
            digest.as_bytes()
        };

        let mut cursor = Cursor::new(hash);
        let mut k = [0u64; 4];
        for word in k.iter_mut() {
            *word = cursor
                .read_u64::<LittleEndian>()
                .map_err(|e| Cyclone29Error::Header(format!("failed to read sipkey word: {}", e)))?;
        }

        Ok(SipKeys { k })
    }

    /// Core SipHash-2-4: 2 compression rounds, 4 finalization rounds,
    /// state initialized from the four key words.
    #[inline]
    pub fn siphash24(&self, message: u64) -> u64 {
        let mut v0 = self.k[0];
        let mut v1 = self.k[1];
        let mut v2 = self.k[2];
        let mut v3 = self.k[3];

        v3 ^= message;
        sipround(&mut v0, &mut v1, &mut v2, &mut v3);
        sipround(&mut v0, &mut v1, &mut v2, &mut v3);
        v0 ^= message;

        v2 ^= 0xff;
        for _ in 0..4 {
            sipround(&mut v0, &mut v1, &mut v2, &mut v3);
        }

        v0 ^ v1 ^ v2 ^ v3
    }

    /// Raw N-bit oracle value for one endpoint of edge `nonce`.
    ///
    /// Pure and total: every `(nonce, side)` maps to exactly one hash.
    #[inline]
    pub fn node_hash<P: CuckooParams>(&self, nonce: u32, side: u32) -> u32 {
        debug_assert!(side < 2);
        (self.siphash24(2 * nonce as u64 + side as u64) as u32) & P::EDGE_MASK
    }

    /// External parity-tagged node id: `2·hash + side`. Side-0 ids are
    /// even, side-1 ids odd, so the two endpoint sets never collide.
    #[inline]
    pub fn node_id<P: CuckooParams>(&self, nonce: u32, side: u32) -> u32 {
        self.node_hash::<P>(nonce, side) * 2 + side
    }
}

/// Single SipHash mixing round; state words updated in place.
#[inline]
fn sipround(v0: &mut u64, v1: &mut u64, v2: &mut u64, v3: &mut u64) {
    *v0 = v0.wrapping_add(*v1);
    *v1 = v1.rotate_left(13);
    *v1 ^= *v0;
    *v0 = v0.rotate_left(32);

    *v2 = v2.wrapping_add(*v3);
    *v3 = v3.rotate_left(16);
    *v3 ^= *v2;

    *v0 = v0.wrapping_add(*v3);
    *v3 = v3.rotate_left(21);
    *v3 ^= *v0;

    *v2 = v2.wrapping_add(*v1);
    *v1 = v1.rotate_left(17);
    *v1 ^= *v2;
    *v2 = v2.rotate_left(32);
}
