// src/trimmer/relay.rs - Degree-2 path collapsing with tagged edges
// Tree location: ./src/trimmer/relay.rs

//! Tag relay: collapse chains of surviving edges into single tagged edges
//! so an L-cycle shows up as a two-edge cycle in the relayed multigraph.
//!
//! Each relay round works per bucket with a chained hash table keyed by
//! the low [`LIST_BITS`] bits of the collapse-side endpoint. Every
//! non-copy edge pairs with every sibling partner on the flipped list
//! (endpoints differing only in their lowest bit name the same node, so a
//! sibling pair is a degree-2 junction) and re-emits one tagged edge
//! spanning the junction. The first round pairs plain edges into
//! two-edge paths; each later round grows a path by one edge at its
//! frontier. After `ceil(L/2) - 1` rounds an L-cycle is covered by two
//! paths whose ends are mutual siblings, which the closure pass detects
//! and expands back into the original edge set.
//!
//! # Tagged edge word layout
//!
//! This is the only place the 64-bit tagged-edge layout is defined:
//!
//! ```text
//! bits 63..32+ZBITS  tag        provenance field; top bit is COPY_FLAG
//! bits 32+ZBITS..32  frontier z low Z bits of the frontier endpoint
//!                               (high bits come from the storage bucket)
//! bits 31..0         anchor     full anchor endpoint (its own high bits
//!                               double as the group field)
//! ```
//!
//! On the first relay the tag is derived from the partner's far endpoint;
//! later rounds propagate the prior tag. The tag is advisory provenance:
//! full-resolution expansion goes through the host-side source table,
//! which records the two constituents of every relayed edge.
//!
//! Duplicate emissions for one initiator carry `COPY_FLAG` and are never
//! relayed further, bounding path growth to one continuation per
//! initiator per round.

use hashbrown::{HashMap, HashSet};

use crate::params::CuckooParams;

/// Width of the chained-list key.
pub const LIST_BITS: u32 = 12;

/// Growth cap: relayed paths per survivor before the relay gives up.
const PATHS_PER_EDGE: usize = 64;

/// Tag-field copy bit for a parameter set (top bit of the tag field).
#[inline]
fn copy_flag<P: CuckooParams>() -> u32 {
    1 << (31 - P::Z_BITS)
}

/// Pack a tagged edge; returns the word and its storage bucket.
#[inline]
pub(crate) fn pack_tagged<P: CuckooParams>(tag: u32, frontier: u32, anchor: u32) -> (u64, u32) {
    let bucket = frontier >> P::Z_BITS;
    let hi = (tag << P::Z_BITS) | (frontier & P::Z_MASK);
    (((hi as u64) << 32) | anchor as u64, bucket)
}

/// Unpack `(tag, frontier, anchor)` from a word and its storage bucket.
#[inline]
pub(crate) fn unpack_tagged<P: CuckooParams>(word: u64, bucket: u32) -> (u32, u32, u32) {
    let hi = (word >> 32) as u32;
    let tag = hi >> P::Z_BITS;
    let frontier = (bucket << P::Z_BITS) | (hi & P::Z_MASK);
    let anchor = word as u32;
    (tag, frontier, anchor)
}

/// How a relayed edge was formed; indices into the base edge list or the
/// source table itself.
enum Source {
    /// First relay: two plain edges joined at a sibling junction.
    Pair(u32, u32),
    /// Later relay: a prior path extended by one plain edge.
    Extend(u32, u32),
}

/// One relayed path edge.
struct Tagged {
    word: u64,
    bucket: u32,
    /// Index into the source table.
    source: u32,
    /// Number of base edges covered.
    len: u32,
}

impl Tagged {
    #[inline]
    fn frontier<P: CuckooParams>(&self) -> u32 {
        unpack_tagged::<P>(self.word, self.bucket).1
    }

    #[inline]
    fn anchor(&self) -> u32 {
        self.word as u32
    }

    #[inline]
    fn is_copy<P: CuckooParams>(&self) -> bool {
        unpack_tagged::<P>(self.word, self.bucket).0 & copy_flag::<P>() != 0
    }
}

/// Result of a relay run.
#[derive(Debug, Default)]
pub struct RelayOutcome {
    /// Candidate cycles as sets of base-edge indices, each exactly L long.
    pub cycles: Vec<Vec<u32>>,
    /// Tagged edges built across all rounds.
    pub paths_built: u64,
    /// Emissions that carried the copy flag.
    pub copies: u64,
}

/// Run `rounds` relay rounds over the survivor list `base` (entries are
/// `(side-0 hash, side-1 hash)` pairs), collapsing first on `start_side`,
/// then detect and expand two-path closures into candidate cycles.
pub fn relay_find_cycles<P: CuckooParams>(
    base: &[(u32, u32)],
    start_side: u32,
    rounds: u32,
) -> RelayOutcome {
    let mut outcome = RelayOutcome::default();
    if base.is_empty() || rounds == 0 {
        return outcome;
    }
    let cap = base.len() * PATHS_PER_EDGE + 1024;

    let mut sources: Vec<Source> = Vec::new();
    let mut all: Vec<Tagged> = Vec::new();
    // Indices (into `all`) of the generation grown in the previous round.
    let mut current: Vec<u32> = Vec::new();
    let mut side = start_side;

    for round in 1..=rounds {
        let next = if round == 1 {
            pair_round::<P>(base, side, &mut sources, &mut all, &mut outcome, cap)
        } else {
            extend_round::<P>(base, side, &current, &mut sources, &mut all, &mut outcome, cap)
        };
        tracing::debug!(
            "relay round {}: {} paths of length {}",
            round,
            next.len(),
            round + 1
        );
        if next.is_empty() {
            break;
        }
        current = next;
        side ^= 1;
    }

    outcome.paths_built = all.len() as u64;
    detect_closures::<P>(base, start_side, &sources, &all, &mut outcome);
    outcome
}

/// Group base-edge indices by the collapse-side bucket and build the
/// per-bucket chained sibling lists: `heads[list]` points at the most
/// recently inserted member, `nexts` chains the rest.
fn chain_buckets<P: CuckooParams>(
    base: &[(u32, u32)],
    side: u32,
) -> (Vec<Vec<u32>>, Vec<Vec<u32>>, Vec<Vec<u32>>) {
    let list_mask = (1u32 << LIST_BITS.min(P::EDGE_BITS)) - 1;
    let mut buckets: Vec<Vec<u32>> = vec![Vec::new(); P::NUM_BUCKETS];
    for (i, &edge) in base.iter().enumerate() {
        let x = side_hash(edge, side);
        buckets[(x >> P::Z_BITS) as usize].push(i as u32);
    }
    let mut heads: Vec<Vec<u32>> = Vec::with_capacity(P::NUM_BUCKETS);
    let mut nexts: Vec<Vec<u32>> = Vec::with_capacity(P::NUM_BUCKETS);
    for members in &buckets {
        if members.is_empty() {
            heads.push(Vec::new());
            nexts.push(Vec::new());
            continue;
        }
        let mut head = vec![u32::MAX; (list_mask + 1) as usize];
        let mut next = vec![u32::MAX; members.len()];
        for (slot, &i) in members.iter().enumerate() {
            let list = (side_hash(base[i as usize], side) & list_mask) as usize;
            next[slot] = head[list];
            head[list] = slot as u32;
        }
        heads.push(head);
        nexts.push(next);
    }
    (buckets, heads, nexts)
}

#[inline]
fn side_hash(edge: (u32, u32), side: u32) -> u32 {
    if side == 0 {
        edge.0
    } else {
        edge.1
    }
}

/// First relay round: pair plain survivors across sibling junctions.
fn pair_round<P: CuckooParams>(
    base: &[(u32, u32)],
    side: u32,
    sources: &mut Vec<Source>,
    all: &mut Vec<Tagged>,
    outcome: &mut RelayOutcome,
    cap: usize,
) -> Vec<u32> {
    let list_mask = (1u32 << LIST_BITS.min(P::EDGE_BITS)) - 1;
    let (buckets, heads, nexts) = chain_buckets::<P>(base, side);
    let mut created = Vec::new();

    for (bucket, members) in buckets.iter().enumerate() {
        for &i in members.iter().rev() {
            let edge = base[i as usize];
            let x = side_hash(edge, side);
            let sib_list = ((x & list_mask) ^ 1) as usize;
            let mut first = true;
            let mut slot = heads[bucket][sib_list];
            while slot != u32::MAX {
                let j = buckets[bucket][slot as usize];
                slot = nexts[bucket][slot as usize];
                let partner = base[j as usize];
                if side_hash(partner, side) != x ^ 1 {
                    continue;
                }
                if all.len() >= cap {
                    tracing::warn!("relay path cap reached; stopping path growth");
                    return created;
                }
                let frontier = side_hash(edge, 1 - side);
                let anchor = side_hash(partner, 1 - side);
                // First relay: tag derived from the partner's far endpoint.
                let mut tag = (anchor >> P::Z_BITS) & (copy_flag::<P>() - 1);
                if !first {
                    tag |= copy_flag::<P>();
                    outcome.copies += 1;
                }
                first = false;
                let (word, dst) = pack_tagged::<P>(tag, frontier, anchor);
                sources.push(Source::Pair(i, j));
                created.push(all.len() as u32);
                all.push(Tagged {
                    word,
                    bucket: dst,
                    source: (sources.len() - 1) as u32,
                    len: 2,
                });
            }
        }
    }
    created
}

/// Later relay rounds: grow each non-copy path by one edge at its
/// frontier.
fn extend_round<P: CuckooParams>(
    base: &[(u32, u32)],
    side: u32,
    current: &[u32],
    sources: &mut Vec<Source>,
    all: &mut Vec<Tagged>,
    outcome: &mut RelayOutcome,
    cap: usize,
) -> Vec<u32> {
    let list_mask = (1u32 << LIST_BITS.min(P::EDGE_BITS)) - 1;
    let (buckets, heads, nexts) = chain_buckets::<P>(base, side);
    let mut created = Vec::new();
    let mut pending: Vec<Tagged> = Vec::new();

    for &path_idx in current.iter().rev() {
        let path = &all[path_idx as usize];
        if path.is_copy::<P>() {
            continue;
        }
        let frontier = path.frontier::<P>();
        let bucket = (frontier >> P::Z_BITS) as usize;
        if heads[bucket].is_empty() {
            continue;
        }
        let sib_list = ((frontier & list_mask) ^ 1) as usize;
        let mut first = true;
        let mut slot = heads[bucket][sib_list];
        while slot != u32::MAX {
            let j = buckets[bucket][slot as usize];
            slot = nexts[bucket][slot as usize];
            let partner = base[j as usize];
            if side_hash(partner, side) != frontier ^ 1 {
                continue;
            }
            if all.len() + pending.len() >= cap {
                tracing::warn!("relay path cap reached; stopping path growth");
                break;
            }
            let new_frontier = side_hash(partner, 1 - side);
            let (tag_prior, _, _) = unpack_tagged::<P>(path.word, path.bucket);
            let mut tag = tag_prior & (copy_flag::<P>() - 1);
            if !first {
                tag |= copy_flag::<P>();
                outcome.copies += 1;
            }
            first = false;
            let (word, dst) = pack_tagged::<P>(tag, new_frontier, path.anchor());
            sources.push(Source::Extend(path.source, j));
            pending.push(Tagged {
                word,
                bucket: dst,
                source: (sources.len() - 1) as u32,
                len: path.len + 1,
            });
        }
    }

    for tagged in pending {
        created.push(all.len() as u32);
        all.push(tagged);
    }
    created
}

/// End signature of a path candidate for closure matching:
/// `(anchor side, anchor, frontier side, frontier)`.
type EndKey = (u32, u32, u32, u32);

/// Find pairs of candidates whose ends are mutual siblings and whose
/// lengths sum to L, then expand their provenance into base-edge sets.
fn detect_closures<P: CuckooParams>(
    base: &[(u32, u32)],
    start_side: u32,
    sources: &[Source],
    all: &[Tagged],
    outcome: &mut RelayOutcome,
) {
    let anchor_side = (start_side + 1) & 1;
    // Candidates: every tagged path, plus plain edges as length-1 paths.
    let mut index: HashMap<EndKey, Vec<usize>> = HashMap::new();
    let mut cands: Vec<(EndKey, u32, Option<u32>)> = Vec::new();

    for (i, &(h0, h1)) in base.iter().enumerate() {
        let key = (0, h0, 1, h1);
        index.entry(key).or_default().push(cands.len());
        cands.push((key, 1, Some(i as u32)));
    }
    for tagged in all {
        let f_side = (start_side + tagged.len - 1) & 1;
        let key = (
            anchor_side,
            tagged.anchor(),
            f_side,
            tagged.frontier::<P>(),
        );
        index.entry(key).or_default().push(cands.len());
        cands.push((key, tagged.len, Some(tagged.source | PATH_BIT)));
    }

    let want = P::PROOF_SIZE as u32;
    let mut seen: HashSet<Vec<u32>> = HashSet::new();
    for &((a_side, a, f_side, f), len, source) in cands.iter() {
        if len >= want {
            // A full-length path whose own ends meet closes by itself.
            if len == want && a_side == f_side && a == f ^ 1 {
                let mut edges = Vec::new();
                expand(sources, source, &mut edges);
                edges.sort_unstable();
                edges.dedup();
                if edges.len() == P::PROOF_SIZE && seen.insert(edges.clone()) {
                    outcome.cycles.push(edges);
                }
            }
            continue;
        }
        let need = want - len;
        for target in [
            (a_side, a ^ 1, f_side, f ^ 1),
            (f_side, f ^ 1, a_side, a ^ 1),
        ] {
            let Some(matches) = index.get(&target) else {
                continue;
            };
            for &m in matches {
                let (_, mlen, msource) = cands[m];
                if mlen != need {
                    continue;
                }
                let mut edges = Vec::new();
                expand(sources, source, &mut edges);
                expand(sources, msource, &mut edges);
                edges.sort_unstable();
                edges.dedup();
                if edges.len() == P::PROOF_SIZE && seen.insert(edges.clone()) {
                    outcome.cycles.push(edges);
                }
            }
        }
    }
}

/// Marker distinguishing source-table references from base-edge indices
/// in a candidate.
const PATH_BIT: u32 = 1 << 31;

/// Push every base-edge index a candidate covers.
fn expand(sources: &[Source], source: Option<u32>, out: &mut Vec<u32>) {
    let Some(code) = source else {
        return;
    };
    if code & PATH_BIT == 0 {
        out.push(code);
        return;
    }
    let mut stack = vec![code & !PATH_BIT];
    while let Some(idx) = stack.pop() {
        match sources[idx as usize] {
            Source::Pair(a, b) => {
                out.push(a);
                out.push(b);
            }
            Source::Extend(prev, edge) => {
                out.push(edge);
                stack.push(prev);
            }
        }
    }
}
