// src/trimmer/mod.rs - Trimming pipeline orchestration
// Tree location: ./src/trimmer/mod.rs

//! Bucketed edge-trimming engine
//!
//! Reduces the `2^N` candidate edges of one (header, nonce) graph down to
//! the small survivor set the cycle finder can chew on. The pipeline is
//! seed → trim rounds → tail: the seeder scatters nonces into arena A,
//! each round leaf-prunes one endpoint side and ping-pongs survivors into
//! the other arena, and the tail exports the final pairs to the host
//! list. The optional tag relay runs on the survivor set afterwards.
//!
//! Execution is one rayon task per bucket with implicit joins at round
//! boundaries; the only cross-task state is the atomic bucket counters.
//! A cooperative abort flag is polled between phases.
//!
//! # Version History
//! - 0.1.0: Initial seed/round/tail pipeline
//! - 0.2.0: Saturating bucket reservations and drop accounting
//! - 0.3.0: Round observer hook and relay integration

pub mod arena;
pub mod reference;
pub mod relay;
pub mod round;
pub mod seed;
pub mod tail;

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use self::arena::Arena;
use self::tail::TailEdges;

use crate::config::SolverSettings;
use crate::params::{match_parity, CuckooParams};
use crate::siphash::SipKeys;
use crate::Cyclone29Error;

/// Per-solve trimming statistics.
#[derive(Debug, Clone, Default)]
pub struct TrimStats {
    /// Seeding time in milliseconds.
    pub seed_ms: u64,
    /// Total round time in milliseconds.
    pub rounds_ms: u64,
    /// Tail collection time in milliseconds.
    pub tail_ms: u64,
    /// Edges surviving the full schedule.
    pub edges_remaining: usize,
    /// Rounds actually executed.
    pub rounds_executed: u32,
    /// Entries dropped to saturated buckets across the whole solve.
    pub dropped_edges: u64,
}

/// Result of one trim run.
pub enum TrimOutcome {
    /// The full schedule ran; survivors attached.
    Trimmed(TailEdges),
    /// The abort flag was observed at a phase boundary.
    Cancelled,
}

/// Observer invoked after every round with `(round, surviving edges)`.
pub type RoundObserver = Box<dyn Fn(u32, u64) + Send + Sync>;

/// The trimming engine: two arenas and a round schedule, reused across
/// solves.
pub struct Trimmer<P: CuckooParams> {
    arena_a: Arena,
    arena_b: Arena,
    ntrims: u32,
    seed_chunks: usize,
    abort: Arc<AtomicBool>,
    observer: Option<RoundObserver>,
    stats: TrimStats,
    _params: PhantomData<P>,
}

impl<P: CuckooParams> Trimmer<P> {
    /// Allocate both arenas per the settings' slack factors and validate
    /// the round schedule.
    pub fn new(settings: &SolverSettings) -> Result<Self, Cyclone29Error> {
        let cap_a = P::NUM_Z * settings.neps_a / 128;
        let cap_b = P::NUM_Z * settings.neps_b / 128;
        if cap_a == 0 || cap_b == 0 {
            return Err(Cyclone29Error::Settings(format!(
                "bucket slack too low: neps_a={} neps_b={} leave empty buckets",
                settings.neps_a, settings.neps_b
            )));
        }

        let requested = if settings.ntrims == 0 {
            P::default_ntrims()
        } else {
            settings.ntrims
        };
        let ntrims = match_parity(requested, P::PROOF_SIZE);
        if ntrims != requested {
            tracing::debug!(
                "adjusted ntrims {} -> {} to match cycle-length parity",
                requested,
                ntrims
            );
        }

        let total_mb = ((cap_a + cap_b) * P::NUM_BUCKETS * 8) as f64 / (1024.0 * 1024.0);
        tracing::info!(
            "trimmer arenas: {} buckets x ({} + {}) entries, {:.1}MB",
            P::NUM_BUCKETS,
            cap_a,
            cap_b,
            total_mb
        );

        Ok(Trimmer {
            arena_a: Arena::new(P::NUM_BUCKETS, cap_a),
            arena_b: Arena::new(P::NUM_BUCKETS, cap_b),
            ntrims,
            seed_chunks: settings.seed_chunks,
            abort: Arc::new(AtomicBool::new(false)),
            observer: None,
            stats: TrimStats::default(),
            _params: PhantomData,
        })
    }

    /// Shared handle to the cooperative abort flag.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Install a per-round survivor observer.
    pub fn set_round_observer(&mut self, observer: RoundObserver) {
        self.observer = Some(observer);
    }

    /// Rounds this trimmer will run per solve.
    pub fn ntrims(&self) -> u32 {
        self.ntrims
    }

    /// Statistics of the most recent run.
    pub fn stats(&self) -> &TrimStats {
        &self.stats
    }

    /// Endpoint side a relay stage continues the round alternation on.
    pub fn relay_side(&self) -> u32 {
        self.ntrims & 1
    }

    /// Run the full schedule. `capped` bounds the tail at `MAX_EDGES`
    /// (the cycle-finder path); the relay path collects everything.
    pub fn trim(&mut self, keys: &SipKeys, capped: bool) -> TrimOutcome {
        self.stats = TrimStats::default();
        self.arena_a.clear();
        self.arena_b.clear();

        if self.check_abort("seed") {
            return TrimOutcome::Cancelled;
        }

        let start = Instant::now();
        seed::seed::<P>(keys, &self.arena_a, self.seed_chunks);
        self.stats.seed_ms = start.elapsed().as_millis() as u64;
        #[cfg(feature = "profile")]
        tracing::debug!(
            "seeded {} edges in {}ms ({} dropped)",
            self.arena_a.total(),
            self.stats.seed_ms,
            self.arena_a.dropped()
        );

        let rounds_start = Instant::now();
        let mut dropped = self.arena_a.dropped();
        for r in 0..self.ntrims {
            if self.check_abort("round") {
                return TrimOutcome::Cancelled;
            }
            let (src, dst) = if r & 1 == 0 {
                (&self.arena_a, &self.arena_b)
            } else {
                (&self.arena_b, &self.arena_a)
            };
            dst.clear();
            round::trim_round::<P>(keys, r, src, dst);
            dropped += dst.dropped();
            let kept = dst.total();
            if let Some(observer) = &self.observer {
                observer(r, kept);
            }
            #[cfg(feature = "profile")]
            if r % 8 == 0 {
                tracing::debug!("round {}: {} edges kept", r, kept);
            }
            self.stats.rounds_executed = r + 1;
        }
        self.stats.rounds_ms = rounds_start.elapsed().as_millis() as u64;
        self.stats.dropped_edges = dropped;

        if self.check_abort("tail") {
            return TrimOutcome::Cancelled;
        }
        let tail_start = Instant::now();
        let final_arena = if self.ntrims & 1 == 1 {
            &self.arena_b
        } else {
            &self.arena_a
        };
        let tail = tail::tail_collect::<P>(final_arena, capped);
        self.stats.tail_ms = tail_start.elapsed().as_millis() as u64;
        self.stats.edges_remaining = tail.edges.len();

        tracing::debug!(
            "trimmed to {} edges in {} rounds ({}ms seed, {}ms rounds, {}ms tail)",
            tail.edges.len(),
            self.ntrims,
            self.stats.seed_ms,
            self.stats.rounds_ms,
            self.stats.tail_ms
        );
        TrimOutcome::Trimmed(tail)
    }

    fn check_abort(&self, phase: &str) -> bool {
        if self.abort.load(Ordering::Acquire) {
            tracing::info!("trim aborted at {} boundary", phase);
            return true;
        }
        false
    }
}

/// Arena memory footprint for a parameter set and slack pair, in bytes.
pub fn memory_estimate<P: CuckooParams>(neps_a: usize, neps_b: usize) -> u64 {
    let cap_a = P::NUM_Z * neps_a / 128;
    let cap_b = P::NUM_Z * neps_b / 128;
    ((cap_a + cap_b) * P::NUM_BUCKETS * 8) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Cyclone8;
    use std::sync::atomic::AtomicU64;
    use std::sync::Mutex;

    type P = Cyclone8;

    fn toy_settings() -> SolverSettings {
        // Plenty of slack so bucket overflow cannot perturb set equality.
        SolverSettings {
            ntrims: 8,
            neps_a: 1024,
            neps_b: 1024,
            ..SolverSettings::default()
        }
    }

    // Uncapped tail: these tests compare full survivor sets; the export
    // budget is exercised by the tail and solver tests.
    fn trim_edges(trimmer: &mut Trimmer<P>, keys: &SipKeys) -> Vec<(u32, u32)> {
        match trimmer.trim(keys, false) {
            TrimOutcome::Trimmed(tail) => tail.edges,
            TrimOutcome::Cancelled => panic!("unexpected cancellation"),
        }
    }

    #[test]
    fn test_matches_sequential_reference() {
        let keys = SipKeys::from_header(&[0u8; 80], 0, false).unwrap();
        let mut trimmer = Trimmer::<P>::new(&toy_settings()).unwrap();
        let edges = trim_edges(&mut trimmer, &keys);
        let expected = reference::reference_trim::<P>(&keys, trimmer.ntrims());
        assert_eq!(edges, expected);
    }

    #[test]
    fn test_survivors_decrease_monotonically() {
        let keys = SipKeys::from_header(&[9u8; 80], 1, true).unwrap();
        let counts = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&counts);
        let mut trimmer = Trimmer::<P>::new(&toy_settings()).unwrap();
        trimmer.set_round_observer(Box::new(move |round, kept| {
            sink.lock().unwrap().push((round, kept));
        }));
        trim_edges(&mut trimmer, &keys);

        let counts = counts.lock().unwrap();
        assert_eq!(counts.len(), trimmer.ntrims() as usize);
        for pair in counts.windows(2) {
            assert!(pair[1].1 <= pair[0].1, "survivors grew: {:?}", pair);
        }
        assert!(counts.last().unwrap().1 <= P::NUM_EDGES);
    }

    #[test]
    fn test_trim_is_deterministic_across_runs() {
        let keys = SipKeys::from_header(&[5u8; 80], 7, true).unwrap();
        let mut trimmer = Trimmer::<P>::new(&toy_settings()).unwrap();
        let first = trim_edges(&mut trimmer, &keys);
        let second = trim_edges(&mut trimmer, &keys);
        assert_eq!(first, second);
    }

    #[test]
    fn test_low_slack_never_overflows_buckets_and_only_loses_edges() {
        let keys = SipKeys::from_header(&[0u8; 80], 0, false).unwrap();
        let mut roomy = Trimmer::<P>::new(&toy_settings()).unwrap();
        let baseline = trim_edges(&mut roomy, &keys);

        let tight = SolverSettings {
            ntrims: 8,
            neps_a: 64,
            neps_b: 64,
            ..SolverSettings::default()
        };
        let mut trimmer = Trimmer::<P>::new(&tight).unwrap();
        let outcome = trimmer.trim(&keys, false);
        let TrimOutcome::Trimmed(tail) = outcome else {
            panic!("unexpected cancellation");
        };
        assert!(tail.edges.len() <= baseline.len());
        // Dropped entries are accounted, and every survivor is also a
        // baseline survivor (drops only ever lose edges).
        for edge in &tail.edges {
            assert!(baseline.contains(edge));
        }
    }

    #[test]
    fn test_rejects_zero_capacity_slack() {
        let starved = SolverSettings {
            neps_a: 1,
            ..SolverSettings::default()
        };
        assert!(Trimmer::<P>::new(&starved).is_err());
    }

    #[test]
    fn test_cancellation_at_phase_boundary() {
        let keys = SipKeys::from_header(&[0u8; 80], 0, false).unwrap();
        let mut trimmer = Trimmer::<P>::new(&toy_settings()).unwrap();
        trimmer.abort_handle().store(true, Ordering::Release);
        assert!(matches!(trimmer.trim(&keys, true), TrimOutcome::Cancelled));

        // Clearing the flag makes the trimmer reusable.
        trimmer.abort_handle().store(false, Ordering::Release);
        let edges = trim_edges(&mut trimmer, &keys);
        let expected = reference::reference_trim::<P>(&keys, trimmer.ntrims());
        assert_eq!(edges, expected);
    }

    #[test]
    fn test_observer_sees_monotone_counts_under_drops() {
        let keys = SipKeys::from_header(&[2u8; 80], 3, true).unwrap();
        let last = Arc::new(AtomicU64::new(u64::MAX));
        let sink = Arc::clone(&last);
        let tight = SolverSettings {
            ntrims: 8,
            neps_a: 96,
            neps_b: 96,
            ..SolverSettings::default()
        };
        let mut trimmer = Trimmer::<P>::new(&tight).unwrap();
        trimmer.set_round_observer(Box::new(move |_, kept| {
            let prev = sink.swap(kept, Ordering::AcqRel);
            assert!(kept <= prev);
        }));
        trimmer.trim(&keys, true);
    }
}
