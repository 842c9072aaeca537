// src/solver.rs - Solver context, range driver, and proof verification
// Tree location: ./src/solver.rs

//! Solver lifecycle: context allocation, the per-nonce
//! trim → find → recover loop, proof verification, and the advisory
//! cyclehash.
//!
//! A [`SolverCtx`] owns the trimming arenas and is reused across the
//! whole nonce range; per-nonce failures (tail overflow, recovery
//! misses, rejected candidates) are logged and counted but never abort
//! the range. Cancellation is cooperative: [`SolverCtx::stop_handle`]
//! flips a flag the trimmer polls at phase boundaries, and the observed
//! cancellation clears the flag so the context stays reusable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use blake2_rfc::blake2b::blake2b;
use thiserror::Error;

use crate::config::SolverSettings;
use crate::graph::CycleFinder;
use crate::params::CuckooParams;
use crate::recover::recover;
use crate::siphash::SipKeys;
use crate::trimmer::{relay, TrimOutcome, TrimStats, Trimmer};
use crate::Cyclone29Error;

/// An L-cycle proof: the generating nonces, sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    /// Edge nonces forming the cycle.
    pub nonces: Vec<u32>,
}

impl Proof {
    /// Blake2b-256 over the little-endian proof bytes, hex encoded.
    /// Advisory fingerprint only; it plays no part in verification.
    pub fn cyclehash(&self) -> String {
        let mut bytes = Vec::with_capacity(self.nonces.len() * 4);
        for &nonce in &self.nonces {
            bytes.extend_from_slice(&nonce.to_le_bytes());
        }
        hex::encode(blake2b(32, &[], &bytes).as_bytes())
    }
}

/// One verified solution of the range driver.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Header nonce the graph was keyed with.
    pub nonce: u64,
    /// The verified cycle proof.
    pub proof: Proof,
}

/// Reasons a proof fails verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Proof length differs from L.
    #[error("proof has {got} nonces, expected {want}")]
    WrongLength {
        /// Nonces present.
        got: usize,
        /// Nonces required.
        want: usize,
    },
    /// A nonce is outside the edge range.
    #[error("nonce exceeds edge range")]
    NonceTooBig,
    /// Nonces are not strictly ascending.
    #[error("nonces not strictly ascending")]
    NotAscending,
    /// Endpoint sibling pairing cannot exist for these edges.
    #[error("endpoints do not balance")]
    Unbalanced,
    /// A node on the walk has more than two cycle edges.
    #[error("branch in cycle")]
    Branch,
    /// A node on the walk has no continuing edge.
    #[error("dead end in cycle")]
    DeadEnd,
    /// The walk closed before covering all L edges.
    #[error("cycle closes after {len} edges")]
    ShortCycle {
        /// Edges the premature loop covered.
        len: usize,
    },
}

/// Check that `proof` is a single L-cycle under `keys`.
///
/// Endpoints are re-derived from the oracle; consecutive cycle edges
/// must meet at sibling hashes, alternating sides, and the walk from the
/// first edge must close exactly after L edges.
pub fn verify<P: CuckooParams>(proof: &Proof, keys: &SipKeys) -> Result<(), VerifyError> {
    let l = P::PROOF_SIZE;
    if proof.nonces.len() != l {
        return Err(VerifyError::WrongLength {
            got: proof.nonces.len(),
            want: l,
        });
    }

    let mut uvs = vec![0u32; 2 * l];
    let (mut xor0, mut xor1) = (0u32, 0u32);
    for (i, &nonce) in proof.nonces.iter().enumerate() {
        if nonce as u64 >= P::NUM_EDGES {
            return Err(VerifyError::NonceTooBig);
        }
        if i > 0 && nonce <= proof.nonces[i - 1] {
            return Err(VerifyError::NotAscending);
        }
        uvs[2 * i] = keys.node_hash::<P>(nonce, 0);
        uvs[2 * i + 1] = keys.node_hash::<P>(nonce, 1);
        xor0 ^= uvs[2 * i];
        xor1 ^= uvs[2 * i + 1];
    }
    // Sibling pairs each xor to 1, and a cycle pairs every endpoint
    // exactly once per side.
    let want = ((l / 2) & 1) as u32;
    if xor0 != want || xor1 != want {
        return Err(VerifyError::Unbalanced);
    }

    let mut edges_walked = 0;
    let mut i = 0;
    loop {
        let mut j = i;
        let mut k = i;
        loop {
            k = (k + 2) % (2 * l);
            if k == i {
                break;
            }
            if uvs[k] == uvs[i] ^ 1 {
                if j != i {
                    return Err(VerifyError::Branch);
                }
                j = k;
            }
        }
        if j == i {
            return Err(VerifyError::DeadEnd);
        }
        i = j ^ 1;
        edges_walked += 1;
        if i == 0 {
            break;
        }
    }
    if edges_walked == l {
        Ok(())
    } else {
        Err(VerifyError::ShortCycle { len: edges_walked })
    }
}

/// Accumulated counters for one `run_solver` call.
#[derive(Debug, Clone, Default)]
pub struct SolveStats {
    /// Backend index from the settings.
    pub device: u32,
    /// An error was recorded during the range.
    pub has_errored: bool,
    /// Most recent error message, if any.
    pub last_error: Option<String>,
    /// Header nonces attempted.
    pub nonces_attempted: u64,
    /// Solves abandoned because survivors exceeded the export budget.
    pub abandoned: u64,
    /// Candidate cycles produced by the finder or relay closure.
    pub candidates: u64,
    /// Candidates that failed recovery or verification.
    pub rejected: u64,
    /// Verified solutions appended.
    pub solutions: u64,
    /// The range stopped on the cancellation flag.
    pub cancelled: bool,
    /// Trim statistics of the last completed solve.
    pub trim: TrimStats,
}

/// Result of one `run_solver` call.
#[derive(Debug, Default)]
pub struct SolveReport {
    /// Verified solutions, in discovery order.
    pub solutions: Vec<Solution>,
    /// Range counters.
    pub stats: SolveStats,
}

impl SolveReport {
    /// Nonzero-solutions indicator, the classic solver return value.
    pub fn found(&self) -> bool {
        !self.solutions.is_empty()
    }
}

/// Reusable solver context: arenas, schedule, thread pool, stop flag.
pub struct SolverCtx<P: CuckooParams> {
    trimmer: Trimmer<P>,
    settings: SolverSettings,
    pool: Option<rayon::ThreadPool>,
    abort: Arc<AtomicBool>,
    stats: SolveStats,
}

impl<P: CuckooParams> SolverCtx<P> {
    /// Allocate arenas and the worker pool per `settings`.
    pub fn new(settings: SolverSettings) -> Result<Self, Cyclone29Error> {
        if settings.cpuload {
            tracing::info!("cpuload requested; rayon workers park between phases regardless");
        }
        let pool = if settings.threads > 0 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(settings.threads)
                    .build()
                    .map_err(|e| Cyclone29Error::Settings(format!("thread pool: {}", e)))?,
            )
        } else {
            None
        };
        let trimmer = Trimmer::<P>::new(&settings)?;
        let abort = trimmer.abort_handle();
        tracing::info!(
            "{} solver ready: {} trim rounds, relay {}",
            P::name(),
            trimmer.ntrims(),
            if settings.relay_rounds > 0 {
                "on"
            } else {
                "off"
            }
        );
        Ok(SolverCtx {
            trimmer,
            settings,
            pool,
            abort,
            stats: SolveStats::default(),
        })
    }

    /// Shared stop flag; setting it cancels the in-flight solve at the
    /// next phase boundary.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Request cancellation of the in-flight solve.
    pub fn stop(&self) {
        self.abort.store(true, Ordering::Release);
    }

    /// Counters from the most recent `run_solver` call.
    pub fn stats(&self) -> &SolveStats {
        &self.stats
    }

    /// Trim rounds the context will run per solve.
    pub fn ntrims(&self) -> u32 {
        self.trimmer.ntrims()
    }

    /// Install a per-round survivor observer on the trimmer.
    pub fn set_round_observer(&mut self, observer: crate::trimmer::RoundObserver) {
        self.trimmer.set_round_observer(observer);
    }

    /// Solve every header nonce in `[nonce, nonce + range)`, appending
    /// verified L-cycle proofs to the report.
    pub fn run_solver(&mut self, header: &[u8], nonce: u64, range: u64) -> SolveReport {
        let started = Instant::now();
        let mut report = SolveReport::default();
        self.stats = SolveStats {
            device: self.settings.device,
            ..SolveStats::default()
        };

        for n in nonce..nonce.saturating_add(range) {
            if self.abort.load(Ordering::Acquire) {
                self.observe_cancellation();
                break;
            }
            self.stats.nonces_attempted += 1;

            let keys = match SipKeys::from_header(header, n, self.settings.mutate_nonce) {
                Ok(keys) => keys,
                Err(e) => {
                    tracing::warn!("nonce {}: {}", n, e);
                    self.stats.has_errored = true;
                    self.stats.last_error = Some(e.to_string());
                    continue;
                }
            };

            match self.solve_one(&keys, n, &mut report) {
                SolveStep::Done => {}
                SolveStep::Cancelled => {
                    self.observe_cancellation();
                    break;
                }
            }
        }

        self.stats.solutions = report.solutions.len() as u64;
        tracing::info!(
            "range [{}, {}): {} solutions, {} candidates, {} rejected in {}ms",
            nonce,
            nonce.saturating_add(range),
            self.stats.solutions,
            self.stats.candidates,
            self.stats.rejected,
            started.elapsed().as_millis()
        );
        report.stats = self.stats.clone();
        report
    }

    fn observe_cancellation(&mut self) {
        self.abort.store(false, Ordering::Release);
        self.stats.cancelled = true;
        tracing::info!("solver stopped on request; context remains reusable");
    }

    fn solve_one(&mut self, keys: &SipKeys, nonce: u64, report: &mut SolveReport) -> SolveStep {
        let relay_rounds = self.settings.relay_rounds;
        let capped = relay_rounds == 0;

        let Self { trimmer, pool, .. } = self;
        let outcome = match pool {
            Some(pool) => pool.install(|| trimmer.trim(keys, capped)),
            None => trimmer.trim(keys, capped),
        };
        self.stats.trim = self.trimmer.stats().clone();

        let tail = match outcome {
            TrimOutcome::Cancelled => return SolveStep::Cancelled,
            TrimOutcome::Trimmed(tail) => tail,
        };
        if tail.overflowed {
            tracing::warn!(
                "nonce {}: survivors exceeded export budget, solve abandoned",
                nonce
            );
            self.stats.abandoned += 1;
            return SolveStep::Done;
        }

        let candidates: Vec<Vec<u32>> = if relay_rounds > 0 {
            let outcome = relay::relay_find_cycles::<P>(
                &tail.edges,
                self.trimmer.relay_side(),
                relay_rounds,
            );
            tracing::debug!(
                "relay built {} paths ({} copies), {} closures",
                outcome.paths_built,
                outcome.copies,
                outcome.cycles.len()
            );
            outcome.cycles
        } else {
            let (sols, _fstats) = CycleFinder::<P>::new().find_cycles(&tail.edges);
            sols
        };

        for indices in candidates {
            self.stats.candidates += 1;
            let pairs: Vec<(u32, u32)> = indices
                .iter()
                .map(|&i| tail.edges[i as usize])
                .collect();
            let Some(nonces) = recover::<P>(keys, &pairs, self.settings.recover_chunks) else {
                self.stats.rejected += 1;
                continue;
            };
            let proof = Proof { nonces };
            match verify::<P>(&proof, keys) {
                Ok(()) => {
                    tracing::info!(
                        "nonce {}: verified {}-cycle, cyclehash {}",
                        nonce,
                        P::PROOF_SIZE,
                        proof.cyclehash()
                    );
                    report.solutions.push(Solution { nonce, proof });
                }
                Err(e) => {
                    tracing::debug!("nonce {}: candidate rejected: {}", nonce, e);
                    self.stats.rejected += 1;
                }
            }
        }
        SolveStep::Done
    }
}

enum SolveStep {
    Done,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Cyclone8;

    type P = Cyclone8;

    fn keys() -> SipKeys {
        SipKeys::from_header(&[0u8; 80], 0, false).unwrap()
    }

    #[test]
    fn test_verify_rejects_wrong_length() {
        let proof = Proof {
            nonces: vec![1, 2, 3],
        };
        assert_eq!(
            verify::<P>(&proof, &keys()),
            Err(VerifyError::WrongLength { got: 3, want: 4 })
        );
    }

    #[test]
    fn test_verify_rejects_unsorted_and_oversized() {
        let proof = Proof {
            nonces: vec![5, 4, 6, 7],
        };
        assert_eq!(verify::<P>(&proof, &keys()), Err(VerifyError::NotAscending));

        let proof = Proof {
            nonces: vec![1, 2, 3, 1 << 9],
        };
        assert_eq!(verify::<P>(&proof, &keys()), Err(VerifyError::NonceTooBig));
    }

    #[test]
    fn test_verify_rejects_random_nonces() {
        // Four arbitrary ascending nonces essentially never form a cycle.
        let proof = Proof {
            nonces: vec![11, 37, 180, 201],
        };
        assert!(verify::<P>(&proof, &keys()).is_err());
    }

    #[test]
    fn test_cyclehash_is_stable_and_tamper_evident() {
        let a = Proof {
            nonces: vec![1, 2, 3, 4],
        };
        let b = Proof {
            nonces: vec![1, 2, 3, 5],
        };
        assert_eq!(a.cyclehash(), a.cyclehash());
        assert_ne!(a.cyclehash(), b.cyclehash());
        assert_eq!(a.cyclehash().len(), 64);
    }

    #[test]
    fn test_stop_before_run_yields_no_solutions_and_reusable_ctx() {
        let mut ctx = SolverCtx::<P>::new(SolverSettings {
            ntrims: 8,
            neps_a: 1024,
            neps_b: 1024,
            ..SolverSettings::default()
        })
        .unwrap();

        ctx.stop();
        let report = ctx.run_solver(&[0u8; 80], 0, 4);
        assert!(!report.found());
        assert!(report.stats.cancelled);
        assert_eq!(report.stats.nonces_attempted, 0);

        // The observed cancellation cleared the flag: the next call runs.
        let report = ctx.run_solver(&[0u8; 80], 0, 2);
        assert!(!report.stats.cancelled);
        assert_eq!(report.stats.nonces_attempted, 2);
    }
}
