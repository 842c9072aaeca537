// src/trimmer/arena.rs - Bucketed edge arenas with saturating counters
// Tree location: ./src/trimmer/arena.rs

//! Bucketed edge storage for the trimming pipeline
//!
//! An [`Arena`] is one large slab of 64-bit entry slots split into
//! fixed-capacity buckets, plus one atomic counter per bucket. Workers
//! reserve slot ranges with a saturating compare-exchange loop, so a
//! counter can never pass its bucket capacity and an entry can never land
//! outside its bucket; reservations that do not fit are counted as drops.
//!
//! Entry payloads are round-dependent: nonce-carrying rounds use the low
//! 32 bits, pair-carrying rounds pack both endpoint hashes. The arena
//! itself is payload-agnostic.
//!
//! [`BucketWriter`] is the write-coalescing scratch: a worker stages up to
//! [`FLUSH`] entries per destination bucket and reserves the whole batch in
//! one counter operation.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Entries staged per bucket before a batched reservation.
pub const FLUSH: usize = 16;

/// One edge arena: `buckets × cap` atomic entry slots.
pub struct Arena {
    data: Vec<AtomicU64>,
    counts: Vec<AtomicU32>,
    buckets: usize,
    cap: usize,
    dropped: AtomicU64,
}

impl Arena {
    /// Allocate an arena with `buckets` buckets of `cap` entries each.
    pub fn new(buckets: usize, cap: usize) -> Self {
        let data = (0..buckets * cap).map(|_| AtomicU64::new(0)).collect();
        let counts = (0..buckets).map(|_| AtomicU32::new(0)).collect();
        Arena {
            data,
            counts,
            buckets,
            cap,
            dropped: AtomicU64::new(0),
        }
    }

    /// Entries per bucket.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Bucket count.
    pub fn buckets(&self) -> usize {
        self.buckets
    }

    /// Reset all bucket counters and the drop count. Slot contents are
    /// left as-is; they are unreachable until re-reserved.
    pub fn clear(&self) {
        for c in &self.counts {
            c.store(0, Ordering::Relaxed);
        }
        self.dropped.store(0, Ordering::Relaxed);
    }

    /// Current entry count of one bucket.
    pub fn len(&self, bucket: usize) -> usize {
        self.counts[bucket].load(Ordering::Acquire) as usize
    }

    /// Total entries across all buckets.
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .map(|c| c.load(Ordering::Acquire) as u64)
            .sum()
    }

    /// Entries dropped because their bucket was at capacity.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Reserve up to `want` slots in `bucket`, saturating at capacity.
    ///
    /// Returns `(start, got)`; `got < want` means `want - got` entries did
    /// not fit and were accounted as dropped.
    pub fn reserve(&self, bucket: usize, want: u32) -> (u32, u32) {
        let counter = &self.counts[bucket];
        let cap = self.cap as u32;
        let mut cur = counter.load(Ordering::Relaxed);
        loop {
            let avail = cap.saturating_sub(cur);
            let got = want.min(avail);
            if got == 0 {
                self.dropped.fetch_add(want as u64, Ordering::Relaxed);
                return (cur, 0);
            }
            match counter.compare_exchange_weak(
                cur,
                cur + got,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    if got < want {
                        self.dropped
                            .fetch_add((want - got) as u64, Ordering::Relaxed);
                    }
                    return (cur, got);
                }
                Err(seen) => cur = seen,
            }
        }
    }

    /// Store an entry in a previously reserved slot.
    #[inline]
    pub fn write(&self, bucket: usize, slot: u32, value: u64) {
        debug_assert!((slot as usize) < self.cap);
        self.data[bucket * self.cap + slot as usize].store(value, Ordering::Release);
    }

    /// Load one entry of a bucket.
    #[inline]
    pub fn read(&self, bucket: usize, slot: u32) -> u64 {
        self.data[bucket * self.cap + slot as usize].load(Ordering::Acquire)
    }

    /// Copy a bucket's live entries into `out` (cleared first).
    pub fn load_bucket(&self, bucket: usize, out: &mut Vec<u64>) {
        out.clear();
        let len = self.len(bucket);
        let base = bucket * self.cap;
        out.extend(
            self.data[base..base + len]
                .iter()
                .map(|slot| slot.load(Ordering::Acquire)),
        );
    }
}

/// Per-worker write-coalescing scratch over one destination arena.
pub struct BucketWriter<'a> {
    arena: &'a Arena,
    stage: Vec<u64>,
    lens: Vec<u8>,
}

impl<'a> BucketWriter<'a> {
    /// Create a writer with empty staging for every bucket.
    pub fn new(arena: &'a Arena) -> Self {
        BucketWriter {
            stage: vec![0u64; arena.buckets() * FLUSH],
            lens: vec![0u8; arena.buckets()],
            arena,
        }
    }

    /// Stage one entry for `bucket`, flushing the staged batch when full.
    #[inline]
    pub fn push(&mut self, bucket: usize, value: u64) {
        let len = self.lens[bucket] as usize;
        self.stage[bucket * FLUSH + len] = value;
        self.lens[bucket] = (len + 1) as u8;
        if len + 1 == FLUSH {
            self.flush(bucket);
        }
    }

    fn flush(&mut self, bucket: usize) {
        let len = self.lens[bucket] as usize;
        if len == 0 {
            return;
        }
        let (start, got) = self.arena.reserve(bucket, len as u32);
        for (i, &value) in self.stage[bucket * FLUSH..bucket * FLUSH + got as usize]
            .iter()
            .enumerate()
        {
            self.arena.write(bucket, start + i as u32, value);
        }
        self.lens[bucket] = 0;
    }

    /// Flush every bucket with staged entries. Must be called before the
    /// writer is dropped or staged entries are lost.
    pub fn drain(&mut self) {
        for bucket in 0..self.lens.len() {
            self.flush(bucket);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_and_rw() {
        let arena = Arena::new(4, 8);
        let (start, got) = arena.reserve(2, 3);
        assert_eq!((start, got), (0, 3));
        arena.write(2, start, 7);
        arena.write(2, start + 1, 8);
        arena.write(2, start + 2, 9);
        assert_eq!(arena.len(2), 3);
        assert_eq!(arena.read(2, 1), 8);
        assert_eq!(arena.len(0), 0);
    }

    #[test]
    fn test_reserve_saturates_at_capacity() {
        let arena = Arena::new(2, 4);
        let (_, got) = arena.reserve(0, 3);
        assert_eq!(got, 3);
        // Only one slot left; the rest of the batch is dropped.
        let (start, got) = arena.reserve(0, 3);
        assert_eq!((start, got), (3, 1));
        assert_eq!(arena.len(0), 4);
        assert_eq!(arena.dropped(), 2);
        // Fully saturated bucket drops everything and stays in range.
        let (_, got) = arena.reserve(0, 5);
        assert_eq!(got, 0);
        assert_eq!(arena.len(0), 4);
        assert_eq!(arena.dropped(), 7);
    }

    #[test]
    fn test_clear_resets_counts() {
        let arena = Arena::new(2, 4);
        arena.reserve(1, 4);
        arena.reserve(1, 2);
        assert_eq!(arena.dropped(), 2);
        arena.clear();
        assert_eq!(arena.len(1), 0);
        assert_eq!(arena.total(), 0);
        assert_eq!(arena.dropped(), 0);
    }

    #[test]
    fn test_writer_stages_and_drains() {
        let arena = Arena::new(2, 64);
        let mut writer = BucketWriter::new(&arena);
        for v in 0..FLUSH as u64 {
            writer.push(0, v);
        }
        // A full batch flushes on its own.
        assert_eq!(arena.len(0), FLUSH);
        writer.push(1, 99);
        assert_eq!(arena.len(1), 0);
        writer.drain();
        assert_eq!(arena.len(1), 1);
        assert_eq!(arena.read(1, 0), 99);
    }

    #[test]
    fn test_parallel_reserve_never_overflows() {
        use std::sync::Arc;
        let arena = Arc::new(Arena::new(1, 100));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let arena = Arc::clone(&arena);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    arena.reserve(0, 1);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(arena.len(0), 100);
        assert_eq!(arena.dropped(), 100);
    }
}
