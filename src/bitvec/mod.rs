// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Concurrent bit vector with atomic test-and-set and O(1) rank queries.
//!
//! Bits are packed into 64-bit words that workers mutate atomically while a
//! level is being filled. Once filling is done and all workers have joined,
//! the owner clears collided slots and builds a popcount sampling (one
//! cumulative count per 512-bit block) that makes [`BitVector::rank`] a
//! sample load plus at most seven word popcounts.
//!
//! Concurrency contract: [`set`](BitVector::set), [`reset`](BitVector::reset),
//! [`get`](BitVector::get), [`get_word`](BitVector::get_word) and
//! [`atomic_test_and_set`](BitVector::atomic_test_and_set) may be called
//! concurrently on any positions. Everything taking `&mut self` requires the
//! usual exclusive access, which the builder guarantees by joining workers
//! before post-processing a level.

use std::io::Read;
use std::io::Write;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::codec::CodecReader;
use crate::codec::CodecWriter;
use crate::error::Error;

/// Rank sampling rate - balance between space and query time.
const BITS_PER_RANK_SAMPLE: u64 = 512;
const WORDS_PER_RANK_SAMPLE: u64 = BITS_PER_RANK_SAMPLE / 64;

/// Packed atomic bit array with sampled ranks.
pub struct BitVector {
    words: Vec<AtomicU64>,
    size: u64,
    ranks: Vec<u64>,
}

impl BitVector {
    /// Creates a zeroed bit vector holding `n` bits.
    pub fn new(n: u64) -> Self {
        let nwords = Self::nwords_for(n);
        let mut words = Vec::with_capacity(nwords);
        words.resize_with(nwords, || AtomicU64::new(0));
        Self {
            words,
            size: n,
            ranks: Vec::new(),
        }
    }

    // One spare word past the last bit; keeps word indexing branch-free and
    // matches the persisted layout.
    fn nwords_for(n: u64) -> usize {
        (1 + n / 64) as usize
    }

    /// Number of addressable bits.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Total footprint in bits, data words plus rank samples.
    pub fn bit_size(&self) -> u64 {
        self.words.len() as u64 * 64 + self.ranks.len() as u64 * 64
    }

    /// Reallocates to `n` zeroed bits, discarding contents and ranks.
    pub fn resize(&mut self, n: u64) {
        let nwords = Self::nwords_for(n);
        self.words.clear();
        self.words.resize_with(nwords, || AtomicU64::new(0));
        self.size = n;
        self.ranks.clear();
    }

    /// Zeroes every word.
    pub fn clear(&mut self) {
        for word in &mut self.words {
            *word.get_mut() = 0;
        }
    }

    /// Returns the bit at `pos` (0 or 1).
    #[inline]
    pub fn get(&self, pos: u64) -> u64 {
        (self.words[(pos >> 6) as usize].load(Ordering::Relaxed) >> (pos & 63)) & 1
    }

    /// Loads the 64-bit word at word index `idx`.
    #[inline]
    pub fn get_word(&self, idx: u64) -> u64 {
        self.words[idx as usize].load(Ordering::Relaxed)
    }

    /// Sets the bit at `pos` to 1.
    #[inline]
    pub fn set(&self, pos: u64) {
        self.words[(pos >> 6) as usize].fetch_or(1u64 << (pos & 63), Ordering::Relaxed);
    }

    /// Sets the bit at `pos` to 0.
    #[inline]
    pub fn reset(&self, pos: u64) {
        self.words[(pos >> 6) as usize].fetch_and(!(1u64 << (pos & 63)), Ordering::Relaxed);
    }

    /// Atomically sets the bit at `pos` and returns its previous value.
    ///
    /// Sequentially consistent: across all workers filling a level, exactly
    /// one caller observes `false` for any given slot. This is the collision
    /// detection primitive.
    #[inline]
    pub fn atomic_test_and_set(&self, pos: u64) -> bool {
        let mask = 1u64 << (pos & 63);
        let old = self.words[(pos >> 6) as usize].fetch_or(mask, Ordering::SeqCst);
        old & mask != 0
    }

    /// Keeps only bits seen exactly once: `word &= !collisions.word` over the
    /// interval, then zeroes `collisions` for reuse.
    ///
    /// `start` and `size` must be multiples of 64.
    pub fn clear_collisions(&mut self, start: u64, size: u64, collisions: &mut BitVector) {
        assert_eq!(start & 63, 0, "start must be a multiple of 64");
        assert_eq!(size & 63, 0, "size must be a multiple of 64");

        let first = (start / 64) as usize;
        for i in 0..(size / 64) as usize {
            *self.words[first + i].get_mut() &= !collisions.get_word(i as u64);
        }
        collisions.clear();
    }

    /// Builds the rank sampling: one cumulative popcount per 512-bit block,
    /// starting from `offset`. Returns `offset` plus the number of set bits,
    /// which the builder threads into the next level so that per-level ranks
    /// are already global minimal indices.
    pub fn build_ranks(&mut self, offset: u64) -> u64 {
        self.ranks.clear();
        self.ranks
            .reserve(2 + (self.size / BITS_PER_RANK_SAMPLE) as usize);

        let mut current = offset;
        for (i, word) in self.words.iter_mut().enumerate() {
            if (i as u64 * 64) % BITS_PER_RANK_SAMPLE == 0 {
                self.ranks.push(current);
            }
            current += u64::from(word.get_mut().count_ones());
        }
        current
    }

    /// Number of set bits strictly before `pos`, plus the offset passed to
    /// [`build_ranks`](Self::build_ranks).
    pub fn rank(&self, pos: u64) -> u64 {
        let word_idx = pos / 64;
        let block = pos / BITS_PER_RANK_SAMPLE;

        let mut r = self.ranks[block as usize];
        for w in block * WORDS_PER_RANK_SAMPLE..word_idx {
            r += u64::from(self.get_word(w).count_ones());
        }

        let mask = (1u64 << (pos % 64)) - 1;
        r + u64::from((self.get_word(word_idx) & mask).count_ones())
    }

    /// Serializes as `[u64 size][u64 nwords][nwords x u64][u64 ranks_len]
    /// [ranks_len x u64]`, all little-endian.
    pub fn save<W: Write>(&self, out: &mut W) -> Result<(), Error> {
        let mut w = CodecWriter::new(out);
        w.write_u64(self.size)?;
        w.write_u64(self.words.len() as u64)?;
        for word in &self.words {
            w.write_u64(word.load(Ordering::Relaxed))?;
        }
        w.write_u64(self.ranks.len() as u64)?;
        w.write_u64_slice(&self.ranks)
    }

    /// Reads back a vector written by [`save`](Self::save).
    pub fn load<R: Read>(input: &mut R) -> Result<Self, Error> {
        let mut r = CodecReader::new(input);
        let size = r.read_u64("bitset.size")?;
        let nwords = r.read_u64("bitset.nwords")?;
        if nwords != Self::nwords_for(size) as u64 {
            return Err(Error::malformed("bitset word count disagrees with size")
                .with_context("size", size)
                .with_context("nwords", nwords));
        }

        let mut bv = Self::new(size);
        for word in &mut bv.words {
            *word.get_mut() = r.read_u64("bitset.words")?;
        }

        let ranks_len = r.read_u64("bitset.ranks_len")?;
        if ranks_len > nwords {
            return Err(Error::malformed("bitset rank table larger than data")
                .with_context("ranks_len", ranks_len));
        }
        bv.ranks = r.read_u64_vec(ranks_len as usize, "bitset.ranks")?;
        Ok(bv)
    }
}

impl Clone for BitVector {
    fn clone(&self) -> Self {
        let words = self
            .words
            .iter()
            .map(|w| AtomicU64::new(w.load(Ordering::Relaxed)))
            .collect();
        Self {
            words,
            size: self.size,
            ranks: self.ranks.clone(),
        }
    }
}

impl PartialEq for BitVector {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size
            && self.ranks == other.ranks
            && self
                .words
                .iter()
                .zip(&other.words)
                .all(|(a, b)| a.load(Ordering::Relaxed) == b.load(Ordering::Relaxed))
    }
}

impl std::fmt::Debug for BitVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitVector")
            .field("size", &self.size)
            .field("nwords", &self.words.len())
            .field("ranks", &self.ranks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let bv = BitVector::new(256);
        assert_eq!(bv.size(), 256);
        for pos in 0..256 {
            assert_eq!(bv.get(pos), 0);
        }
    }

    #[test]
    fn test_set_get_reset() {
        let bv = BitVector::new(130);
        bv.set(0);
        bv.set(63);
        bv.set(64);
        bv.set(129);
        assert_eq!(bv.get(0), 1);
        assert_eq!(bv.get(63), 1);
        assert_eq!(bv.get(64), 1);
        assert_eq!(bv.get(129), 1);
        assert_eq!(bv.get(1), 0);

        bv.reset(64);
        assert_eq!(bv.get(64), 0);
        assert_eq!(bv.get(63), 1);
    }

    #[test]
    fn test_atomic_test_and_set_returns_previous() {
        let bv = BitVector::new(64);
        assert!(!bv.atomic_test_and_set(17));
        assert!(bv.atomic_test_and_set(17));
        assert_eq!(bv.get(17), 1);
    }

    #[test]
    fn test_exactly_one_winner_per_slot() {
        let bv = BitVector::new(1024);
        let wins = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for pos in 0..1024 {
                        if !bv.atomic_test_and_set(pos) {
                            wins.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        assert_eq!(wins.load(Ordering::Relaxed), 1024);
    }

    #[test]
    fn test_clear_collisions_keeps_singletons() {
        let mut bv = BitVector::new(128);
        let mut collisions = BitVector::new(128);

        bv.set(3);
        bv.set(70);
        bv.set(100);
        collisions.set(70);

        bv.clear_collisions(0, 128, &mut collisions);
        assert_eq!(bv.get(3), 1);
        assert_eq!(bv.get(70), 0);
        assert_eq!(bv.get(100), 1);
        // companion vector is recycled
        assert_eq!(collisions.get(70), 0);
    }

    #[test]
    fn test_rank_matches_naive_count() {
        let mut bv = BitVector::new(4096);
        for pos in (0..4096).step_by(7) {
            bv.set(pos);
        }
        bv.build_ranks(0);

        let mut naive = 0u64;
        for pos in 0..4096 {
            assert_eq!(bv.rank(pos), naive, "rank mismatch at {pos}");
            naive += bv.get(pos);
        }
    }

    #[test]
    fn test_build_ranks_threads_offset() {
        let mut bv = BitVector::new(600);
        bv.set(0);
        bv.set(599);
        let total = bv.build_ranks(10);
        assert_eq!(total, 12);
        assert_eq!(bv.rank(0), 10);
        assert_eq!(bv.rank(599), 11);
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut bv = BitVector::new(1000);
        for pos in (0..1000).step_by(3) {
            bv.set(pos);
        }
        bv.build_ranks(0);

        let mut bytes = Vec::new();
        bv.save(&mut bytes).unwrap();
        let loaded = BitVector::load(&mut bytes.as_slice()).unwrap();
        assert_eq!(bv, loaded);

        let mut bytes2 = Vec::new();
        loaded.save(&mut bytes2).unwrap();
        assert_eq!(bytes, bytes2);
    }

    #[test]
    fn test_load_rejects_bad_word_count() {
        let mut bytes = Vec::new();
        BitVector::new(128).save(&mut bytes).unwrap();
        // corrupt the nwords header word
        bytes[8] = 0xFF;
        assert!(BitVector::load(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn test_popcount_splits_into_halves() {
        for &x in &[0u64, 1, u64::MAX, 0xAAAA_AAAA_5555_5555, 0x8000_0000_0000_0001] {
            let low = (x as u32).count_ones();
            let high = ((x >> 32) as u32).count_ones();
            assert_eq!(x.count_ones(), low + high);
        }
    }

    #[test]
    fn test_resize_zeroes_contents() {
        let mut bv = BitVector::new(64);
        bv.set(5);
        bv.resize(192);
        assert_eq!(bv.size(), 192);
        for pos in 0..192 {
            assert_eq!(bv.get(pos), 0);
        }
    }
}
