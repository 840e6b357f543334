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

use crate::bitvec::BitVector;
use crate::hash::HashState;
use crate::hash::SeededHasher;

/// Number of cascade levels. Keys colliding through all of them land in the
/// fallback map, so this bounds the walk, not correctness.
pub(crate) const NB_LEVELS: u32 = 25;

/// Reduces a 64-bit hash into `[0, p)`. The name is historical; build and
/// lookup must agree on the reduction, nothing else does.
#[inline]
pub(crate) fn fastrange64(word: u64, p: u64) -> u64 {
    word % p
}

/// One cascade level: a bit space of `hash_domain` slots.
///
/// After construction a bit is set iff exactly one key landed on that slot
/// while the level was processed.
pub(crate) struct Level {
    /// Cumulative slot offset of this level, kept for diagnostics.
    pub idx_begin: u64,
    pub hash_domain: u64,
    pub bitset: BitVector,
}

impl Level {
    #[inline]
    pub fn is_set(&self, hash_raw: u64) -> bool {
        self.bitset.get(fastrange64(hash_raw, self.hash_domain)) == 1
    }
}

/// Estimated per-level collision probability `1 - ((gn-1)/gn)^(n-1)`.
pub(crate) fn collision_probability(gamma: f64, nelem: u64) -> f64 {
    let gn = gamma * nelem as f64;
    1.0 - ((gn - 1.0) / gn).powf(nelem.saturating_sub(1) as f64)
}

/// Computes `(idx_begin, hash_domain)` for every level.
///
/// Level 0 spans `ceil(gamma * n)` slots and each deeper level shrinks by the
/// collision probability factor. Domains are rounded up to a multiple of 64
/// and never drop below 64, so whole words can be cleared and serialized.
/// Shared by the builder and the load path so both always agree.
pub(crate) fn level_geometry(gamma: f64, nelem: u64) -> Vec<(u64, u64)> {
    let domain0 = (nelem as f64 * gamma).ceil() as u64;
    let proba = collision_probability(gamma, nelem);

    let mut out = Vec::with_capacity(NB_LEVELS as usize);
    let mut previous_idx = 0u64;
    for level in 0..NB_LEVELS {
        let domain_d = domain0 as f64 * proba.powf(f64::from(level));
        let mut domain = (domain_d.ceil() as u64 + 63) / 64 * 64;
        if domain == 0 {
            domain = 64;
        }
        out.push((previous_idx, domain));
        previous_idx += domain;
    }
    out
}

/// Walks levels `[0, upto)` until one claims the key.
///
/// Every level's hash is computed to keep the cascade state advancing, but
/// set bits are only consulted from `min_check` on (the spill path feeds
/// pre-filtered keys, so earlier levels need no re-checking). Returns the
/// first claiming level and the hash probed there, or `(upto, last_hash)`
/// when the key fell through.
#[inline]
pub(crate) fn walk_levels<K, H>(
    levels: &[Level],
    hasher: &H,
    key: &K,
    upto: usize,
    min_check: usize,
    state: &mut HashState,
) -> (usize, u64)
where
    K: ?Sized,
    H: SeededHasher<K>,
{
    let mut hash = 0u64;
    for lvl in 0..upto {
        hash = state.level_hash(hasher, key, lvl as u32);
        if lvl >= min_check && levels[lvl].is_set(hash) {
            return (lvl, hash);
        }
    }
    (upto, hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_is_word_aligned_and_bounded() {
        let geometry = level_geometry(2.0, 10_000);
        assert_eq!(geometry.len(), NB_LEVELS as usize);
        for &(_, domain) in &geometry {
            assert_eq!(domain % 64, 0);
            assert!(domain >= 64);
        }
        // strictly shrinking until the 64-bit floor
        assert!(geometry[0].1 > geometry[1].1);
        assert!(geometry[1].1 >= geometry[2].1);
    }

    #[test]
    fn test_geometry_offsets_are_cumulative() {
        let geometry = level_geometry(1.0, 5_000);
        let mut expected = 0u64;
        for &(idx_begin, domain) in &geometry {
            assert_eq!(idx_begin, expected);
            expected += domain;
        }
    }

    #[test]
    fn test_single_key_collapses_to_floor() {
        // n = 1 gives collision probability 0: every deeper level is floored.
        let geometry = level_geometry(1.0, 1);
        assert!(geometry.iter().all(|&(_, domain)| domain == 64));
    }

    #[test]
    fn test_collision_probability_range() {
        let p = collision_probability(2.0, 100_000);
        assert!(p > 0.0 && p < 1.0);
        assert_eq!(collision_probability(1.0, 1), 0.0);
    }

    #[test]
    fn test_fastrange_is_modulo() {
        assert_eq!(fastrange64(1000, 64), 1000 % 64);
        assert_eq!(fastrange64(u64::MAX, 640), u64::MAX % 640);
    }
}
