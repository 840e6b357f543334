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

use std::io::Read;
use std::io::Write;

use tracing::debug;

use crate::bitvec::BitVector;
use crate::codec::CodecReader;
use crate::codec::CodecWriter;
use crate::error::Error;
use crate::hash::HashState;
use crate::hash::SeededHasher;
use crate::hash::XxSeededHasher;
use crate::mphf::builder::MphfBuilder;
use crate::mphf::key::Key;
use crate::mphf::level::fastrange64;
use crate::mphf::level::level_geometry;
use crate::mphf::level::walk_levels;
use crate::mphf::level::Level;
use crate::mphf::level::NB_LEVELS;
use crate::mphf::FinalMap;

/// Sentinel returned by [`Mphf::lookup`] when a key has no index: the
/// function is empty, or the key provably was not in the construction set.
/// Callers must treat it as out of range.
pub const NOT_FOUND: u64 = u64::MAX;

/// Storage accounting estimate for one fallback-map entry, in bytes.
const FINAL_MAP_ENTRY_BYTES: u64 = 42;

/// A minimal perfect hash function over a fixed set of keys.
///
/// Maps the `n` construction keys bijectively onto `0..n` and answers
/// lookups in expected constant time using a few bits per key. The function
/// is immutable once built; keys outside the construction set map to an
/// arbitrary in-range index or to [`NOT_FOUND`] (this is not a membership
/// filter - layer a fingerprint check if containment matters).
///
/// # Examples
///
/// ```
/// use mphash::mphf::Mphf;
///
/// let keys = vec![1u64, 10, 1000, 23, 457, 856, 845, 124, 912];
/// let phf = Mphf::builder().build(&keys).unwrap();
///
/// let mut indices: Vec<u64> = keys.iter().map(|k| phf.lookup(k)).collect();
/// indices.sort();
/// let expected: Vec<u64> = (0..keys.len() as u64).collect();
/// assert_eq!(indices, expected);
/// ```
pub struct Mphf<K: Key, H = XxSeededHasher> {
    gamma: f64,
    nelem: u64,
    levels: Vec<Level>,
    last_bitset_rank: u64,
    final_hash: FinalMap<K>,
    hasher: H,
}

impl<K: Key> Mphf<K, XxSeededHasher> {
    /// Returns a builder with default parameters.
    pub fn builder() -> MphfBuilder<K, XxSeededHasher> {
        MphfBuilder::new()
    }
}

impl<K: Key, H> Mphf<K, H> {
    pub(crate) fn from_parts(
        gamma: f64,
        nelem: u64,
        levels: Vec<Level>,
        last_bitset_rank: u64,
        final_hash: FinalMap<K>,
        hasher: H,
    ) -> Self {
        Self {
            gamma,
            nelem,
            levels,
            last_bitset_rank,
            final_hash,
            hasher,
        }
    }

    /// Number of keys the function was built over.
    pub fn nb_keys(&self) -> u64 {
        self.nelem
    }

    /// The gamma parameter the function was built with.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Total storage footprint in bits: level bit arrays, rank samples, and
    /// an estimate for the fallback-map entries.
    pub fn total_bit_size(&self) -> u64 {
        let bitset_bits: u64 = self.levels.iter().map(|l| l.bitset.bit_size()).sum();
        let final_map_bits = self.final_hash.len() as u64 * FINAL_MAP_ENTRY_BYTES * 8;
        debug!(
            bitset_bits,
            final_map_bits,
            final_map_entries = self.final_hash.len(),
            "storage breakdown"
        );
        bitset_bits + final_map_bits
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Returns the key's index in `0..nb_keys()`, or [`NOT_FOUND`].
    ///
    /// For construction keys the result is unique and in range. For other
    /// keys the result is an arbitrary in-range index or [`NOT_FOUND`],
    /// whichever way the cascade happens to fall.
    pub fn lookup(&self, key: &K) -> u64
    where
        H: SeededHasher<K>,
    {
        if self.levels.is_empty() {
            return NOT_FOUND;
        }

        let mut state = HashState::new();
        let upto = self.levels.len() - 1;
        let (level, hash) = walk_levels(&self.levels, &self.hasher, key, upto, 0, &mut state);

        if level < upto {
            // build_ranks chained offsets across levels, so the in-level rank
            // already is the global minimal index
            let slot = fastrange64(hash, self.levels[level].hash_domain);
            return self.levels[level].bitset.rank(slot);
        }

        match self.final_hash.get(key) {
            Some(&index) => index + self.last_bitset_rank,
            None => NOT_FOUND,
        }
    }

    /// Like [`lookup`](Self::lookup), with `None` instead of the sentinel.
    pub fn try_lookup(&self, key: &K) -> Option<u64>
    where
        H: SeededHasher<K>,
    {
        let index = self.lookup(key);
        (index != NOT_FOUND).then_some(index)
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Writes the function to `out` in the little-endian persisted format:
    ///
    /// ```text
    /// [f64 gamma][u32 nb_levels][u64 last_bitset_rank][u64 nelem]
    /// nb_levels x level bitset blob
    /// [u64 final_map_len] then (key, u64 index) pairs
    /// ```
    ///
    /// Fallback-map pairs are written in index order so equal functions
    /// serialize to equal bytes.
    pub fn save<W: Write>(&self, out: &mut W) -> Result<(), Error> {
        {
            let mut w = CodecWriter::new(&mut *out);
            w.write_f64(self.gamma)?;
            w.write_u32(self.levels.len() as u32)?;
            w.write_u64(self.last_bitset_rank)?;
            w.write_u64(self.nelem)?;
        }

        for level in &self.levels {
            level.bitset.save(out)?;
        }

        let mut w = CodecWriter::new(out);
        w.write_u64(self.final_hash.len() as u64)?;
        let mut entries: Vec<(&K, u64)> = self.final_hash.iter().map(|(k, &v)| (k, v)).collect();
        entries.sort_by_key(|&(_, index)| index);
        for (key, index) in entries {
            key.write_le(w.inner_mut())
                .map_err(|e| Error::io("failed to write fallback-map key", e))?;
            w.write_u64(index)?;
        }
        w.flush()
    }

    /// Serializes to an owned byte vector. See [`save`](Self::save).
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = Vec::new();
        self.save(&mut bytes)?;
        Ok(bytes)
    }

    /// Reads a function written by [`save`](Self::save), supplying the
    /// hasher explicitly. Level geometry is recomputed from gamma and the
    /// key count rather than persisted.
    pub fn load_with_hasher<R: Read>(input: &mut R, hasher: H) -> Result<Self, Error> {
        let (gamma, nb_levels, last_bitset_rank, nelem) = {
            let mut r = CodecReader::new(&mut *input);
            (
                r.read_f64("gamma")?,
                r.read_u32("nb_levels")?,
                r.read_u64("last_bitset_rank")?,
                r.read_u64("nelem")?,
            )
        };

        if !gamma.is_finite() || gamma < 1.0 {
            return Err(Error::malformed("persisted gamma is invalid").with_context("gamma", gamma));
        }
        if nb_levels != 0 && nb_levels != NB_LEVELS {
            return Err(Error::malformed("unexpected level count").with_context("nb_levels", nb_levels));
        }
        if (nb_levels == 0) != (nelem == 0) {
            return Err(Error::malformed("level count disagrees with key count")
                .with_context("nb_levels", nb_levels)
                .with_context("nelem", nelem));
        }

        let mut levels = Vec::with_capacity(nb_levels as usize);
        if nb_levels > 0 {
            let geometry = level_geometry(gamma, nelem);
            for (idx_begin, hash_domain) in geometry {
                let bitset = BitVector::load(input)?;
                if bitset.size() != hash_domain {
                    return Err(Error::malformed("level bitset size disagrees with geometry")
                        .with_context("expected", hash_domain)
                        .with_context("actual", bitset.size()));
                }
                levels.push(Level {
                    idx_begin,
                    hash_domain,
                    bitset,
                });
            }
        }

        let mut r = CodecReader::new(input);
        let final_len = r.read_u64("final_map_len")?;
        if last_bitset_rank.checked_add(final_len) != Some(nelem) {
            return Err(Error::malformed("rank total and fallback map do not cover all keys")
                .with_context("last_bitset_rank", last_bitset_rank)
                .with_context("final_map_len", final_len));
        }

        let mut final_hash = FinalMap::default();
        final_hash.reserve(final_len as usize);
        for _ in 0..final_len {
            let key = K::read_le(r.inner_mut()).map_err(|e| crate::codec::read_error(e, "final_map_key"))?;
            let index = r.read_u64("final_map_index")?;
            final_hash.insert(key, index);
        }

        Ok(Self::from_parts(
            gamma,
            nelem,
            levels,
            last_bitset_rank,
            final_hash,
            hasher,
        ))
    }

    /// Reads a function written by [`save`](Self::save) using the default
    /// hasher value.
    pub fn load<R: Read>(input: &mut R) -> Result<Self, Error>
    where
        H: Default,
    {
        Self::load_with_hasher(input, H::default())
    }

    /// Deserializes from bytes. See [`load`](Self::load).
    pub fn deserialize(mut bytes: &[u8]) -> Result<Self, Error>
    where
        H: Default,
    {
        Self::load(&mut bytes)
    }
}

impl<K: Key, H: PartialEq> PartialEq for Mphf<K, H> {
    fn eq(&self, other: &Self) -> bool {
        self.gamma.to_bits() == other.gamma.to_bits()
            && self.nelem == other.nelem
            && self.last_bitset_rank == other.last_bitset_rank
            && self.levels.len() == other.levels.len()
            && self
                .levels
                .iter()
                .zip(&other.levels)
                .all(|(a, b)| a.bitset == b.bitset)
            && self.final_hash == other.final_hash
            && self.hasher == other.hasher
    }
}

impl<K: Key, H> std::fmt::Debug for Mphf<K, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mphf")
            .field("gamma", &self.gamma)
            .field("nelem", &self.nelem)
            .field("levels", &self.levels.len())
            .field("last_bitset_rank", &self.last_bitset_rank)
            .field("final_map_entries", &self.final_hash.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_function_serializes() {
        let phf = Mphf::<u64>::builder().build(&[]).unwrap();
        let bytes = phf.serialize().unwrap();
        let loaded = Mphf::<u64>::deserialize(&bytes).unwrap();
        assert_eq!(loaded.nb_keys(), 0);
        assert_eq!(loaded.lookup(&7), NOT_FOUND);
        assert_eq!(phf, loaded);
    }

    #[test]
    fn test_out_of_set_key_is_in_range_or_sentinel() {
        let keys: Vec<u64> = (0..1_000).map(|i| i * 2).collect();
        let phf = Mphf::builder().gamma(2.0).build(&keys).unwrap();
        for probe in (1..2_000u64).step_by(2) {
            let index = phf.lookup(&probe);
            assert!(index == NOT_FOUND || index < 1_000);
        }
    }

    #[test]
    fn test_try_lookup_mirrors_lookup() {
        let keys: Vec<u64> = (0..100).collect();
        let phf = Mphf::builder().build(&keys).unwrap();
        assert_eq!(phf.try_lookup(&5), Some(phf.lookup(&5)));

        let empty = Mphf::<u64>::builder().build(&[]).unwrap();
        assert_eq!(empty.try_lookup(&5), None);
    }

    #[test]
    fn test_load_rejects_truncated_stream() {
        let keys: Vec<u64> = (0..500).collect();
        let phf = Mphf::builder().gamma(1.0).build(&keys).unwrap();
        let bytes = phf.serialize().unwrap();
        let err = Mphf::<u64>::deserialize(&bytes[..bytes.len() / 2]).unwrap_err();
        assert_eq!(
            err.kind(),
            crate::error::ErrorKind::MalformedDeserializeData
        );
    }

    #[test]
    fn test_load_rejects_garbage_header() {
        let bytes = vec![0xFFu8; 64];
        assert!(Mphf::<u64>::deserialize(&bytes).is_err());
    }

    #[test]
    fn test_total_bit_size_accounts_levels() {
        let keys: Vec<u64> = (0..10_000).collect();
        let phf = Mphf::builder().gamma(2.0).build(&keys).unwrap();
        let bits = phf.total_bit_size();
        // at least level 0's gamma*n bits, and sane overall
        assert!(bits >= 20_000);
        let per_key = bits as f64 / keys.len() as f64;
        assert!(per_key < 64.0, "bits per key is {per_key}");
    }
}
