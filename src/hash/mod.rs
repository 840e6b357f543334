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

//! Seeded hashing for the level cascade.
//!
//! The cascade needs one 64-bit hash per level, but paying a full hash
//! computation per level would make deep walks expensive. Instead, exactly
//! two seeded hashes are computed per key ([`SEED_LEVEL_0`] and
//! [`SEED_LEVEL_1`]); every deeper level derives its hash from the carried
//! pair with a Xorshift128* step (Sebastiano Vigna, public domain). Any
//! hasher implementing [`SeededHasher`] can drive the cascade; the default
//! [`XxSeededHasher`] covers the built-in integer key types through the
//! one-shot xxhash64 primitives below.

/// Seed for the hash checked against level 0.
pub const SEED_LEVEL_0: u64 = 0xAAAA_AAAA_5555_5555;

/// Seed for the hash checked against level 1.
pub const SEED_LEVEL_1: u64 = 0x3333_3333_CCCC_CCCC;

/// Length of the hash sequence exposed by [`hash_sequence`].
pub const NB_HASHES: usize = 10;

/// A pure, thread-safe, single-seed hash function over keys of type `K`.
///
/// Implementations must return the same value for the same `(key, seed)` pair
/// on every call and from every thread; the cascade derives all per-level
/// hashes from two invocations of this function. Custom key types plug in by
/// implementing this trait, typically on top of [`hash_bytes`].
pub trait SeededHasher<K: ?Sized>: Sync {
    /// Hashes `key` under `seed`.
    fn hash(&self, key: &K, seed: u64) -> u64;
}

/// The default [`SeededHasher`] for the built-in integer key types.
///
/// Integers hash as their 64-bit value through [`hash_u64`], so the result
/// does not depend on host byte order and the persisted level bitsets stay
/// portable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XxSeededHasher;

impl SeededHasher<u64> for XxSeededHasher {
    fn hash(&self, key: &u64, seed: u64) -> u64 {
        hash_u64(*key, seed)
    }
}

impl SeededHasher<u32> for XxSeededHasher {
    fn hash(&self, key: &u32, seed: u64) -> u64 {
        hash_u64(u64::from(*key), seed)
    }
}

impl SeededHasher<i64> for XxSeededHasher {
    fn hash(&self, key: &i64, seed: u64) -> u64 {
        hash_u64(*key as u64, seed)
    }
}

/// Per-key hash state carried across levels.
///
/// [`HashState::level_hash`] must be called with strictly increasing level
/// indices starting at 0: levels 0 and 1 seed the state with real hash
/// invocations, and every later level advances the Xorshift128* generator
/// whose output depends on the two previous values.
#[derive(Debug, Clone, Copy)]
pub struct HashState {
    state: [u64; 2],
}

impl HashState {
    pub fn new() -> Self {
        Self { state: [0, 0] }
    }

    /// Returns the hash to probe at `level`, advancing the state.
    #[inline]
    pub fn level_hash<K, H>(&mut self, hasher: &H, key: &K, level: u32) -> u64
    where
        K: ?Sized,
        H: SeededHasher<K>,
    {
        match level {
            0 => {
                self.state[0] = hasher.hash(key, SEED_LEVEL_0);
                self.state[0]
            }
            1 => {
                self.state[1] = hasher.hash(key, SEED_LEVEL_1);
                self.state[1]
            }
            _ => self.next(),
        }
    }

    /// One Xorshift128* step over the carried pair.
    #[inline]
    fn next(&mut self) -> u64 {
        let mut s1 = self.state[0];
        let s0 = self.state[1];
        self.state[0] = s0;
        s1 ^= s1 << 23;
        self.state[1] = s1 ^ s0 ^ (s1 >> 17) ^ (s0 >> 26);
        self.state[1].wrapping_add(s0)
    }
}

impl Default for HashState {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the first [`NB_HASHES`] cascade hashes of `key`. Diagnostic
/// helper; the builder and lookup walk the state incrementally instead.
pub fn hash_sequence<K, H>(hasher: &H, key: &K) -> [u64; NB_HASHES]
where
    K: ?Sized,
    H: SeededHasher<K>,
{
    let mut state = HashState::new();
    let mut out = [0u64; NB_HASHES];
    for (level, slot) in out.iter_mut().enumerate() {
        *slot = state.level_hash(hasher, key, level as u32);
    }
    out
}

// ============================================================================
// xxhash64 primitives
// ============================================================================

// Unsigned 64-bit primes from xxhash64.
const P1: u64 = 0x9E3779B185EBCA87;
const P2: u64 = 0xC2B2AE3D27D4EB4F;
const P3: u64 = 0x165667B19E3779F9;
const P4: u64 = 0x85EBCA77C2B2AE63;
const P5: u64 = 0x27D4EB2F165667C5;

/// One-shot xxhash64 of a single 64-bit input: the cascade's hot path for
/// integer keys. Equivalent to [`hash_bytes`] over the value's little-endian
/// bytes, without touching memory.
#[inline]
pub fn hash_u64(input: u64, seed: u64) -> u64 {
    let mut hash = seed.wrapping_add(P5).wrapping_add(8);
    let mut k1 = input;
    k1 = k1.wrapping_mul(P2);
    k1 = k1.rotate_left(31);
    k1 = k1.wrapping_mul(P1);
    hash ^= k1;
    hash = hash.rotate_left(27).wrapping_mul(P1).wrapping_add(P4);
    finalize(hash)
}

/// One-shot xxhash64 of a byte slice. This is the building block for
/// [`SeededHasher`] implementations over variable-width key types.
pub fn hash_bytes(data: &[u8], seed: u64) -> u64 {
    let mut rest = data;

    let mut hash = if data.len() >= 32 {
        let mut v1 = seed.wrapping_add(P1).wrapping_add(P2);
        let mut v2 = seed.wrapping_add(P2);
        let mut v3 = seed;
        let mut v4 = seed.wrapping_sub(P1);

        let mut stripes = data.chunks_exact(32);
        for stripe in &mut stripes {
            v1 = round(v1, read_u64_le(&stripe[0..8]));
            v2 = round(v2, read_u64_le(&stripe[8..16]));
            v3 = round(v3, read_u64_le(&stripe[16..24]));
            v4 = round(v4, read_u64_le(&stripe[24..32]));
        }
        rest = stripes.remainder();

        let mut acc = v1
            .rotate_left(1)
            .wrapping_add(v2.rotate_left(7))
            .wrapping_add(v3.rotate_left(12))
            .wrapping_add(v4.rotate_left(18));
        acc = merge_round(acc, v1);
        acc = merge_round(acc, v2);
        acc = merge_round(acc, v3);
        acc = merge_round(acc, v4);
        acc
    } else {
        seed.wrapping_add(P5)
    };

    hash = hash.wrapping_add(data.len() as u64);

    while rest.len() >= 8 {
        let mut k1 = read_u64_le(&rest[..8]);
        k1 = k1.wrapping_mul(P2);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(P1);
        hash ^= k1;
        hash = hash.rotate_left(27).wrapping_mul(P1).wrapping_add(P4);
        rest = &rest[8..];
    }

    if rest.len() >= 4 {
        hash ^= read_u32_le(&rest[..4]).wrapping_mul(P1);
        hash = hash.rotate_left(23).wrapping_mul(P2).wrapping_add(P3);
        rest = &rest[4..];
    }

    for &byte in rest {
        hash ^= u64::from(byte).wrapping_mul(P5);
        hash = hash.rotate_left(11).wrapping_mul(P1);
    }

    finalize(hash)
}

#[inline]
fn round(mut acc: u64, input: u64) -> u64 {
    acc = acc.wrapping_add(input.wrapping_mul(P2));
    acc = acc.rotate_left(31);
    acc.wrapping_mul(P1)
}

#[inline]
fn merge_round(mut acc: u64, val: u64) -> u64 {
    let mut v = val;
    v = v.wrapping_mul(P2);
    v = v.rotate_left(31);
    v = v.wrapping_mul(P1);
    acc ^= v;
    acc.wrapping_mul(P1).wrapping_add(P4)
}

#[inline]
fn finalize(mut hash: u64) -> u64 {
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(P2);
    hash ^= hash >> 29;
    hash = hash.wrapping_mul(P3);
    hash ^ (hash >> 32)
}

#[inline]
fn read_u64_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

#[inline]
fn read_u32_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u64::from(u32::from_le_bytes(buf))
}
