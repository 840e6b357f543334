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

use std::marker::PhantomData;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use tracing::debug;
use tracing::info;

use crate::bitvec::BitVector;
use crate::error::Error;
use crate::hash::HashState;
use crate::hash::SeededHasher;
use crate::hash::XxSeededHasher;
use crate::mphf::key::Key;
use crate::mphf::level::collision_probability;
use crate::mphf::level::fastrange64;
use crate::mphf::level::level_geometry;
use crate::mphf::level::walk_levels;
use crate::mphf::level::Level;
use crate::mphf::level::NB_LEVELS;
use crate::mphf::sketch::Mphf;
use crate::mphf::spill::SpillDir;
use crate::mphf::spill::SpillReader;
use crate::mphf::spill::SpillWriter;
use crate::mphf::FinalMap;
use crate::mphf::BATCH_KEYS;
use crate::progress::Progress;

/// Workers report progress in batches of this many keys.
const PROGRESS_GRANULARITY: u64 = 1024;

/// Builder for [`Mphf`] instances.
///
/// Construction hashes every key into a cascade of shrinking bit arrays;
/// keys that collide at one level are carried to the next, and the small
/// residue surviving all levels lands in a fallback map. The input slice is
/// rescanned once per level unless fast mode or spill mode shortens the
/// scans.
///
/// # Examples
///
/// ```
/// use mphash::mphf::Mphf;
///
/// let keys: Vec<u64> = (0..10_000).collect();
/// let phf = Mphf::builder()
///     .gamma(2.0)
///     .num_threads(4)
///     .build(&keys)
///     .unwrap();
///
/// assert!(phf.lookup(&42) < 10_000);
/// ```
#[derive(Debug, Clone)]
pub struct MphfBuilder<K: Key, H = XxSeededHasher> {
    gamma: f64,
    num_threads: u32,
    write_each_level: bool,
    progress: bool,
    perc_elem_loaded: f32,
    hasher: H,
    _marker: PhantomData<K>,
}

impl<K: Key> MphfBuilder<K, XxSeededHasher> {
    pub fn new() -> Self {
        Self {
            gamma: 2.0,
            num_threads: 1,
            write_each_level: false,
            progress: false,
            perc_elem_loaded: 0.03,
            hasher: XxSeededHasher,
            _marker: PhantomData,
        }
    }
}

impl<K: Key> Default for MphfBuilder<K, XxSeededHasher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key, H> MphfBuilder<K, H> {
    /// Sets the space/time trade-off (default 2.0).
    ///
    /// Level 0 spans `gamma * n` slots: larger gamma means fewer collisions,
    /// faster builds and lookups, and more bits per key. Values below 1.0
    /// are rejected at build time.
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Sets the number of worker threads per level (default 1).
    pub fn num_threads(mut self, num_threads: u32) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Spills each level's carried keys to a temp file instead of rescanning
    /// the input (default off). Implies fast mode off.
    pub fn write_each_level(mut self, write_each_level: bool) -> Self {
        self.write_each_level = write_each_level;
        self
    }

    /// Enables progress reporting through `tracing` (default off).
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Sets the fast-mode threshold rho in `[0, 1]` (default 0.03).
    ///
    /// Once the expected carried fraction drops below rho, survivors are
    /// materialised in RAM and deeper levels scan only them. 0 disables
    /// fast mode.
    pub fn perc_elem_loaded(mut self, perc_elem_loaded: f32) -> Self {
        self.perc_elem_loaded = perc_elem_loaded;
        self
    }

    /// Replaces the seeded hasher driving the cascade.
    pub fn hasher<H2>(self, hasher: H2) -> MphfBuilder<K, H2> {
        MphfBuilder {
            gamma: self.gamma,
            num_threads: self.num_threads,
            write_each_level: self.write_each_level,
            progress: self.progress,
            perc_elem_loaded: self.perc_elem_loaded,
            hasher,
            _marker: PhantomData,
        }
    }

    /// Builds the minimal perfect hash function over `keys`.
    ///
    /// `keys` must not contain duplicates; duplicate inputs produce an
    /// unusable function (this is not validated, matching the cost model of
    /// a streaming build).
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ConfigInvalid`](crate::error::ErrorKind) for a
    /// bad configuration and [`ErrorKind::Io`](crate::error::ErrorKind) if
    /// spill files cannot be written.
    pub fn build(self, keys: &[K]) -> Result<Mphf<K, H>, Error>
    where
        H: SeededHasher<K>,
    {
        self.validate()?;

        let nelem = keys.len() as u64;
        if nelem == 0 {
            return Ok(Mphf::from_parts(
                self.gamma,
                0,
                Vec::new(),
                0,
                FinalMap::default(),
                self.hasher,
            ));
        }

        let proba = collision_probability(self.gamma, nelem);
        let mut levels: Vec<Level> = level_geometry(self.gamma, nelem)
            .into_iter()
            .map(|(idx_begin, hash_domain)| Level {
                idx_begin,
                hash_domain,
                bitset: BitVector::new(0),
            })
            .collect();

        let fast_mode = self.perc_elem_loaded > 0.0 && !self.write_each_level;
        let fast_mode_level = (0..NB_LEVELS)
            .find(|&i| proba.powf(f64::from(i)) < f64::from(self.perc_elem_loaded))
            .unwrap_or(0) as usize;
        let capture_cap = (f64::from(self.perc_elem_loaded) * nelem as f64) as usize;
        let fast = FastCapture::new(capture_cap, fast_mode);

        let spill_dir = if self.write_each_level {
            Some(SpillDir::create()?)
        } else {
            None
        };

        let progress = self
            .progress
            .then(|| Progress::init(self.total_ticks(nelem, proba, fast_mode, fast_mode_level), "building mphf", self.num_threads));

        info!(
            nelem,
            gamma = self.gamma,
            num_threads = self.num_threads,
            write_each_level = self.write_each_level,
            fast_mode,
            fast_mode_level,
            "building minimal perfect hash function"
        );

        let shared = BuildShared {
            final_hash: Mutex::new(FinalMap::default()),
            hash_index: AtomicU64::new(0),
        };

        let mut survivors: Vec<K> = Vec::new();
        let mut offset = 0u64;

        for level_idx in 0..NB_LEVELS as usize {
            let domain = levels[level_idx].hash_domain;
            let bitset = BitVector::new(domain);
            let collisions = BitVector::new(domain);
            let last_level = level_idx == NB_LEVELS as usize - 1;

            let source = if let (Some(dir), true) = (&spill_dir, level_idx >= 2) {
                KeySource::Spill(SpillReader::open(dir.level_path(level_idx - 1))?)
            } else if fast.is_enabled() && level_idx > fast_mode_level {
                KeySource::slice(&survivors)
            } else {
                KeySource::slice(keys)
            };

            let spill_writer = match &spill_dir {
                Some(dir) if level_idx > 0 && !last_level => {
                    Some(SpillWriter::create(dir.level_path(level_idx))?)
                }
                _ => None,
            };

            let capturing = fast.is_enabled() && level_idx == fast_mode_level;
            let ctx = LevelCtx {
                hasher: &self.hasher,
                finished: &levels[..level_idx],
                level_idx,
                min_check: if self.write_each_level {
                    level_idx.saturating_sub(1)
                } else {
                    0
                },
                last_level,
                domain,
                bitset: &bitset,
                collisions: &collisions,
                source: Mutex::new(source),
                shared: &shared,
                capture: capturing.then_some(&fast),
                spill: spill_writer.as_ref(),
                progress: progress.as_ref(),
            };
            run_level(&ctx, self.num_threads)?;
            drop(ctx);

            if let Some(writer) = spill_writer {
                writer.finish()?;
            }
            if let (Some(dir), true) = (&spill_dir, level_idx >= 2) {
                dir.remove_level(level_idx - 1);
            }
            if capturing && fast.is_enabled() {
                survivors = fast.take();
            }

            // a bit survives only when exactly one key stored to it
            let mut bitset = bitset;
            let mut collisions = collisions;
            bitset.clear_collisions(0, domain, &mut collisions);
            let next_offset = bitset.build_ranks(offset);
            debug!(
                level = level_idx,
                idx_begin = levels[level_idx].idx_begin,
                domain,
                assigned = next_offset - offset,
                "level processed"
            );
            offset = next_offset;
            levels[level_idx].bitset = bitset;
        }

        if let Some(progress) = &progress {
            progress.finish_threaded();
        }

        let mut final_hash = shared.final_hash.into_inner().unwrap();
        // The racing index counter hands out indices in scheduling order;
        // reassign them in key order so builds are reproducible for any
        // thread count.
        if final_hash.len() > 1 {
            let mut residue: Vec<K> = final_hash.keys().copied().collect();
            residue.sort_unstable();
            for (index, key) in residue.into_iter().enumerate() {
                final_hash.insert(key, index as u64);
            }
        }
        debug_assert_eq!(offset + final_hash.len() as u64, nelem);
        info!(
            nelem,
            in_levels = offset,
            in_final_map = final_hash.len(),
            "minimal perfect hash function built"
        );

        Ok(Mphf::from_parts(
            self.gamma,
            nelem,
            levels,
            offset,
            final_hash,
            self.hasher,
        ))
    }

    fn validate(&self) -> Result<(), Error> {
        if !self.gamma.is_finite() || self.gamma < 1.0 {
            return Err(Error::config("gamma must be at least 1.0").with_context("gamma", self.gamma));
        }
        if self.num_threads == 0 {
            return Err(Error::config("at least one worker thread is required"));
        }
        if !(0.0..=1.0).contains(&self.perc_elem_loaded) {
            return Err(Error::config("perc_elem_loaded must be within [0, 1]")
                .with_context("perc_elem_loaded", self.perc_elem_loaded));
        }
        Ok(())
    }

    /// Estimated total keys processed over the whole build, per strategy.
    fn total_ticks(&self, nelem: u64, proba: f64, fast_mode: bool, fast_mode_level: usize) -> u64 {
        let n = nelem as f64;
        if self.write_each_level {
            // each level reads the geometric remainder, plus one spill pass
            (n * (1.0 / (1.0 - proba) + 1.0)) as u64
        } else if fast_mode {
            let fml = fast_mode_level as f64;
            (n * ((fml + 1.0) + proba.powf(fml) * (f64::from(NB_LEVELS) - (fml + 1.0)))) as u64
        } else {
            nelem * u64::from(NB_LEVELS)
        }
    }
}

/// State shared by all workers across all levels.
struct BuildShared<K> {
    final_hash: Mutex<FinalMap<K>>,
    hash_index: AtomicU64,
}

/// Everything a worker needs for one level.
struct LevelCtx<'a, K: Key, H> {
    hasher: &'a H,
    finished: &'a [Level],
    level_idx: usize,
    min_check: usize,
    last_level: bool,
    domain: u64,
    bitset: &'a BitVector,
    collisions: &'a BitVector,
    source: Mutex<KeySource<'a, K>>,
    shared: &'a BuildShared<K>,
    capture: Option<&'a FastCapture<K>>,
    spill: Option<&'a SpillWriter<K>>,
    progress: Option<&'a Progress>,
}

/// Where a level's keys come from: the input slice, the fast-mode survivors,
/// or the previous level's spill file. Workers pull batches under a mutex and
/// process them lock-free.
enum KeySource<'a, K: Key> {
    Slice { keys: &'a [K], pos: usize },
    Spill(SpillReader<K>),
}

impl<'a, K: Key> KeySource<'a, K> {
    fn slice(keys: &'a [K]) -> Self {
        KeySource::Slice { keys, pos: 0 }
    }

    fn fill(&mut self, out: &mut Vec<K>, max: usize) -> Result<(), Error> {
        match self {
            KeySource::Slice { keys, pos } => {
                let end = (*pos + max).min(keys.len());
                out.extend_from_slice(&keys[*pos..end]);
                *pos = end;
                Ok(())
            }
            KeySource::Spill(reader) => reader.fill(out, max),
        }
    }
}

/// Bounded buffer of fast-mode survivors.
///
/// Sized for the expected residue at the capture level; if the estimate is
/// exceeded the whole mechanism is switched off for this build and deeper
/// levels fall back to rescanning the input.
struct FastCapture<K> {
    keys: Mutex<Vec<K>>,
    cap: usize,
    enabled: AtomicBool,
}

impl<K: Copy> FastCapture<K> {
    fn new(cap: usize, enabled: bool) -> Self {
        Self {
            keys: Mutex::new(Vec::new()),
            cap,
            enabled: AtomicBool::new(enabled),
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn push_batch(&self, batch: &[K]) {
        if batch.is_empty() || !self.is_enabled() {
            return;
        }
        let mut keys = self.keys.lock().unwrap();
        if keys.len() + batch.len() > self.cap {
            self.enabled.store(false, Ordering::Relaxed);
        } else {
            keys.extend_from_slice(batch);
        }
    }

    fn take(&self) -> Vec<K> {
        std::mem::take(&mut *self.keys.lock().unwrap())
    }
}

/// Runs one level to completion on `num_threads` workers.
fn run_level<K, H>(ctx: &LevelCtx<'_, K, H>, num_threads: u32) -> Result<(), Error>
where
    K: Key,
    H: SeededHasher<K>,
{
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..num_threads)
            .map(|tid| scope.spawn(move || process_keys(ctx, tid)))
            .collect();

        let mut result = Ok(());
        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        result
    })
}

/// Worker loop: pull a batch under the source mutex, then process it with
/// atomic bit operations only. The two exceptional paths (final-map insert,
/// survivor capture) are documented on their call sites.
fn process_keys<K, H>(ctx: &LevelCtx<'_, K, H>, tid: u32) -> Result<(), Error>
where
    K: Key,
    H: SeededHasher<K>,
{
    let mut batch: Vec<K> = Vec::with_capacity(BATCH_KEYS);
    let mut spill_buf: Vec<K> = Vec::new();
    let mut captured: Vec<K> = Vec::new();
    let mut ticks = 0u64;

    loop {
        batch.clear();
        ctx.source.lock().unwrap().fill(&mut batch, BATCH_KEYS)?;
        if batch.is_empty() {
            break;
        }

        for &key in &batch {
            let mut state = HashState::new();
            let (level, _) = walk_levels(
                ctx.finished,
                ctx.hasher,
                &key,
                ctx.level_idx,
                ctx.min_check,
                &mut state,
            );

            if level == ctx.level_idx {
                if ctx.capture.is_some() {
                    captured.push(key);
                }

                if ctx.last_level {
                    // small residue: a mutexed map insert is fine here
                    let index = ctx.shared.hash_index.fetch_add(1, Ordering::Relaxed);
                    ctx.shared.final_hash.lock().unwrap().insert(key, index);
                } else {
                    if let Some(writer) = ctx.spill {
                        spill_buf.push(key);
                        if spill_buf.len() >= BATCH_KEYS {
                            writer.flush_batch(&spill_buf)?;
                            spill_buf.clear();
                        }
                    }

                    let hash = state.level_hash(ctx.hasher, &key, ctx.level_idx as u32);
                    let slot = fastrange64(hash, ctx.domain);
                    if ctx.bitset.atomic_test_and_set(slot) {
                        ctx.collisions.set(slot);
                    }
                }
            }

            ticks += 1;
            if ticks == PROGRESS_GRANULARITY {
                if let Some(progress) = ctx.progress {
                    progress.inc(ticks, tid);
                }
                ticks = 0;
            }
        }

        if let Some(capture) = ctx.capture {
            capture.push_batch(&captured);
            captured.clear();
        }
    }

    if let Some(writer) = ctx.spill {
        if !spill_buf.is_empty() {
            writer.flush_batch(&spill_buf)?;
        }
    }
    if ticks > 0 {
        if let Some(progress) = ctx.progress {
            progress.inc(ticks, tid);
        }
    }
    Ok(())
}
