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

//! Temp-file spilling of per-level key sets.
//!
//! In spill mode each level writes the keys that reached it to a file in a
//! scratch directory; the next level then scans that file instead of the full
//! input. Files hold raw little-endian keys, nothing else. The directory is
//! a [`tempfile::TempDir`] owned by the builder, so an aborted build leaves
//! nothing behind.

use std::fs;
use std::fs::File;
use std::io;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Write;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::TempDir;

use crate::error::Error;
use crate::mphf::key::Key;

/// Scratch directory holding one key file per spilled level.
pub(crate) struct SpillDir {
    dir: TempDir,
}

impl SpillDir {
    pub fn create() -> Result<Self, Error> {
        let dir = tempfile::Builder::new()
            .prefix("mphash-levels-")
            .tempdir()
            .map_err(|e| Error::io("failed to create level spill directory", e))?;
        Ok(Self { dir })
    }

    pub fn level_path(&self, level: usize) -> PathBuf {
        self.dir.path().join(format!("level_{level}.keys"))
    }

    /// Best-effort removal of a consumed level file.
    pub fn remove_level(&self, level: usize) {
        let _ = fs::remove_file(self.level_path(level));
    }
}

/// Shared writer for the level currently being filled. Workers buffer keys
/// locally and flush whole batches under the file lock.
pub(crate) struct SpillWriter<K> {
    out: Mutex<BufWriter<File>>,
    path: PathBuf,
    _marker: PhantomData<K>,
}

impl<K: Key> SpillWriter<K> {
    pub fn create(path: PathBuf) -> Result<Self, Error> {
        let file = File::create(&path)
            .map_err(|e| Error::io("failed to create level spill file", e).with_context("path", path.display()))?;
        Ok(Self {
            out: Mutex::new(BufWriter::new(file)),
            path,
            _marker: PhantomData,
        })
    }

    pub fn flush_batch(&self, keys: &[K]) -> Result<(), Error> {
        let mut out = self.out.lock().unwrap();
        for key in keys {
            key.write_le(&mut *out)
                .map_err(|e| Error::io("failed to spill level keys", e))?;
        }
        Ok(())
    }

    /// Flushes buffered bytes; the file stays on disk for the next level.
    pub fn finish(self) -> Result<(), Error> {
        let mut out = self.out.into_inner().unwrap();
        out.flush()
            .map_err(|e| Error::io("failed to flush level spill file", e).with_context("path", self.path.display()))
    }
}

/// Sequential reader over a previous level's key file.
pub(crate) struct SpillReader<K> {
    input: BufReader<File>,
    exhausted: bool,
    _marker: PhantomData<K>,
}

impl<K: Key> SpillReader<K> {
    pub fn open(path: PathBuf) -> Result<Self, Error> {
        let file = File::open(&path)
            .map_err(|e| Error::io("failed to open level spill file", e).with_context("path", path.display()))?;
        Ok(Self {
            input: BufReader::new(file),
            exhausted: false,
            _marker: PhantomData,
        })
    }

    /// Appends up to `max` keys to `out`, stopping early at end of file.
    pub fn fill(&mut self, out: &mut Vec<K>, max: usize) -> Result<(), Error> {
        if self.exhausted {
            return Ok(());
        }
        for _ in 0..max {
            match K::read_le(&mut self.input) {
                Ok(key) => out.push(key),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    self.exhausted = true;
                    break;
                }
                Err(e) => return Err(Error::io("failed to read level spill file", e)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spill_round_trip_in_batches() {
        let dir = SpillDir::create().unwrap();
        let path = dir.level_path(3);

        let writer = SpillWriter::<u64>::create(path.clone()).unwrap();
        writer.flush_batch(&[1, 2, 3]).unwrap();
        writer.flush_batch(&[4, 5]).unwrap();
        writer.finish().unwrap();

        let mut reader = SpillReader::<u64>::open(path).unwrap();
        let mut keys = Vec::new();
        reader.fill(&mut keys, 2).unwrap();
        assert_eq!(keys, vec![1, 2]);
        reader.fill(&mut keys, 100).unwrap();
        assert_eq!(keys, vec![1, 2, 3, 4, 5]);

        // further fills are no-ops once exhausted
        reader.fill(&mut keys, 10).unwrap();
        assert_eq!(keys.len(), 5);
    }

    #[test]
    fn test_remove_level_is_idempotent() {
        let dir = SpillDir::create().unwrap();
        let writer = SpillWriter::<u64>::create(dir.level_path(0)).unwrap();
        writer.finish().unwrap();
        dir.remove_level(0);
        dir.remove_level(0);
        assert!(SpillReader::<u64>::open(dir.level_path(0)).is_err());
    }
}
