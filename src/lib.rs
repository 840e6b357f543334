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

//! Minimal perfect hashing for static key sets.
//!
//! `mphash` builds a static map from `n` known keys onto exactly
//! `{0, ..., n-1}` using a cascade of collision-free bit arrays, following
//! the BBHash construction ("Fast and scalable minimal perfect hashing for
//! massive key sets", <https://arxiv.org/abs/1702.03154>). Typical storage
//! is a few bits per key; construction runs on multiple threads and the
//! finished function can be saved to and loaded from a portable
//! little-endian format.
//!
//! ```rust
//! use mphash::mphf::Mphf;
//!
//! let keys: Vec<u64> = (0..1_000).map(|i| i * 7).collect();
//! let phf = Mphf::builder().gamma(2.0).num_threads(2).build(&keys).unwrap();
//!
//! // every key gets a distinct index below 1000
//! assert!(phf.lookup(&21) < 1_000);
//!
//! let bytes = phf.serialize().unwrap();
//! let loaded = mphash::mphf::Mphf::<u64>::deserialize(&bytes).unwrap();
//! assert_eq!(loaded.lookup(&21), phf.lookup(&21));
//! ```

pub mod bitvec;
pub(crate) mod codec;
pub mod error;
pub mod hash;
pub mod mphf;
pub mod progress;
