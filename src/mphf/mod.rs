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

//! Minimal perfect hash function over a static key set.
//!
//! Construction cascades the keys through 25 geometrically shrinking bit
//! arrays: a key whose slot stays collision-free at some level is assigned
//! there, collided keys retry on the next level, and the residue surviving
//! every level goes into a small fallback map. Lookup walks the levels until
//! a set bit is found and turns the slot into a minimal index with a sampled
//! rank query.
//!
//! # Usage
//!
//! ```rust
//! use mphash::mphf::Mphf;
//!
//! let keys: Vec<u64> = (0..10_000).map(|i| i * 3).collect();
//! let phf = Mphf::builder().gamma(2.0).build(&keys).unwrap();
//!
//! assert!(phf.lookup(&30) < 10_000);
//! ```
//!
//! # Notes
//!
//! - The key set is fixed at build time; there is no insertion or deletion.
//! - Keys outside the construction set hash to an arbitrary in-range index
//!   or [`NOT_FOUND`]; no false-positive guarantee is made either way.
//! - Duplicate construction keys are the caller's responsibility.

mod builder;
mod key;
mod level;
mod sketch;
mod spill;

pub use self::builder::MphfBuilder;
pub use self::key::Key;
pub use self::sketch::Mphf;
pub use self::sketch::NOT_FOUND;

use std::collections::HashMap;

/// Keys are pulled from the shared source in batches of this size.
pub(crate) const BATCH_KEYS: usize = 10_000;

/// Fallback map for keys surviving every cascade level. Iteration order
/// never reaches the serialized form: indices are canonicalized after the
/// build and pairs are written sorted by index.
pub(crate) type FinalMap<K> = HashMap<K, u64>;
