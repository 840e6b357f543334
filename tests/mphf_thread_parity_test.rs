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

//! The key regression test for atomic collision detection: builds must be
//! bit-for-bit reproducible no matter how many workers raced over the level
//! bit arrays. A weakened memory ordering in the test-and-set path shows up
//! here as diverging serializations.

mod common;

use common::KeyStream;
use mphash::mphf::Mphf;

fn test_keys(n: usize) -> Vec<u64> {
    let mut rng = KeyStream::seeded(42);
    (0..n).map(|_| rng.next_u64()).collect()
}

#[test]
fn test_builds_are_identical_across_thread_counts() {
    let keys = test_keys(20_000);

    let builds: Vec<(u32, Vec<u8>, Mphf<u64>)> = [1u32, 2, 4, 8]
        .into_iter()
        .map(|threads| {
            let phf = Mphf::builder()
                .gamma(1.0)
                .num_threads(threads)
                .build(&keys)
                .unwrap();
            let bytes = phf.serialize().unwrap();
            (threads, bytes, phf)
        })
        .collect();

    let (_, baseline_bytes, baseline) = &builds[0];
    for (threads, bytes, phf) in &builds[1..] {
        assert_eq!(
            bytes, baseline_bytes,
            "serialization with {threads} threads diverged from single-threaded build"
        );
        for key in &keys {
            assert_eq!(phf.lookup(key), baseline.lookup(key));
        }
    }
}

#[test]
fn test_thread_parity_with_fast_mode_disabled() {
    let keys = test_keys(10_000);

    let baseline = Mphf::builder()
        .gamma(2.0)
        .perc_elem_loaded(0.0)
        .num_threads(1)
        .build(&keys)
        .unwrap()
        .serialize()
        .unwrap();

    for threads in [2u32, 4] {
        let bytes = Mphf::builder()
            .gamma(2.0)
            .perc_elem_loaded(0.0)
            .num_threads(threads)
            .build(&keys)
            .unwrap()
            .serialize()
            .unwrap();
        assert_eq!(bytes, baseline);
    }
}

#[test]
fn test_thread_parity_with_spill_mode() {
    let keys = test_keys(10_000);

    let baseline = Mphf::builder()
        .gamma(1.0)
        .write_each_level(true)
        .num_threads(1)
        .build(&keys)
        .unwrap()
        .serialize()
        .unwrap();

    for threads in [2u32, 8] {
        let bytes = Mphf::builder()
            .gamma(1.0)
            .write_each_level(true)
            .num_threads(threads)
            .build(&keys)
            .unwrap()
            .serialize()
            .unwrap();
        assert_eq!(bytes, baseline);
    }
}
