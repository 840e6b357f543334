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

//! Build progress reporting.
//!
//! Workers tick a per-thread counter with [`Progress::inc`]; aggregation
//! happens only when a reporting step is crossed, so the hot path is a single
//! relaxed add and no lock. Output goes to `tracing` rather than a terminal
//! bar, leaving rendering to the host application's subscriber.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tracing::debug;
use tracing::info;

/// Report roughly once per percent of total work.
const SUBDIVISIONS: u64 = 100;

/// Concurrent tick counter for a long-running build.
pub struct Progress {
    label: String,
    total: u64,
    step: u64,
    done_threaded: Vec<AtomicU64>,
    next_report: AtomicU64,
}

impl Progress {
    /// Starts tracking `total` ticks of work spread over `nthreads` workers.
    pub fn init(total: u64, label: &str, nthreads: u32) -> Self {
        let mut done_threaded = Vec::with_capacity(nthreads as usize);
        done_threaded.resize_with(nthreads as usize, || AtomicU64::new(0));
        let step = (total / SUBDIVISIONS).max(1);
        debug!(label, total, nthreads, "progress tracking started");
        Self {
            label: label.to_string(),
            total,
            step,
            done_threaded,
            next_report: AtomicU64::new(step),
        }
    }

    /// Records `ticks` units of work done by worker `tid`.
    ///
    /// Callable concurrently from any worker; `tid` out of range is ignored,
    /// matching the tolerant contract of the reporting collaborator.
    pub fn inc(&self, ticks: u64, tid: u32) {
        let Some(counter) = self.done_threaded.get(tid as usize) else {
            return;
        };
        counter.fetch_add(ticks, Ordering::Relaxed);

        let done = self.done();
        let threshold = self.next_report.load(Ordering::Relaxed);
        if done >= threshold
            && self
                .next_report
                .compare_exchange(threshold, done + self.step, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            let percent = if self.total == 0 {
                100.0
            } else {
                100.0 * done as f64 / self.total as f64
            };
            debug!(label = %self.label, done, total = self.total, percent, "progress");
        }
    }

    /// Emits the final aggregate once all workers have joined.
    pub fn finish_threaded(&self) {
        info!(label = %self.label, done = self.done(), total = self.total, "progress finished");
    }

    fn done(&self) -> u64 {
        self.done_threaded
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .sum()
    }
}
