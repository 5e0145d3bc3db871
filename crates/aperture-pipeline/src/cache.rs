// Copyright 2025 aperture contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Short-lived result caching keyed by frame content.
//!
//! Consecutive camera frames of a mostly-still subject are near-identical;
//! a cache hit within the TTL short-circuits feature extraction entirely.
//! Entries are swept on every insert and cleared unconditionally on tier
//! switch or disposal.

use ahash::RandomState;
use aperture_core::{FrameBuffer, FrameResult};
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};
use std::time::{Duration, Instant};

/// Number of pixel samples hashed into the content key.
const KEY_SAMPLE_POINTS: usize = 64;

/// Derives a cache key from frame dimensions and a sparse content sample.
///
/// The hasher is seeded with fixed keys so the same frame content always
/// maps to the same key within a process.
pub fn frame_key(frame: &FrameBuffer) -> u64 {
    let state = RandomState::with_seeds(
        0x4150_4552_5455_5245, // "APERTURE"
        0x6672_616d_655f_6b65,
        0x7920_7631_0000_0000,
        0x0000_0000_0000_0001,
    );
    let mut hasher = state.build_hasher();
    frame.width.hash(&mut hasher);
    frame.height.hash(&mut hasher);

    if !frame.data.is_empty() {
        let stride = (frame.data.len() / KEY_SAMPLE_POINTS).max(1);
        for chunk_start in (0..frame.data.len()).step_by(stride) {
            hasher.write_u8(frame.data[chunk_start]);
        }
    }
    hasher.finish()
}

#[derive(Debug, Clone)]
struct Entry {
    result: FrameResult,
    inserted_at: Instant,
}

/// A TTL cache of frame results plus the most recent result for use as a
/// provisional value while a background extraction is in flight.
#[derive(Debug)]
pub struct ResultCache {
    entries: HashMap<u64, Entry>,
    ttl: Duration,
    last_result: Option<FrameResult>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            last_result: None,
        }
    }

    /// Inserts a result, sweeping expired entries opportunistically.
    pub fn insert(&mut self, key: u64, result: FrameResult) {
        self.sweep();
        self.last_result = Some(result.clone());
        self.entries.insert(
            key,
            Entry {
                result,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Returns the cached result for `key` if it is still within the TTL.
    /// Expired entries are removed on access.
    pub fn get(&mut self, key: u64) -> Option<FrameResult> {
        match self.entries.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => Some(entry.result.clone()),
            Some(_) => {
                self.entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// The most recently inserted result, regardless of key or TTL. Used as
    /// the provisional value for worker-dispatched frames.
    pub fn latest(&self) -> Option<FrameResult> {
        self.last_result.clone()
    }

    /// Removes every expired entry.
    pub fn sweep(&mut self) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() <= ttl);
    }

    /// Sweeps and releases excess map capacity. Called from the periodic
    /// cleanup tick as best-effort memory reclamation.
    pub fn compact(&mut self) {
        self.sweep();
        self.entries.shrink_to_fit();
    }

    /// Unconditionally drops all entries and the provisional value.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_result = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
