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

//! Bounded rolling-average storage for telemetry smoothing.

/// A fixed-size circular buffer of `f32` samples.
///
/// Used to smooth noisy point estimates (the synthetic CPU workload in
/// particular) over a bounded window; the oldest sample is overwritten once
/// the window is full.
#[derive(Debug, Clone)]
pub struct RollingWindow<const N: usize> {
    data: [f32; N],
    index: usize,
    count: usize,
}

impl<const N: usize> RollingWindow<N> {
    /// Creates a new, empty window.
    pub fn new() -> Self {
        Self {
            data: [0.0; N],
            index: 0,
            count: 0,
        }
    }

    /// Pushes a sample, overwriting the oldest if the window is full.
    pub fn push(&mut self, value: f32) {
        self.data[self.index] = value;
        self.index = (self.index + 1) % N;
        if self.count < N {
            self.count += 1;
        }
    }

    /// Number of samples currently held.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Arithmetic mean of the held samples, or 0.0 when empty.
    pub fn average(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        self.data[..self.count.min(N)].iter().sum::<f32>() / self.count as f32
    }

    /// The most recently pushed sample, or `None` when empty.
    pub fn last(&self) -> Option<f32> {
        if self.count == 0 {
            return None;
        }
        let last_index = (self.index + N - 1) % N;
        Some(self.data[last_index])
    }
}

impl<const N: usize> Default for RollingWindow<N> {
    fn default() -> Self {
        Self::new()
    }
}
