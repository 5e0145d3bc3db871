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

//! The concrete resource budget a processing strategy runs under.

use serde::{Deserialize, Serialize};

/// Concrete processing parameters derived from capability + tier + mode.
///
/// A `ProcessingConfig` is a value object: it is regenerated whole whenever
/// capability, tier, or mode changes, and the active scheduler receives a
/// full replacement rather than a partial patch. The adaptation helpers in
/// the control crate return new values and never mutate in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// `false` for the `None`/`Loading` tiers: no frames are admitted.
    pub enabled: bool,
    /// Target interval between accepted frames, in milliseconds.
    pub sampling_interval_ms: u64,
    /// Process one frame out of every `frame_skip_ratio + 1`.
    pub frame_skip_ratio: u32,
    /// Maximum frames allowed in flight at once.
    pub max_concurrent: u32,
    /// Requested capture width in pixels.
    pub capture_width: u32,
    /// Requested capture height in pixels.
    pub capture_height: u32,
    /// Requested capture frame rate.
    pub capture_fps: u32,
    /// Whether power-saving behavior (longer intervals, single worker) is on.
    pub power_saving: bool,
}

impl ProcessingConfig {
    /// A config with processing disabled, used for `Tier::None` and
    /// `Tier::Loading`.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            sampling_interval_ms: u64::MAX,
            frame_skip_ratio: 0,
            max_concurrent: 0,
            capture_width: 0,
            capture_height: 0,
            capture_fps: 0,
            power_saving: true,
        }
    }

    /// Target frames per second implied by the sampling interval.
    pub fn target_fps(&self) -> f32 {
        if !self.enabled || self.sampling_interval_ms == 0 {
            return 0.0;
        }
        1000.0 / self.sampling_interval_ms as f32
    }
}
