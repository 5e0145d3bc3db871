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

//! Periodic performance telemetry produced by the monitor.

use serde::{Deserialize, Serialize};

/// Heuristic thermal bucket derived from CPU and battery-impact thresholds.
///
/// There is no reliable cross-platform thermal API; treat this as an
/// advisory signal, not guaranteed-accurate telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermalBucket {
    #[default]
    Nominal,
    Fair,
    Serious,
    Critical,
}

/// A read-only snapshot of system load, produced on a fixed cadence.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceSample {
    /// Estimated CPU utilization, 0-100.
    pub cpu_pct: f32,
    /// Estimated memory utilization, 0-100.
    pub memory_pct: f32,
    /// Frames recorded in the preceding window, per second.
    pub fps: f32,
    /// Dropped-frame count in the preceding window.
    pub dropped_frames: u32,
    /// Estimated battery impact, 0-100.
    pub battery_impact_pct: f32,
    /// Advisory thermal bucket.
    pub thermal: ThermalBucket,
}

impl PerformanceSample {
    /// `true` when this sample indicates the device is struggling enough
    /// that the pipeline should start shedding frames.
    pub fn is_poor(&self) -> bool {
        self.cpu_pct > 80.0 || self.dropped_frames > 10 || self.thermal >= ThermalBucket::Serious
    }

    /// Composite 0-100 health score driving tier-change and downscale
    /// decisions. Weighted penalty blend: CPU 30%, memory 20%, frame loss
    /// 30%, battery impact 20%; 100 is perfectly healthy.
    pub fn composite_score(&self) -> f32 {
        let frame_loss_pct = (self.dropped_frames as f32 * 5.0).min(100.0);
        let penalty = self.cpu_pct * 0.30
            + self.memory_pct * 0.20
            + frame_loss_pct * 0.30
            + self.battery_impact_pct * 0.20;
        (100.0 - penalty).clamp(0.0, 100.0)
    }
}
