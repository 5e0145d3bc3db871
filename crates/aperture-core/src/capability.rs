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

//! Device capability snapshots and the tier/mode vocabulary.

use serde::{Deserialize, Serialize};

/// Negotiated camera capability class, from "no camera at all" upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraClass {
    /// No camera, or the camera probe failed.
    #[default]
    None,
    /// Up to roughly 640x480.
    Low,
    /// Up to roughly 1280x720.
    Medium,
    /// 1920x1080 or better.
    High,
}

/// An immutable snapshot of detected device characteristics.
///
/// Snapshots are captured once at startup and may be explicitly refreshed
/// (e.g. after a power-state change), producing a *new* snapshot. A snapshot
/// handed to another component is never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Number of logical CPU cores.
    pub logical_cores: usize,
    /// Whether GPU acceleration is available to the vision pipeline.
    pub gpu_acceleration: bool,
    /// Whether parallel bytecode execution (worker offload) is available.
    pub parallel_execution: bool,
    /// Best camera capability observed by the probe.
    pub camera: CameraClass,
    /// Battery level in `0.0..=1.0`, or `None` when the platform exposes none.
    pub battery_level: Option<f32>,
    /// Heuristic mobile form-factor flag.
    pub is_mobile: bool,
    /// Whether the OS reports a low-power / battery-saver mode.
    pub is_low_power_mode: bool,
}

impl Capabilities {
    /// The most conservative snapshot: assumed when every probe fails.
    pub fn fallback() -> Self {
        Self {
            logical_cores: 1,
            gpu_acceleration: false,
            parallel_execution: false,
            camera: CameraClass::None,
            battery_level: None,
            is_mobile: false,
            is_low_power_mode: false,
        }
    }
}

/// Discrete quality/cost level of the vision pipeline.
///
/// The variant order defines the upgrade/downgrade ordering used by the
/// orchestrator: `Loading < None < Basic < Standard < Premium`. `Loading` is
/// a transient state before the first successful initialization and never
/// participates in tier comparisons.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Not yet initialized.
    #[default]
    Loading,
    /// Vision processing disabled (initialization failed or explicitly off).
    None,
    /// Minimal processing: low resolution, low sampling rate.
    Basic,
    /// Balanced processing for mid-range devices.
    Standard,
    /// Full processing for high-end devices.
    Premium,
}

impl Tier {
    /// `true` for the tiers that actually run frame processing.
    pub fn is_active(&self) -> bool {
        matches!(self, Tier::Basic | Tier::Standard | Tier::Premium)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Loading => "loading",
            Tier::None => "none",
            Tier::Basic => "basic",
            Tier::Standard => "standard",
            Tier::Premium => "premium",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User/operator override of the automatic tier-selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Pin tier selection toward `Basic` regardless of capability.
    Performance,
    /// Let capability detection decide.
    #[default]
    Auto,
    /// Prefer quality settings; only honored when capability exceeds a
    /// minimum threshold, else silently falls back to tier defaults.
    Quality,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Performance => "performance",
            Mode::Auto => "auto",
            Mode::Quality => "quality",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering_for_upgrade_comparisons() {
        assert!(Tier::Basic < Tier::Standard);
        assert!(Tier::Standard < Tier::Premium);
        assert!(Tier::None < Tier::Basic);
        assert!(Tier::Loading < Tier::None);
    }

    #[test]
    fn test_active_tiers() {
        assert!(!Tier::Loading.is_active());
        assert!(!Tier::None.is_active());
        assert!(Tier::Basic.is_active());
        assert!(Tier::Premium.is_active());
    }

    #[test]
    fn test_camera_class_ordering() {
        assert!(CameraClass::None < CameraClass::Low);
        assert!(CameraClass::Medium < CameraClass::High);
    }

    #[test]
    fn test_fallback_snapshot_is_conservative() {
        let caps = Capabilities::fallback();
        assert_eq!(caps.logical_cores, 1);
        assert!(!caps.gpu_acceleration);
        assert!(!caps.parallel_execution);
        assert_eq!(caps.camera, CameraClass::None);
    }

    #[test]
    fn test_tier_serde_round_trip() {
        let json = serde_json::to_string(&Tier::Premium).unwrap();
        assert_eq!(json, "\"premium\"");
        let tier: Tier = serde_json::from_str(&json).unwrap();
        assert_eq!(tier, Tier::Premium);
    }
}
