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

//! Pure composition of [`ProcessingConfig`] values.
//!
//! Every function here is a pure function from inputs to a fresh config:
//! base table keyed by tier, then device-class overrides, then mode
//! overrides, applied in that fixed order. The runtime adaptation helpers
//! follow the same rule and return new values; nothing in this module
//! mutates a config in place or touches shared state.

use aperture_core::{CameraClass, Capabilities, Mode, PerformanceSample, ProcessingConfig, Tier};

/// Battery fraction below which the builder forces conservative settings.
const BATTERY_CONSERVATIVE_LEVEL: f32 = 0.30;
/// Battery fraction below which runtime adaptation goes to the floor.
const BATTERY_CRITICAL_LEVEL: f32 = 0.20;
/// Battery fraction below which runtime adaptation reduces mildly.
const BATTERY_REDUCED_LEVEL: f32 = 0.50;
/// Minimum core count for the `Quality` mode override to be honored.
const QUALITY_MIN_CORES: usize = 6;
/// Upper bound on the frame-skip ratio adaptation can reach.
const MAX_SKIP_RATIO: u32 = 4;
/// Upper bound on the sampling interval; repeated adaptation converges here
/// instead of stretching without limit.
const MAX_SAMPLING_INTERVAL_MS: u64 = 2000;

/// Builds and adapts processing configs. Stateless; all methods are
/// associated functions.
pub struct TierConfigBuilder;

impl TierConfigBuilder {
    /// Composes the config for `tier` under `mode` on the given device.
    ///
    /// Composition order is fixed: tier base table, then device-class
    /// overrides (camera clamp, mobile clamp, battery/low-power guard),
    /// then mode overrides. Inactive tiers always yield the disabled
    /// config, regardless of mode.
    pub fn build(caps: &Capabilities, tier: Tier, mode: Mode) -> ProcessingConfig {
        if !tier.is_active() {
            return ProcessingConfig::disabled();
        }

        let mut config = Self::base_for(tier);
        Self::apply_device_overrides(&mut config, caps);
        Self::apply_mode_overrides(&mut config, caps, mode);

        log::debug!(
            "TierConfigBuilder: built {tier}/{} -> {}ms interval, {}x{}@{}fps, conc {}.",
            mode.as_str(),
            config.sampling_interval_ms,
            config.capture_width,
            config.capture_height,
            config.capture_fps,
            config.max_concurrent
        );
        config
    }

    /// The per-tier base table.
    fn base_for(tier: Tier) -> ProcessingConfig {
        match tier {
            Tier::Basic => ProcessingConfig {
                enabled: true,
                sampling_interval_ms: 200,
                frame_skip_ratio: 2,
                max_concurrent: 1,
                capture_width: 640,
                capture_height: 480,
                capture_fps: 15,
                power_saving: false,
            },
            Tier::Standard => ProcessingConfig {
                enabled: true,
                sampling_interval_ms: 100,
                frame_skip_ratio: 1,
                max_concurrent: 2,
                capture_width: 1280,
                capture_height: 720,
                capture_fps: 24,
                power_saving: false,
            },
            Tier::Premium => ProcessingConfig {
                enabled: true,
                sampling_interval_ms: 66,
                frame_skip_ratio: 0,
                max_concurrent: 3,
                capture_width: 1920,
                capture_height: 1080,
                capture_fps: 30,
                power_saving: false,
            },
            Tier::None | Tier::Loading => ProcessingConfig::disabled(),
        }
    }

    fn apply_device_overrides(config: &mut ProcessingConfig, caps: &Capabilities) {
        // The camera cannot deliver more than its negotiated class.
        let (cam_w, cam_h) = match caps.camera {
            CameraClass::High => (1920, 1080),
            CameraClass::Medium => (1280, 720),
            CameraClass::Low | CameraClass::None => (640, 480),
        };
        config.capture_width = config.capture_width.min(cam_w);
        config.capture_height = config.capture_height.min(cam_h);

        if caps.is_mobile {
            config.capture_width = config.capture_width.min(1280);
            config.capture_height = config.capture_height.min(720);
            config.capture_fps = config.capture_fps.min(24);
            config.power_saving = true;
        }

        let battery_low = caps
            .battery_level
            .is_some_and(|level| level < BATTERY_CONSERVATIVE_LEVEL);
        if caps.is_low_power_mode || battery_low {
            config.sampling_interval_ms = config.sampling_interval_ms.saturating_mul(2);
            config.max_concurrent = 1;
            config.power_saving = true;
        }
    }

    fn apply_mode_overrides(config: &mut ProcessingConfig, caps: &Capabilities, mode: Mode) {
        match mode {
            Mode::Auto => {}
            Mode::Performance => {
                // An absolute floor profile. Fields are overwritten, not
                // adjusted, so neither device class nor battery state can
                // leak through: the same capabilities-independent config
                // comes out for every device.
                config.sampling_interval_ms = 200;
                config.frame_skip_ratio = 2;
                config.max_concurrent = 1;
                config.capture_width = 640;
                config.capture_height = 480;
                config.capture_fps = 15;
                config.power_saving = true;
            }
            Mode::Quality => {
                if caps.logical_cores >= QUALITY_MIN_CORES && !caps.is_low_power_mode {
                    config.sampling_interval_ms =
                        ((config.sampling_interval_ms as f32) * 0.8) as u64;
                    config.frame_skip_ratio = 0;
                } else {
                    log::debug!(
                        "TierConfigBuilder: quality mode requested but capability is \
                         below threshold, keeping tier defaults."
                    );
                }
            }
        }
    }

    /// Returns a more conservative config when the sample shows stress
    /// (cpu above 80% or more than 10 dropped frames in the window), else a
    /// plain clone.
    pub fn adapt_for_performance(
        config: &ProcessingConfig,
        sample: &PerformanceSample,
    ) -> ProcessingConfig {
        let mut adapted = config.clone();
        if !config.enabled {
            return adapted;
        }

        if sample.cpu_pct > 80.0 || sample.dropped_frames > 10 {
            adapted.sampling_interval_ms = (((adapted.sampling_interval_ms as f32) * 1.5) as u64)
                .min(MAX_SAMPLING_INTERVAL_MS);
            adapted.frame_skip_ratio = (adapted.frame_skip_ratio + 1).min(MAX_SKIP_RATIO);
            log::info!(
                "TierConfigBuilder: performance adaptation (cpu {:.0}%, {} drops) -> \
                 interval {}ms, skip {}.",
                sample.cpu_pct,
                sample.dropped_frames,
                adapted.sampling_interval_ms,
                adapted.frame_skip_ratio
            );
        }
        adapted
    }

    /// Returns a battery-conserving config: the floor below 20% charge, a
    /// milder reduction below 50%, unchanged otherwise.
    pub fn adapt_for_battery(config: &ProcessingConfig, battery_level: f32) -> ProcessingConfig {
        let mut adapted = config.clone();
        if !config.enabled {
            return adapted;
        }

        if battery_level < BATTERY_CRITICAL_LEVEL {
            adapted.sampling_interval_ms = adapted
                .sampling_interval_ms
                .saturating_mul(3)
                .min(MAX_SAMPLING_INTERVAL_MS);
            adapted.frame_skip_ratio = (adapted.frame_skip_ratio + 2).min(MAX_SKIP_RATIO);
            adapted.max_concurrent = 1;
            adapted.power_saving = true;
        } else if battery_level < BATTERY_REDUCED_LEVEL {
            adapted.sampling_interval_ms = (((adapted.sampling_interval_ms as f32) * 1.5) as u64)
                .min(MAX_SAMPLING_INTERVAL_MS);
            adapted.frame_skip_ratio = (adapted.frame_skip_ratio + 1).min(MAX_SKIP_RATIO);
            adapted.power_saving = true;
        }
        adapted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desktop_caps() -> Capabilities {
        Capabilities {
            logical_cores: 8,
            gpu_acceleration: true,
            parallel_execution: true,
            camera: CameraClass::High,
            battery_level: None,
            is_mobile: false,
            is_low_power_mode: false,
        }
    }

    fn mobile_caps() -> Capabilities {
        Capabilities {
            logical_cores: 6,
            gpu_acceleration: true,
            parallel_execution: true,
            camera: CameraClass::High,
            battery_level: Some(0.8),
            is_mobile: true,
            is_low_power_mode: false,
        }
    }

    #[test]
    fn test_base_table_per_tier() {
        let caps = desktop_caps();
        let basic = TierConfigBuilder::build(&caps, Tier::Basic, Mode::Auto);
        let standard = TierConfigBuilder::build(&caps, Tier::Standard, Mode::Auto);
        let premium = TierConfigBuilder::build(&caps, Tier::Premium, Mode::Auto);

        assert_eq!(basic.capture_width, 640);
        assert_eq!(standard.capture_width, 1280);
        assert_eq!(premium.capture_width, 1920);
        assert!(basic.sampling_interval_ms > standard.sampling_interval_ms);
        assert!(standard.sampling_interval_ms > premium.sampling_interval_ms);
        assert_eq!(premium.max_concurrent, 3);
    }

    #[test]
    fn test_inactive_tiers_are_disabled() {
        let caps = desktop_caps();
        assert!(!TierConfigBuilder::build(&caps, Tier::None, Mode::Auto).enabled);
        assert!(!TierConfigBuilder::build(&caps, Tier::Loading, Mode::Quality).enabled);
    }

    #[test]
    fn test_build_is_pure() {
        let caps = desktop_caps();
        let a = TierConfigBuilder::build(&caps, Tier::Standard, Mode::Auto);
        let b = TierConfigBuilder::build(&caps, Tier::Standard, Mode::Auto);
        assert_eq!(a, b);
    }

    #[test]
    fn test_mobile_clamps_resolution_and_forces_power_saving() {
        let config = TierConfigBuilder::build(&mobile_caps(), Tier::Premium, Mode::Auto);
        assert!(config.capture_width <= 1280);
        assert!(config.capture_height <= 720);
        assert!(config.capture_fps <= 24);
        assert!(config.power_saving);
    }

    #[test]
    fn test_camera_class_clamps_capture() {
        let caps = Capabilities {
            camera: CameraClass::Low,
            ..desktop_caps()
        };
        let config = TierConfigBuilder::build(&caps, Tier::Premium, Mode::Auto);
        assert!(config.capture_width <= 640);
        assert!(config.capture_height <= 480);
    }

    #[test]
    fn test_low_battery_stretches_interval_and_single_worker() {
        let caps = Capabilities {
            battery_level: Some(0.2),
            ..desktop_caps()
        };
        let base = TierConfigBuilder::build(&desktop_caps(), Tier::Standard, Mode::Auto);
        let low = TierConfigBuilder::build(&caps, Tier::Standard, Mode::Auto);
        assert_eq!(low.sampling_interval_ms, base.sampling_interval_ms * 2);
        assert_eq!(low.max_concurrent, 1);
        assert!(low.power_saving);
    }

    #[test]
    fn test_performance_mode_forces_conservative_profile() {
        let config = TierConfigBuilder::build(&desktop_caps(), Tier::Premium, Mode::Performance);
        assert!(config.sampling_interval_ms >= 200);
        assert_eq!(config.max_concurrent, 1);
        assert!(config.power_saving);
        assert!(config.frame_skip_ratio >= 1);
    }

    #[test]
    fn test_performance_profile_is_capability_independent() {
        let reference = TierConfigBuilder::build(&desktop_caps(), Tier::Basic, Mode::Performance);

        // Every capability axis that feeds the device overrides: compute,
        // power state, battery, camera class, form factor. None may change
        // the performance-mode output.
        let variants = [
            Capabilities {
                logical_cores: 1,
                gpu_acceleration: false,
                parallel_execution: false,
                ..desktop_caps()
            },
            Capabilities {
                is_low_power_mode: true,
                ..desktop_caps()
            },
            Capabilities {
                battery_level: Some(0.1),
                ..desktop_caps()
            },
            Capabilities {
                camera: CameraClass::Low,
                ..desktop_caps()
            },
            mobile_caps(),
        ];
        for caps in variants {
            assert_eq!(
                TierConfigBuilder::build(&caps, Tier::Basic, Mode::Performance),
                reference,
                "performance profile leaked capability state for {caps:?}"
            );
        }
    }

    #[test]
    fn test_performance_profile_geometry_independent_of_tier_and_camera() {
        // Even premium on a high-end camera gets the conservative capture.
        for tier in [Tier::Basic, Tier::Standard, Tier::Premium] {
            for camera in [CameraClass::Low, CameraClass::High] {
                let caps = Capabilities {
                    camera,
                    ..desktop_caps()
                };
                let config = TierConfigBuilder::build(&caps, tier, Mode::Performance);
                assert_eq!((config.capture_width, config.capture_height), (640, 480));
                assert_eq!(config.sampling_interval_ms, 200);
            }
        }
    }

    #[test]
    fn test_quality_mode_needs_capability_headroom() {
        let strong = TierConfigBuilder::build(&desktop_caps(), Tier::Standard, Mode::Quality);
        assert_eq!(strong.frame_skip_ratio, 0);
        assert!(strong.sampling_interval_ms < 100);

        let weak_caps = Capabilities {
            logical_cores: 4,
            ..desktop_caps()
        };
        let weak = TierConfigBuilder::build(&weak_caps, Tier::Standard, Mode::Quality);
        let auto = TierConfigBuilder::build(&weak_caps, Tier::Standard, Mode::Auto);
        assert_eq!(weak, auto, "quality must silently fall back to tier defaults");
    }

    #[test]
    fn test_adapt_for_performance_under_stress() {
        let base = TierConfigBuilder::build(&desktop_caps(), Tier::Standard, Mode::Auto);
        let stressed = PerformanceSample {
            cpu_pct: 92.0,
            ..Default::default()
        };
        let adapted = TierConfigBuilder::adapt_for_performance(&base, &stressed);
        assert!(adapted.sampling_interval_ms > base.sampling_interval_ms);
        assert!(adapted.frame_skip_ratio > base.frame_skip_ratio);
        // The input is untouched.
        assert_eq!(base.sampling_interval_ms, 100);
    }

    #[test]
    fn test_adapt_for_performance_healthy_is_identity() {
        let base = TierConfigBuilder::build(&desktop_caps(), Tier::Standard, Mode::Auto);
        let healthy = PerformanceSample {
            cpu_pct: 20.0,
            dropped_frames: 0,
            ..Default::default()
        };
        assert_eq!(TierConfigBuilder::adapt_for_performance(&base, &healthy), base);
    }

    #[test]
    fn test_adapt_for_battery_tiers() {
        let base = TierConfigBuilder::build(&desktop_caps(), Tier::Standard, Mode::Auto);

        let critical = TierConfigBuilder::adapt_for_battery(&base, 0.1);
        assert_eq!(critical.sampling_interval_ms, base.sampling_interval_ms * 3);
        assert_eq!(critical.max_concurrent, 1);
        assert!(critical.power_saving);

        let reduced = TierConfigBuilder::adapt_for_battery(&base, 0.4);
        assert!(reduced.sampling_interval_ms > base.sampling_interval_ms);
        assert!(reduced.sampling_interval_ms < critical.sampling_interval_ms);

        let full = TierConfigBuilder::adapt_for_battery(&base, 0.9);
        assert_eq!(full, base);
    }

    #[test]
    fn test_skip_ratio_is_capped() {
        let base = TierConfigBuilder::build(&desktop_caps(), Tier::Basic, Mode::Auto);
        let stressed = PerformanceSample {
            cpu_pct: 95.0,
            dropped_frames: 50,
            ..Default::default()
        };
        let mut adapted = base;
        for _ in 0..10 {
            adapted = TierConfigBuilder::adapt_for_performance(&adapted, &stressed);
        }
        assert!(adapted.frame_skip_ratio <= MAX_SKIP_RATIO);
    }
}
