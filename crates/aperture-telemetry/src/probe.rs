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

//! One-shot device capability detection.
//!
//! Detection runs each sub-probe independently, in a fixed order: core count,
//! GPU/parallel-execution support, camera capability, battery/power state,
//! then the mobile form-factor heuristic. A failing sub-probe degrades its
//! field to a conservative default and logs a warning; it never fails the
//! whole detection.

use aperture_core::{
    CameraClass, CameraProbe, Capabilities, ErrorCode, HardwareProbe, Tier, VisionError,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use sysinfo::System;

/// A hardware probe backed by the `sysinfo` crate.
///
/// Signals sysinfo cannot observe (GPU acceleration, battery, low-power
/// mode) report `None`; hosts with platform knowledge wrap this probe and
/// fill those in.
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareProbe for SysinfoProbe {
    fn logical_cores(&self) -> Option<usize> {
        let system = self.system.lock().ok()?;
        let count = system.cpus().len();
        (count > 0).then_some(count)
    }

    fn gpu_acceleration(&self) -> Option<bool> {
        None
    }

    fn parallel_execution(&self) -> Option<bool> {
        // Worker offload is worthwhile whenever more than one core exists.
        self.logical_cores().map(|cores| cores > 1)
    }

    fn battery_level(&self) -> Option<f32> {
        None
    }

    fn low_power_mode(&self) -> Option<bool> {
        None
    }

    fn mobile_form_factor(&self) -> Option<bool> {
        None
    }

    fn discharge_rate_pct(&self) -> Option<f32> {
        None
    }
}

/// A camera probe for hosts without a camera, and for tests.
pub struct NullCameraProbe;

impl CameraProbe for NullCameraProbe {
    fn probe(&self) -> Result<CameraClass, VisionError> {
        Ok(CameraClass::None)
    }
}

/// Detects device capabilities once and memoizes the result.
///
/// `detect` returns the memoized snapshot after the first success;
/// `refresh` forces re-detection (e.g. after a power-state change) and
/// returns a new snapshot without mutating any previously returned one.
pub struct CapabilityProbe {
    hardware: Arc<dyn HardwareProbe>,
    camera: Arc<dyn CameraProbe>,
    cached: Mutex<Option<Capabilities>>,
}

impl CapabilityProbe {
    pub fn new(hardware: Arc<dyn HardwareProbe>, camera: Arc<dyn CameraProbe>) -> Self {
        Self {
            hardware,
            camera,
            cached: Mutex::new(None),
        }
    }

    /// The hardware probe this detector wraps, shared with components that
    /// need live readings (battery, discharge rate) after detection.
    pub fn hardware(&self) -> Arc<dyn HardwareProbe> {
        Arc::clone(&self.hardware)
    }

    /// Returns the memoized snapshot, running detection on first call.
    pub fn detect(&self) -> Result<Capabilities, VisionError> {
        if let Some(caps) = self.cached.lock().unwrap().clone() {
            return Ok(caps);
        }
        self.refresh()
    }

    /// Forces re-detection and replaces the memoized snapshot.
    pub fn refresh(&self) -> Result<Capabilities, VisionError> {
        let caps = self.run_detection()?;
        log::info!(
            "Capability probe: {} cores, gpu={}, parallel={}, camera={:?}, mobile={}, low_power={}",
            caps.logical_cores,
            caps.gpu_acceleration,
            caps.parallel_execution,
            caps.camera,
            caps.is_mobile,
            caps.is_low_power_mode
        );
        *self.cached.lock().unwrap() = Some(caps.clone());
        Ok(caps)
    }

    fn run_detection(&self) -> Result<Capabilities, VisionError> {
        let hardware = Arc::clone(&self.hardware);
        let camera = Arc::clone(&self.camera);

        // A panicking host probe must not poison the orchestrator; it is
        // the one case where detection as a whole fails.
        catch_unwind(AssertUnwindSafe(move || {
            let logical_cores = hardware.logical_cores().unwrap_or_else(|| {
                log::warn!("Capability probe: core count unavailable, assuming 1.");
                1
            });

            let gpu_acceleration = hardware.gpu_acceleration().unwrap_or_else(|| {
                log::warn!("Capability probe: GPU support unknown, assuming unsupported.");
                false
            });
            let parallel_execution = hardware.parallel_execution().unwrap_or_else(|| {
                log::warn!("Capability probe: parallel execution unknown, assuming unsupported.");
                false
            });

            // The camera probe opens and releases its own stream internally;
            // a failure here degrades to "no camera" rather than erroring.
            let camera_class = match camera.probe() {
                Ok(class) => class,
                Err(e) => {
                    log::warn!("Capability probe: camera probe failed ({e}), assuming none.");
                    CameraClass::None
                }
            };

            let battery_level = hardware.battery_level();
            let is_low_power_mode = hardware.low_power_mode().unwrap_or(false);
            let is_mobile = hardware.mobile_form_factor().unwrap_or(false);

            Capabilities {
                logical_cores,
                gpu_acceleration,
                parallel_execution,
                camera: camera_class,
                battery_level,
                is_mobile,
                is_low_power_mode,
            }
        }))
        .map_err(|_| {
            VisionError::fatal(
                ErrorCode::CapabilityProbeFailed,
                "capability detection panicked in a host probe",
            )
        })
    }
}

/// Maps a capability snapshot to the optimal tier.
///
/// Deterministic decision table, evaluated top to bottom, first match wins.
/// Low-power mode overrides everything else; the remaining rows trade core
/// count, GPU support, and form factor against each other.
pub fn determine_optimal_tier(caps: &Capabilities) -> Tier {
    if caps.is_low_power_mode {
        return Tier::Basic;
    }
    if caps.logical_cores >= 8 && caps.gpu_acceleration && caps.parallel_execution && !caps.is_mobile
    {
        return Tier::Premium;
    }
    if caps.logical_cores >= 6 && caps.gpu_acceleration && caps.parallel_execution && caps.is_mobile
    {
        return Tier::Premium;
    }
    if caps.logical_cores >= 4 && caps.parallel_execution {
        return Tier::Standard;
    }
    Tier::Basic
}
