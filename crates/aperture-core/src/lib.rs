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

//! Foundational traits, core types, and interface contracts for the adaptive
//! vision-processing resource manager.
//!
//! This crate deliberately contains no I/O and no threads: it defines the
//! vocabulary (capability snapshots, tiers, configs, samples, frames) and the
//! seams (`VideoSource`, `FeatureExtractor`, `HardwareProbe`) that the
//! telemetry, pipeline, and control crates implement and wire together.

pub mod capability;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod sample;
pub mod traits;

pub use capability::{CameraClass, Capabilities, Mode, Tier};
pub use config::ProcessingConfig;
pub use dispatch::Dispatcher;
pub use error::{ErrorCode, VisionError};
pub use frame::{FrameBuffer, FrameResult};
pub use sample::{PerformanceSample, ThermalBucket};
pub use traits::{
    CameraProbe, FeatureExtractor, HardwareProbe, ProcessingStrategy, StrategyStats, VideoSource,
};
