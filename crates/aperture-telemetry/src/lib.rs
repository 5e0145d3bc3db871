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

//! Telemetry for the vision pipeline: one-shot device capability probing and
//! continuous performance sampling.
//!
//! "Probing" runs once at startup (with explicit refresh) and produces an
//! immutable [`aperture_core::Capabilities`] snapshot; "monitoring" actively
//! samples CPU/memory/frame-rate/battery on a fixed cadence while a session
//! runs and broadcasts [`aperture_core::PerformanceSample`]s to subscribers.

pub mod monitor;
pub mod probe;
pub mod stats;

pub use monitor::{MonitorConfig, MonitorHandle, PerformanceMonitor};
pub use probe::{determine_optimal_tier, CapabilityProbe, NullCameraProbe, SysinfoProbe};
pub use stats::RollingWindow;
