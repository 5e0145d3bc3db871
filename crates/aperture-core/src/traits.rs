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

//! The seams between the pipeline and its host: hardware probing, camera
//! probing, frame supply, and feature extraction.
//!
//! Every probe method returns an `Option` with an explicit "unsupported"
//! meaning (`None`), never a maybe-present field: a failing or absent
//! platform API degrades the corresponding capability to a conservative
//! default instead of failing detection.

use crate::capability::{CameraClass, Tier};
use crate::config::ProcessingConfig;
use crate::error::VisionError;
use crate::frame::{FrameBuffer, FrameResult};
use serde::{Deserialize, Serialize};

/// Observes the physical state of the host platform.
///
/// Implementations are best-effort: `None` means "this platform does not
/// expose that signal", and the capability probe substitutes a conservative
/// default.
pub trait HardwareProbe: Send + Sync {
    /// Number of logical CPU cores, if detectable.
    fn logical_cores(&self) -> Option<usize>;
    /// Whether GPU acceleration is available to the pipeline.
    fn gpu_acceleration(&self) -> Option<bool>;
    /// Whether parallel (worker-offload) execution is available.
    fn parallel_execution(&self) -> Option<bool>;
    /// Battery charge in `0.0..=1.0`.
    fn battery_level(&self) -> Option<f32>;
    /// Whether the OS reports a low-power / battery-saver mode.
    fn low_power_mode(&self) -> Option<bool>;
    /// Whether the device is a mobile form factor.
    fn mobile_form_factor(&self) -> Option<bool>;
    /// Estimated battery discharge rate as percent-per-hour, when the
    /// platform exposes one. Used for the battery-impact estimate.
    fn discharge_rate_pct(&self) -> Option<f32>;
}

/// Negotiates camera capability by attempting a short probe capture.
///
/// Implementations must always release the probe stream before returning,
/// success or failure.
pub trait CameraProbe: Send + Sync {
    /// Attempts a capture at the highest requested resolution and reports
    /// the negotiated capability class.
    fn probe(&self) -> Result<CameraClass, VisionError>;
}

/// A live camera stream handle supplied by the host application.
///
/// The pipeline only reads frames; acquisition and permission flows belong
/// to the host. The handle is exclusively owned by the orchestrator for the
/// lifetime of a session.
pub trait VideoSource: Send {
    /// Pulls the next frame, or `None` when no frame is currently available.
    fn next_frame(&mut self) -> Option<FrameBuffer>;
    /// Releases the underlying capture handle. Must be idempotent.
    fn release(&mut self);
}

/// The opaque feature-extraction capability (e.g. a model-inference
/// runtime) called once per admitted frame.
pub trait FeatureExtractor: Send + Sync {
    /// Extracts tier-appropriate metrics from a frame.
    ///
    /// A recoverable failure (missing model) lets the strategy degrade to a
    /// heuristic fallback; it must never crash the pipeline.
    fn extract(&self, frame: &FrameBuffer, tier: Tier) -> Result<FrameResult, VisionError>;
}

/// Cumulative counters a processing strategy exposes for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub cache_hits: u64,
    pub fallback_results: u64,
}

/// A tier-specific processing strategy, selected and swapped by the
/// orchestrator.
///
/// Strategies are swapped whole on tier change: the orchestrator disposes
/// the old instance completely before constructing its successor, so no
/// state is ever shared across tiers.
pub trait ProcessingStrategy: Send {
    /// The tier this strategy implements.
    fn tier(&self) -> Tier;

    /// Offers one captured frame to the strategy. Returns a result when the
    /// frame was admitted (possibly a provisional cached value while a
    /// background worker finishes), or `None` when it was skipped.
    fn process_frame(&mut self, frame: FrameBuffer) -> Option<FrameResult>;

    /// Replaces the active config wholesale. Partial patches are not
    /// expressible by design.
    fn reconfigure(&mut self, config: ProcessingConfig);

    /// Current cumulative counters.
    fn stats(&self) -> StrategyStats;

    /// Stops timers, releases the worker, clears caches. Idempotent.
    fn dispose(&mut self);
}
