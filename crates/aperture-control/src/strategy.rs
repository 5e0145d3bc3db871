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

//! Tier-specific processing strategies.
//!
//! A [`TierStrategy`] binds a scheduler to a feature extractor for exactly
//! one tier. It grades metric depth to the tier (Basic stops at the face
//! flag and movement, Standard adds posture, Premium adds breathing rate
//! and landmarks), records per-frame wall time, and substitutes a heuristic
//! result when the extractor fails recoverably — a missing model degrades
//! a frame's fidelity, never the session.
//!
//! Strategies are swapped whole on tier change; the orchestrator disposes
//! the old instance before constructing its successor.

use aperture_core::{
    FeatureExtractor, FrameBuffer, FrameResult, ProcessingConfig, ProcessingStrategy,
    StrategyStats, Tier,
};
use aperture_pipeline::{FrameScheduler, ProcessFn, SchedulerOptions};
use aperture_telemetry::MonitorHandle;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// One tier's processing pipeline: scheduler + extractor + fallback.
pub struct TierStrategy {
    tier: Tier,
    scheduler: FrameScheduler,
    fallbacks: Arc<AtomicU64>,
}

impl TierStrategy {
    pub fn new(
        tier: Tier,
        config: ProcessingConfig,
        extractor: Arc<dyn FeatureExtractor>,
        monitor: MonitorHandle,
        options: SchedulerOptions,
    ) -> Self {
        let fallbacks = Arc::new(AtomicU64::new(0));
        let process = build_process_fn(extractor, tier, Arc::clone(&fallbacks));
        let scheduler = FrameScheduler::new(config, tier, monitor, process, options);
        Self {
            tier,
            scheduler,
            fallbacks,
        }
    }
}

impl ProcessingStrategy for TierStrategy {
    fn tier(&self) -> Tier {
        self.tier
    }

    fn process_frame(&mut self, frame: FrameBuffer) -> Option<FrameResult> {
        self.scheduler.process_frame(frame)
    }

    fn reconfigure(&mut self, config: ProcessingConfig) {
        self.scheduler.reconfigure(config);
    }

    fn stats(&self) -> StrategyStats {
        StrategyStats {
            fallback_results: self.fallbacks.load(Ordering::Relaxed),
            ..self.scheduler.stats()
        }
    }

    fn dispose(&mut self) {
        self.scheduler.dispose();
    }
}

/// Wraps an extractor into the scheduler's process function: extraction,
/// tier grading, wall-time accounting, and the heuristic fallback path.
fn build_process_fn(
    extractor: Arc<dyn FeatureExtractor>,
    tier: Tier,
    fallbacks: Arc<AtomicU64>,
) -> ProcessFn {
    Arc::new(move |frame: &FrameBuffer| {
        let started = Instant::now();
        let mut result = match extractor.extract(frame, tier) {
            Ok(result) => result,
            Err(err) => {
                fallbacks.fetch_add(1, Ordering::Relaxed);
                log::warn!("TierStrategy({tier}): extraction failed ({err}), using heuristic fallback.");
                heuristic_fallback(frame, tier)
            }
        };
        grade_to_tier(&mut result, tier);
        result.processing_time_ms = started.elapsed().as_secs_f32() * 1000.0;
        result.tier = tier;
        result
    })
}

/// Strips metric fields the tier does not produce.
fn grade_to_tier(result: &mut FrameResult, tier: Tier) {
    if tier < Tier::Premium {
        result.breathing_rate = None;
        result.landmark_count = 0;
    }
    if tier < Tier::Standard {
        result.posture_score = None;
    }
}

/// Brightness-statistics fallback when no extractor result is available.
///
/// Mean luma in a plausible indoor range with non-trivial variance is taken
/// as weak evidence of a subject; variance doubles as a coarse movement
/// proxy. Confidence is capped low so hosts can tell fallback results from
/// real extractions.
fn heuristic_fallback(frame: &FrameBuffer, tier: Tier) -> FrameResult {
    let (mean, variance) = luma_stats(&frame.data);
    let subject_likely = (40.0..=220.0).contains(&mean) && variance > 100.0;

    FrameResult {
        confidence: if subject_likely { 0.3 } else { 0.1 },
        face_detected: subject_likely,
        // Neutral posture: the heuristic cannot judge alignment.
        posture_score: (tier >= Tier::Standard).then_some(0.5),
        movement_level: (variance / 4000.0).clamp(0.0, 1.0),
        breathing_rate: None,
        landmark_count: 0,
        processing_time_ms: 0.0,
        tier,
    }
}

/// Mean and variance over a sparse sample of the luma plane.
fn luma_stats(data: &[u8]) -> (f32, f32) {
    if data.is_empty() {
        return (0.0, 0.0);
    }
    let stride = (data.len() / 256).max(1);
    let samples: Vec<f32> = data.iter().step_by(stride).map(|&b| b as f32).collect();
    let n = samples.len() as f32;
    let mean = samples.iter().sum::<f32>() / n;
    let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    (mean, variance)
}
