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

//! Frame data crossing the video-source and feature-extraction seams.

use crate::capability::Tier;
use serde::{Deserialize, Serialize};

/// A single captured frame, as handed in by the host's video source.
///
/// The pipeline treats the pixel data as an opaque single-channel (luma)
/// buffer; it only ever reads it for downscaling, cache keying, and feature
/// extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    /// Luma pixels, row-major, `width * height` bytes.
    pub data: Vec<u8>,
    /// Capture timestamp in milliseconds since an arbitrary epoch.
    pub timestamp_ms: u64,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>, timestamp_ms: u64) -> Self {
        debug_assert_eq!(data.len(), (width * height) as usize);
        Self {
            width,
            height,
            data,
            timestamp_ms,
        }
    }

    /// Nearest-neighbor downscale by `scale` (0 < scale <= 1), returning a
    /// new buffer. A scale of 1.0 returns a plain clone.
    pub fn scaled(&self, scale: f32) -> FrameBuffer {
        if scale >= 1.0 {
            return self.clone();
        }
        let new_w = ((self.width as f32 * scale) as u32).max(1);
        let new_h = ((self.height as f32 * scale) as u32).max(1);
        let mut data = Vec::with_capacity((new_w * new_h) as usize);
        for y in 0..new_h {
            let src_y = (y as f32 / scale) as u32;
            let src_y = src_y.min(self.height - 1);
            for x in 0..new_w {
                let src_x = ((x as f32 / scale) as u32).min(self.width - 1);
                data.push(self.data[(src_y * self.width + src_x) as usize]);
            }
        }
        FrameBuffer {
            width: new_w,
            height: new_h,
            data,
            timestamp_ms: self.timestamp_ms,
        }
    }
}

/// The output of processing one admitted frame.
///
/// The metric depth is tier-graded: `Basic` fills confidence, the face flag,
/// and movement; `Standard` adds posture; `Premium` adds the breathing-rate
/// estimate and landmark count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    /// Overall detection confidence, 0-1.
    pub confidence: f32,
    /// Whether a face was present in the frame.
    pub face_detected: bool,
    /// Posture quality score, 0-1. `None` below `Standard`.
    pub posture_score: Option<f32>,
    /// Inter-frame movement level, 0-1.
    pub movement_level: f32,
    /// Estimated breaths per minute. `None` below `Premium`.
    pub breathing_rate: Option<f32>,
    /// Number of landmarks the extractor produced.
    pub landmark_count: u32,
    /// Wall time spent processing this frame.
    pub processing_time_ms: f32,
    /// The tier whose strategy produced this result.
    pub tier: Tier,
}

impl FrameResult {
    /// An empty/degraded result for a frame that could not be processed.
    pub fn degraded(tier: Tier) -> Self {
        Self {
            confidence: 0.0,
            face_detected: false,
            posture_score: None,
            movement_level: 0.0,
            breathing_rate: None,
            landmark_count: 0,
            processing_time_ms: 0.0,
            tier,
        }
    }
}
