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

//! The error taxonomy for the vision pipeline.
//!
//! Internal, expected degradations (dropped frame, cache miss, probe
//! sub-failure) are handled locally and never reach the caller as errors.
//! Everything that does cross the API boundary is a [`VisionError`] carrying
//! a machine-readable code, an optional tier hint, and a recoverable flag so
//! the host can decide between retrying and falling back to no-vision
//! operation.

use crate::capability::Tier;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Full capability detection failed (individual sub-probe failures
    /// degrade silently and do not produce this).
    CapabilityProbeFailed,
    /// No camera is present or the stream could not be opened.
    CameraUnavailable,
    /// The host denied camera access.
    CameraPermissionDenied,
    /// Feature extraction failed for a frame.
    ExtractionFailed,
    /// An operation that requires `initialize` was called before it.
    NotInitialized,
    /// An operation was attempted on a disposed component.
    AlreadyDisposed,
    /// A subscriber callback panicked and was isolated.
    SubscriberPanicked,
    /// A configuration was rejected as inconsistent.
    ConfigRejected,
}

/// A typed error crossing the pipeline's API boundary.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("[{code:?}] {message} (recoverable: {recoverable})")]
pub struct VisionError {
    pub code: ErrorCode,
    pub message: String,
    /// The tier active when the error occurred, if meaningful.
    pub tier: Option<Tier>,
    /// `false` means the host should fall back to no-vision operation
    /// rather than retrying.
    pub recoverable: bool,
}

impl VisionError {
    /// A recoverable error: the pipeline keeps running in degraded form.
    pub fn recoverable(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            tier: None,
            recoverable: true,
        }
    }

    /// A fatal error: the host should not silently retry.
    pub fn fatal(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            tier: None,
            recoverable: false,
        }
    }

    /// Attaches the tier that was active when the error occurred.
    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_constructor() {
        let err = VisionError::recoverable(ErrorCode::ExtractionFailed, "model missing");
        assert!(err.recoverable);
        assert_eq!(err.code, ErrorCode::ExtractionFailed);
        assert!(err.tier.is_none());
    }

    #[test]
    fn test_fatal_with_tier_hint() {
        let err = VisionError::fatal(ErrorCode::CameraUnavailable, "no device")
            .with_tier(Tier::Standard);
        assert!(!err.recoverable);
        assert_eq!(err.tier, Some(Tier::Standard));
    }

    #[test]
    fn test_display_carries_code_and_flag() {
        let err = VisionError::fatal(ErrorCode::NotInitialized, "start before initialize");
        let text = err.to_string();
        assert!(text.contains("NotInitialized"));
        assert!(text.contains("recoverable: false"));
    }
}
