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

//! The adaptive frame pipeline.
//!
//! [`FrameScheduler`] turns a continuous video source into a bounded stream
//! of frame results under the currently active processing config, while
//! keeping the foreground execution context free of blocking work: frame
//! admission (throttle/skip), performance-driven downscaling, a TTL result
//! cache, and optional background-worker offload over a bounded queue.

pub mod cache;
pub mod scheduler;
pub mod worker;

pub use cache::{frame_key, ResultCache};
pub use scheduler::{extraction_scale, FrameScheduler, SchedulerOptions};
pub use worker::{FrameWorker, ProcessFn};
