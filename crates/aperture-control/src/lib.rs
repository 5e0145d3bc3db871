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

//! # Aperture Control
//!
//! The decision layer of the pipeline: tier selection, config composition,
//! tier-specific processing strategies, and the [`TierOrchestrator`] state
//! machine that wires capability probing, performance monitoring, and frame
//! scheduling into one closed adaptation loop.

pub mod builder;
pub mod orchestrator;
pub mod strategy;

pub use builder::TierConfigBuilder;
pub use orchestrator::{OrchestratorStats, SwitchReason, TierChange, TierOrchestrator};
pub use strategy::TierStrategy;
