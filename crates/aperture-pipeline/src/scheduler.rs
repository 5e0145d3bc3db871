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

//! Per-frame admission, downscaling, caching, and dispatch.
//!
//! The scheduler is the hot path of the pipeline. For every incoming frame
//! it decides, in order: skip (throttle / skip ratio / poor-performance
//! shedding), downscale (ladder keyed on the composite performance score),
//! cache lookup (content-derived key, TTL), and finally dispatch — to the
//! background worker with an immediately returned provisional result, or
//! inline with a cooperative yield between frames.
//!
//! Scheduler state is entirely private. A tier switch disposes the whole
//! instance and constructs a fresh one; nothing is reused across tiers.

use crate::cache::{frame_key, ResultCache};
use crate::worker::{FrameWorker, ProcessFn};
use aperture_core::{FrameBuffer, FrameResult, ProcessingConfig, StrategyStats, Tier};
use aperture_telemetry::MonitorHandle;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Performance-based shedding never skips more than this many frames in a
/// row, so the pipeline is not starved entirely under sustained load.
const MAX_CONSECUTIVE_PERF_SKIPS: u32 = 3;

/// Chooses the extraction scale from the composite performance score.
/// Lower score means a smaller extraction.
pub fn extraction_scale(score: f32) -> f32 {
    if score >= 90.0 {
        1.0
    } else if score >= 70.0 {
        0.8
    } else if score >= 50.0 {
        0.6
    } else if score >= 30.0 {
        0.4
    } else {
        0.25
    }
}

/// Construction options; defaults match production behavior, tests shorten
/// the intervals.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Whether a background execution context is available for offload.
    pub use_worker: bool,
    /// Result-cache time to live.
    pub cache_ttl: Duration,
    /// Cadence of the periodic cleanup tick.
    pub cleanup_interval: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            use_worker: true,
            cache_ttl: Duration::from_millis(1500),
            cleanup_interval: Duration::from_secs(30),
        }
    }
}

/// Turns a continuous frame feed into a bounded stream of results under the
/// active [`ProcessingConfig`].
pub struct FrameScheduler {
    config: ProcessingConfig,
    tier: Tier,
    monitor: MonitorHandle,
    process: ProcessFn,
    cache: Arc<Mutex<ResultCache>>,
    worker: Option<FrameWorker>,
    cleanup_stop: Option<Sender<()>>,
    cleanup_handle: Option<thread::JoinHandle<()>>,
    last_accepted: Option<Instant>,
    consecutive_perf_skips: u32,
    frame_counter: u64,
    frames_processed: u64,
    frames_skipped: u64,
    cache_hits: u64,
    disposed: bool,
}

impl FrameScheduler {
    pub fn new(
        config: ProcessingConfig,
        tier: Tier,
        monitor: MonitorHandle,
        process: ProcessFn,
        options: SchedulerOptions,
    ) -> Self {
        let cache = Arc::new(Mutex::new(ResultCache::new(options.cache_ttl)));
        monitor.set_target_fps(config.target_fps());

        let worker = options
            .use_worker
            .then(|| FrameWorker::spawn(Arc::clone(&process)));

        let (cleanup_stop, cleanup_handle) =
            spawn_cleanup_tick(Arc::clone(&cache), worker.as_ref(), options.cleanup_interval);

        Self {
            config,
            tier,
            monitor,
            process,
            cache,
            worker,
            cleanup_stop: Some(cleanup_stop),
            cleanup_handle: Some(cleanup_handle),
            last_accepted: None,
            consecutive_perf_skips: 0,
            frame_counter: 0,
            frames_processed: 0,
            frames_skipped: 0,
            cache_hits: 0,
            disposed: false,
        }
    }

    /// Offers one captured frame. Returns `None` for skipped frames, the
    /// cached/fresh result for inline processing, or a provisional value
    /// while the background worker finishes.
    pub fn process_frame(&mut self, frame: FrameBuffer) -> Option<FrameResult> {
        if self.disposed || !self.config.enabled {
            return None;
        }

        self.absorb_worker_results();
        self.frame_counter += 1;

        // 1. Skip decisions: throttle, then skip ratio, then shedding.
        let now = Instant::now();
        if let Some(last) = self.last_accepted {
            if now.duration_since(last) < Duration::from_millis(self.config.sampling_interval_ms) {
                self.frames_skipped += 1;
                return None;
            }
        }

        let stride = self.config.frame_skip_ratio as u64 + 1;
        if stride > 1 && self.frame_counter % stride != 0 {
            self.frames_skipped += 1;
            return None;
        }

        let sample = self.monitor.latest_sample();
        if sample.is_poor() && self.consecutive_perf_skips < MAX_CONSECUTIVE_PERF_SKIPS {
            self.consecutive_perf_skips += 1;
            self.frames_skipped += 1;
            return None;
        }
        self.consecutive_perf_skips = 0;
        self.last_accepted = Some(now);

        // 2. Extraction scale from the current performance score.
        let scale = extraction_scale(sample.composite_score());
        let scaled = frame.scaled(scale);

        // 3. Cache lookup short-circuits extraction entirely.
        let key = frame_key(&scaled);
        if let Some(hit) = self.cache.lock().unwrap().get(key) {
            self.cache_hits += 1;
            self.monitor.record_frame();
            return Some(hit);
        }

        // 4. Dispatch.
        self.monitor.record_frame();
        match &self.worker {
            Some(worker) => {
                if worker.submit(key, scaled) {
                    self.monitor.record_dropped_frame();
                }
                let provisional = self
                    .cache
                    .lock()
                    .unwrap()
                    .latest()
                    .unwrap_or_else(|| FrameResult::degraded(self.tier));
                Some(provisional)
            }
            None => {
                let result = (self.process)(&scaled);
                self.cache.lock().unwrap().insert(key, result.clone());
                self.frames_processed += 1;
                // Inline processing stays cooperative: give the foreground
                // context a chance to run between frames.
                thread::yield_now();
                Some(result)
            }
        }
    }

    /// Pulls completed background results into the cache.
    fn absorb_worker_results(&mut self) {
        let Some(worker) = &self.worker else {
            return;
        };
        let results = worker.drain_results();
        if results.is_empty() {
            return;
        }
        let mut cache = self.cache.lock().unwrap();
        for (key, result) in results {
            self.frames_processed += 1;
            cache.insert(key, result);
        }
    }

    /// Replaces the active config wholesale.
    pub fn reconfigure(&mut self, config: ProcessingConfig) {
        log::debug!(
            "FrameScheduler({}): config replaced (interval {}ms -> {}ms).",
            self.tier,
            self.config.sampling_interval_ms,
            config.sampling_interval_ms
        );
        self.monitor.set_target_fps(config.target_fps());
        self.config = config;
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn stats(&self) -> StrategyStats {
        StrategyStats {
            frames_processed: self.frames_processed,
            frames_skipped: self.frames_skipped,
            cache_hits: self.cache_hits,
            fallback_results: 0,
        }
    }

    /// Stops the cleanup timer, releases the worker, and clears the cache,
    /// in that order. Idempotent: a second call is a no-op and produces no
    /// further callbacks or results.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        self.cleanup_stop = None;
        if let Some(handle) = self.cleanup_handle.take() {
            let _ = handle.join();
        }
        if let Some(mut worker) = self.worker.take() {
            worker.shutdown();
        }
        self.cache.lock().unwrap().clear();
        log::debug!("FrameScheduler({}): disposed.", self.tier);
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Spawns the periodic cleanup tick: compacts the cache, drains the worker
/// queue, and releases excess capacity as best-effort memory reclamation.
fn spawn_cleanup_tick(
    cache: Arc<Mutex<ResultCache>>,
    worker: Option<&FrameWorker>,
    interval: Duration,
) -> (Sender<()>, thread::JoinHandle<()>) {
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let clear_queue = worker.map(|w| w.clear_handle());

    let handle = thread::spawn(move || loop {
        match stop_rx.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        cache.lock().unwrap().compact();
        if let Some(clear) = &clear_queue {
            clear();
        }
        log::trace!("FrameScheduler cleanup tick ran.");
    });

    (stop_tx, handle)
}
