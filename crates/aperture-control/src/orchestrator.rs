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

//! The tier-orchestration state machine.
//!
//! The orchestrator owns the whole session: capability detection, tier
//! selection, strategy construction, the capture loop, and the closed
//! feedback loop that reacts to performance samples. Tier switches are
//! atomic from the outside — the old strategy is fully disposed and the
//! successor fully constructed before any tier-change event is delivered,
//! and metrics from a disposed strategy are discarded rather than delivered
//! after the successor's tier-change event.
//!
//! Adaptation policy: a composite score below 30 forces an immediate
//! downgrade to `Basic`; a score above 80 at `Basic`, sustained for three
//! consecutive samples, attempts an upgrade to `Standard` only (never
//! higher in one step). Anything between adapts the config in place.
//! Downgrades always win over upgrades within a single sample.

use crate::builder::TierConfigBuilder;
use crate::strategy::TierStrategy;
use aperture_core::{
    Capabilities, Dispatcher, ErrorCode, FeatureExtractor, FrameResult, Mode,
    PerformanceSample, ProcessingConfig, ProcessingStrategy, StrategyStats, Tier, VideoSource,
    VisionError,
};
use aperture_pipeline::SchedulerOptions;
use aperture_telemetry::{
    determine_optimal_tier, CapabilityProbe, MonitorConfig, MonitorHandle, PerformanceMonitor,
};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Composite score below which the pipeline downgrades straight to `Basic`.
const DOWNGRADE_SCORE: f32 = 30.0;
/// Composite score above which an upgrade from `Basic` is considered.
const UPGRADE_SCORE: f32 = 80.0;
/// Consecutive good samples required before an upgrade fires.
const UPGRADE_GOOD_TICKS: u32 = 3;

/// Why a tier switch happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchReason {
    Initialized,
    Manual,
    ModeChange,
    PerformanceDowngrade,
    PerformanceUpgrade,
}

/// A completed tier transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierChange {
    pub from: Tier,
    pub to: Tier,
    pub reason: SwitchReason,
}

/// Session diagnostics, cumulative across tier switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorStats {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub cache_hits: u64,
    pub fallback_results: u64,
    /// Results delivered to metric subscribers.
    pub results_emitted: u64,
    pub avg_confidence: f32,
    /// Composite score of the most recent performance sample.
    pub last_score: f32,
    /// Tier transitions after initialization.
    pub tier_switches: u64,
}

/// State shared between the public API, the capture thread, and the monitor
/// feedback callback.
struct Inner {
    tier: Tier,
    mode: Mode,
    caps: Option<Capabilities>,
    config: ProcessingConfig,
    strategy: Option<Box<dyn ProcessingStrategy>>,
    /// Bumped on every strategy replacement; stale results are discarded by
    /// comparing against the generation they were produced under.
    generation: u64,
    /// Counters folded in from disposed strategies.
    retired: StrategyStats,
    results_emitted: u64,
    confidence_sum: f64,
    last_score: f32,
    good_ticks: u32,
    tier_switches: u64,
    initialized: bool,
    disposed: bool,
}

impl Inner {
    fn new() -> Self {
        Self {
            tier: Tier::Loading,
            mode: Mode::Auto,
            caps: None,
            config: ProcessingConfig::disabled(),
            strategy: None,
            generation: 0,
            retired: StrategyStats::default(),
            results_emitted: 0,
            confidence_sum: 0.0,
            last_score: 0.0,
            good_ticks: 0,
            tier_switches: 0,
            initialized: false,
            disposed: false,
        }
    }

    /// Folds the live strategy's counters into the retired totals. Called
    /// before every dispose so per-strategy counters are never lost.
    fn retire_strategy_counters(&mut self) {
        if let Some(strategy) = &self.strategy {
            let s = strategy.stats();
            self.retired.frames_processed += s.frames_processed;
            self.retired.frames_skipped += s.frames_skipped;
            self.retired.cache_hits += s.cache_hits;
            self.retired.fallback_results += s.fallback_results;
        }
    }
}

struct Session {
    stop_tx: Sender<()>,
    handle: thread::JoinHandle<()>,
}

/// Owns capability probing, monitoring, strategy lifecycle, and the capture
/// session, exposing the adaptive pipeline as one component.
pub struct TierOrchestrator {
    probe: CapabilityProbe,
    extractor: Arc<dyn FeatureExtractor>,
    monitor: PerformanceMonitor,
    monitor_handle: MonitorHandle,
    inner: Arc<Mutex<Inner>>,
    session: Option<Session>,
    tier_events: Dispatcher<TierChange>,
    metric_events: Dispatcher<FrameResult>,
    error_events: Dispatcher<VisionError>,
    /// Sequences tier-change emission against the capture thread's
    /// staleness check + metric emission. Held across check-and-emit on
    /// both sides so a switch completing between the capture thread's
    /// generation check and its emit cannot deliver a stale metric after
    /// the successor's tier-change event. Lock order: `emit_order` before
    /// `inner`, never the reverse.
    emit_order: Arc<Mutex<()>>,
}

impl TierOrchestrator {
    pub fn new(probe: CapabilityProbe, extractor: Arc<dyn FeatureExtractor>) -> Self {
        Self::with_monitor_config(probe, extractor, MonitorConfig::default())
    }

    pub fn with_monitor_config(
        probe: CapabilityProbe,
        extractor: Arc<dyn FeatureExtractor>,
        monitor_config: MonitorConfig,
    ) -> Self {
        let monitor = PerformanceMonitor::new(monitor_config, probe.hardware());
        let monitor_handle = monitor.handle();
        let inner = Arc::new(Mutex::new(Inner::new()));
        let tier_events = Dispatcher::new();
        let emit_order = Arc::new(Mutex::new(()));

        // The feedback loop: every sample from the monitor thread runs one
        // adaptation tick against the shared state.
        {
            let inner = Arc::clone(&inner);
            let extractor = Arc::clone(&extractor);
            let hardware = probe.hardware();
            let handle = monitor_handle.clone();
            let tier_events = tier_events.clone();
            let emit_order = Arc::clone(&emit_order);
            monitor.on_performance_change(move |sample| {
                run_feedback(
                    &inner,
                    sample,
                    hardware.battery_level(),
                    &extractor,
                    &handle,
                    &tier_events,
                    &emit_order,
                );
            });
        }

        Self {
            probe,
            extractor,
            monitor,
            monitor_handle,
            inner,
            session: None,
            tier_events,
            metric_events: Dispatcher::new(),
            error_events: Dispatcher::new(),
            emit_order,
        }
    }

    /// Detects capabilities, selects the tier under `mode`, and constructs
    /// the strategy. On any failure the orchestrator transitions to
    /// `Tier::None`, notifies error subscribers, and leaves no partial
    /// state behind.
    pub fn initialize(&mut self, mode: Mode) -> Result<Tier, VisionError> {
        self.ensure_not_disposed()?;

        let caps = match self.probe.detect() {
            Ok(caps) => caps,
            Err(err) => {
                {
                    let mut guard = self.inner.lock().unwrap();
                    guard.retire_strategy_counters();
                    if let Some(strategy) = guard.strategy.as_mut() {
                        strategy.dispose();
                    }
                    guard.strategy = None;
                    guard.tier = Tier::None;
                    guard.config = ProcessingConfig::disabled();
                    guard.initialized = false;
                }
                log::error!("TierOrchestrator: initialization failed: {err}");
                self.error_events.emit(&err);
                return Err(err);
            }
        };

        let change = {
            let mut guard = self.inner.lock().unwrap();
            guard.mode = mode;
            guard.caps = Some(caps.clone());
            let target = select_tier(&caps, mode);
            let change = switch_strategy(
                &mut guard,
                target,
                SwitchReason::Initialized,
                &self.extractor,
                &self.monitor_handle,
            );
            guard.initialized = true;
            change
        };

        log::info!(
            "TierOrchestrator: initialized at {} (mode {}).",
            change.to,
            mode.as_str()
        );
        self.emit_tier_change(&change);
        Ok(change.to)
    }

    /// Starts the capture session, taking exclusive ownership of the video
    /// source for its duration. `initialize` must have succeeded first.
    pub fn start_vision(&mut self, mut source: Box<dyn VideoSource>) -> Result<(), VisionError> {
        self.ensure_not_disposed()?;
        {
            let guard = self.inner.lock().unwrap();
            if !guard.initialized {
                return Err(VisionError::fatal(
                    ErrorCode::NotInitialized,
                    "start_vision called before initialize",
                ));
            }
        }
        if self.session.is_some() {
            log::warn!("TierOrchestrator: start_vision while running, restarting session.");
            self.stop_vision();
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let inner = Arc::clone(&self.inner);
        let metric_events = self.metric_events.clone();
        let emit_order = Arc::clone(&self.emit_order);

        let handle = thread::spawn(move || {
            log::info!("TierOrchestrator capture thread started.");
            loop {
                let poll = {
                    let guard = inner.lock().unwrap();
                    Duration::from_millis(1000 / u64::from(guard.config.capture_fps.max(1)))
                };
                match stop_rx.recv_timeout(poll) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }

                let Some(frame) = source.next_frame() else {
                    continue;
                };

                let (result, generation) = {
                    let mut guard = inner.lock().unwrap();
                    let Some(strategy) = guard.strategy.as_mut() else {
                        continue;
                    };
                    let result = strategy.process_frame(frame);
                    if let Some(result) = &result {
                        guard.results_emitted += 1;
                        guard.confidence_sum += f64::from(result.confidence);
                    }
                    (result, guard.generation)
                };

                if let Some(result) = result {
                    // A tier switch since this frame was processed makes the
                    // result stale; drop it so nothing from a disposed
                    // strategy reaches subscribers after the new tier's
                    // change event. The ordering lock is held across the
                    // check and the emit: tier-change emission takes the
                    // same lock, so a switch completing in between cannot
                    // slip its event ahead of this stale metric.
                    let _order = emit_order.lock().unwrap();
                    if inner.lock().unwrap().generation == generation {
                        metric_events.emit(&result);
                    }
                }
            }
            source.release();
            log::info!("TierOrchestrator capture thread stopped.");
        });

        self.session = Some(Session { stop_tx, handle });
        self.monitor.start_monitoring();
        Ok(())
    }

    /// Stops the capture session and releases the video source. Idempotent.
    pub fn stop_vision(&mut self) {
        self.monitor.stop_monitoring();
        if let Some(session) = self.session.take() {
            drop(session.stop_tx);
            let _ = session.handle.join();
        }
    }

    /// Switches to `tier` explicitly: stop, dispose, rebuild, and (if the
    /// session is live) keep capturing under the new strategy.
    pub fn switch_tier(&mut self, tier: Tier) -> Result<(), VisionError> {
        self.ensure_not_disposed()?;
        let change = {
            let mut guard = self.inner.lock().unwrap();
            if !guard.initialized {
                return Err(VisionError::fatal(
                    ErrorCode::NotInitialized,
                    "switch_tier called before initialize",
                ));
            }
            if guard.tier == tier {
                return Ok(());
            }
            switch_strategy(
                &mut guard,
                tier,
                SwitchReason::Manual,
                &self.extractor,
                &self.monitor_handle,
            )
        };
        self.emit_tier_change(&change);
        Ok(())
    }

    /// Re-selects the tier under `mode` and rebuilds the config. A mode
    /// change that keeps the tier still replaces the config wholesale.
    pub fn switch_mode(&mut self, mode: Mode) -> Result<(), VisionError> {
        self.ensure_not_disposed()?;
        let change = {
            let mut guard = self.inner.lock().unwrap();
            if !guard.initialized {
                return Err(VisionError::fatal(
                    ErrorCode::NotInitialized,
                    "switch_mode called before initialize",
                ));
            }
            guard.mode = mode;
            let caps = guard.caps.clone().unwrap_or_else(Capabilities::fallback);
            let target = select_tier(&caps, mode);

            if target == guard.tier {
                let config = TierConfigBuilder::build(&caps, target, mode);
                if let Some(strategy) = guard.strategy.as_mut() {
                    strategy.reconfigure(config.clone());
                }
                guard.config = config;
                None
            } else {
                Some(switch_strategy(
                    &mut guard,
                    target,
                    SwitchReason::ModeChange,
                    &self.extractor,
                    &self.monitor_handle,
                ))
            }
        };
        if let Some(change) = change {
            self.emit_tier_change(&change);
        }
        Ok(())
    }

    /// Feeds one performance sample through the feedback loop, for hosts
    /// that run their own sampler instead of the built-in monitor thread.
    pub fn ingest_sample(&self, sample: PerformanceSample) {
        self.monitor_handle.publish_sample(sample.clone());
        run_feedback(
            &self.inner,
            &sample,
            self.probe.hardware().battery_level(),
            &self.extractor,
            &self.monitor_handle,
            &self.tier_events,
            &self.emit_order,
        );
    }

    pub fn on_tier_change(&self, callback: impl Fn(&TierChange) + Send + Sync + 'static) {
        self.tier_events.subscribe(callback);
    }

    pub fn on_metrics(&self, callback: impl Fn(&FrameResult) + Send + Sync + 'static) {
        self.metric_events.subscribe(callback);
    }

    pub fn on_error(&self, callback: impl Fn(&VisionError) + Send + Sync + 'static) {
        self.error_events.subscribe(callback);
    }

    pub fn current_tier(&self) -> Tier {
        self.inner.lock().unwrap().tier
    }

    pub fn current_mode(&self) -> Mode {
        self.inner.lock().unwrap().mode
    }

    pub fn current_config(&self) -> ProcessingConfig {
        self.inner.lock().unwrap().config.clone()
    }

    /// Capabilities detected at the last initialize/refresh, if any.
    pub fn capabilities(&self) -> Option<Capabilities> {
        self.inner.lock().unwrap().caps.clone()
    }

    /// Cumulative session diagnostics across all tier switches.
    pub fn stats(&self) -> OrchestratorStats {
        let guard = self.inner.lock().unwrap();
        let mut totals = guard.retired;
        if let Some(strategy) = &guard.strategy {
            let live = strategy.stats();
            totals.frames_processed += live.frames_processed;
            totals.frames_skipped += live.frames_skipped;
            totals.cache_hits += live.cache_hits;
            totals.fallback_results += live.fallback_results;
        }
        OrchestratorStats {
            frames_processed: totals.frames_processed,
            frames_skipped: totals.frames_skipped,
            cache_hits: totals.cache_hits,
            fallback_results: totals.fallback_results,
            results_emitted: guard.results_emitted,
            avg_confidence: if guard.results_emitted > 0 {
                (guard.confidence_sum / guard.results_emitted as f64) as f32
            } else {
                0.0
            },
            last_score: guard.last_score,
            tier_switches: guard.tier_switches,
        }
    }

    /// Tears the whole component down: session, monitor, strategy, and
    /// subscribers. Further lifecycle calls fail with `AlreadyDisposed`.
    pub fn dispose(&mut self) {
        self.stop_vision();
        {
            let mut guard = self.inner.lock().unwrap();
            if guard.disposed {
                return;
            }
            guard.retire_strategy_counters();
            if let Some(strategy) = guard.strategy.as_mut() {
                strategy.dispose();
            }
            guard.strategy = None;
            guard.tier = Tier::None;
            guard.config = ProcessingConfig::disabled();
            guard.disposed = true;
        }
        self.tier_events.clear();
        self.metric_events.clear();
        self.error_events.clear();
        log::info!("TierOrchestrator: disposed.");
    }

    /// Emits a tier-change event under the ordering lock, after any stale
    /// metric check-and-emit in flight has completed.
    fn emit_tier_change(&self, change: &TierChange) {
        let _order = self.emit_order.lock().unwrap();
        self.tier_events.emit(change);
    }

    fn ensure_not_disposed(&self) -> Result<(), VisionError> {
        if self.inner.lock().unwrap().disposed {
            return Err(VisionError::fatal(
                ErrorCode::AlreadyDisposed,
                "orchestrator has been disposed",
            ));
        }
        Ok(())
    }
}

impl Drop for TierOrchestrator {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// The tier for `caps` under `mode`. `Performance` pins to `Basic`; the
/// other modes defer to the capability decision table.
fn select_tier(caps: &Capabilities, mode: Mode) -> Tier {
    match mode {
        Mode::Performance => Tier::Basic,
        Mode::Auto | Mode::Quality => determine_optimal_tier(caps),
    }
}

/// Replaces the active strategy: retire counters, dispose, rebuild config
/// and strategy for `target`, bump the generation. Runs under the inner
/// lock so the capture thread never observes a half-built successor.
fn switch_strategy(
    guard: &mut Inner,
    target: Tier,
    reason: SwitchReason,
    extractor: &Arc<dyn FeatureExtractor>,
    monitor_handle: &MonitorHandle,
) -> TierChange {
    let from = guard.tier;
    guard.retire_strategy_counters();
    if let Some(strategy) = guard.strategy.as_mut() {
        strategy.dispose();
    }
    guard.strategy = None;

    let caps = guard.caps.clone().unwrap_or_else(Capabilities::fallback);
    let config = TierConfigBuilder::build(&caps, target, guard.mode);

    if target.is_active() {
        let strategy = TierStrategy::new(
            target,
            config.clone(),
            Arc::clone(extractor),
            monitor_handle.clone(),
            SchedulerOptions {
                use_worker: caps.parallel_execution,
                ..Default::default()
            },
        );
        guard.strategy = Some(Box::new(strategy));
    }

    guard.config = config;
    guard.tier = target;
    guard.generation += 1;
    guard.good_ticks = 0;
    if reason != SwitchReason::Initialized {
        guard.tier_switches += 1;
    }

    log::info!("TierOrchestrator: tier {from} -> {target} ({reason:?}).");
    TierChange {
        from,
        to: target,
        reason,
    }
}

/// One adaptation tick. Emits the tier-change event, if any, after the
/// inner lock has been released.
fn run_feedback(
    inner: &Arc<Mutex<Inner>>,
    sample: &PerformanceSample,
    battery_level: Option<f32>,
    extractor: &Arc<dyn FeatureExtractor>,
    monitor_handle: &MonitorHandle,
    tier_events: &Dispatcher<TierChange>,
    emit_order: &Arc<Mutex<()>>,
) {
    let change = {
        let mut guard = inner.lock().unwrap();
        if guard.disposed || !guard.tier.is_active() {
            return;
        }

        let score = sample.composite_score();
        guard.last_score = score;

        if score < DOWNGRADE_SCORE && guard.tier > Tier::Basic {
            log::warn!(
                "TierOrchestrator: score {score:.0} below {DOWNGRADE_SCORE}, downgrading to basic."
            );
            Some(switch_strategy(
                &mut guard,
                Tier::Basic,
                SwitchReason::PerformanceDowngrade,
                extractor,
                monitor_handle,
            ))
        } else if score > UPGRADE_SCORE && guard.tier == Tier::Basic {
            guard.good_ticks += 1;
            let mode = guard.mode;
            let allowed = guard
                .caps
                .as_ref()
                .is_some_and(|caps| determine_optimal_tier(caps) >= Tier::Standard);
            if guard.good_ticks >= UPGRADE_GOOD_TICKS && allowed && mode != Mode::Performance {
                log::info!(
                    "TierOrchestrator: score {score:.0} sustained, upgrading basic -> standard."
                );
                Some(switch_strategy(
                    &mut guard,
                    Tier::Standard,
                    SwitchReason::PerformanceUpgrade,
                    extractor,
                    monitor_handle,
                ))
            } else {
                None
            }
        } else {
            guard.good_ticks = 0;
            let mut adapted = guard.config.clone();
            if sample.is_poor() {
                adapted = TierConfigBuilder::adapt_for_performance(&adapted, sample);
            }
            if let Some(level) = battery_level {
                adapted = TierConfigBuilder::adapt_for_battery(&adapted, level);
            }
            if adapted != guard.config {
                if let Some(strategy) = guard.strategy.as_mut() {
                    strategy.reconfigure(adapted.clone());
                }
                guard.config = adapted;
            }
            None
        }
    };

    if let Some(change) = change {
        let _order = emit_order.lock().unwrap();
        tier_events.emit(&change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aperture_core::{CameraClass, CameraProbe, FrameBuffer, HardwareProbe};

    struct FixedProbe {
        cores: usize,
        gpu: bool,
        parallel: bool,
        low_power: bool,
        mobile: bool,
    }

    impl HardwareProbe for FixedProbe {
        fn logical_cores(&self) -> Option<usize> {
            Some(self.cores)
        }
        fn gpu_acceleration(&self) -> Option<bool> {
            Some(self.gpu)
        }
        fn parallel_execution(&self) -> Option<bool> {
            Some(self.parallel)
        }
        fn battery_level(&self) -> Option<f32> {
            None
        }
        fn low_power_mode(&self) -> Option<bool> {
            Some(self.low_power)
        }
        fn mobile_form_factor(&self) -> Option<bool> {
            Some(self.mobile)
        }
        fn discharge_rate_pct(&self) -> Option<f32> {
            None
        }
    }

    struct FixedCamera(CameraClass);

    impl CameraProbe for FixedCamera {
        fn probe(&self) -> Result<CameraClass, VisionError> {
            Ok(self.0)
        }
    }

    struct StubExtractor;

    impl FeatureExtractor for StubExtractor {
        fn extract(&self, _frame: &FrameBuffer, tier: Tier) -> Result<FrameResult, VisionError> {
            Ok(FrameResult {
                confidence: 0.9,
                ..FrameResult::degraded(tier)
            })
        }
    }

    fn desktop_orchestrator() -> TierOrchestrator {
        let probe = CapabilityProbe::new(
            Arc::new(FixedProbe {
                cores: 8,
                gpu: true,
                parallel: true,
                low_power: false,
                mobile: false,
            }),
            Arc::new(FixedCamera(CameraClass::High)),
        );
        TierOrchestrator::new(probe, Arc::new(StubExtractor))
    }

    fn poor_sample() -> PerformanceSample {
        PerformanceSample {
            cpu_pct: 95.0,
            memory_pct: 50.0,
            dropped_frames: 20,
            battery_impact_pct: 81.5,
            ..Default::default()
        }
    }

    fn good_sample() -> PerformanceSample {
        PerformanceSample {
            cpu_pct: 10.0,
            memory_pct: 20.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_select_tier_pins_basic_in_performance_mode() {
        let caps = Capabilities {
            logical_cores: 8,
            gpu_acceleration: true,
            parallel_execution: true,
            camera: CameraClass::High,
            battery_level: None,
            is_mobile: false,
            is_low_power_mode: false,
        };
        assert_eq!(select_tier(&caps, Mode::Auto), Tier::Premium);
        assert_eq!(select_tier(&caps, Mode::Performance), Tier::Basic);
    }

    #[test]
    fn test_initialize_selects_premium_on_capable_device() {
        let mut orch = desktop_orchestrator();
        let tier = orch.initialize(Mode::Auto).unwrap();
        assert_eq!(tier, Tier::Premium);
        assert_eq!(orch.current_tier(), Tier::Premium);
        assert!(orch.current_config().enabled);
    }

    #[test]
    fn test_start_before_initialize_fails_synchronously() {
        struct NoSource;
        impl VideoSource for NoSource {
            fn next_frame(&mut self) -> Option<FrameBuffer> {
                None
            }
            fn release(&mut self) {}
        }

        let mut orch = desktop_orchestrator();
        let err = orch.start_vision(Box::new(NoSource)).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotInitialized);
        assert!(!err.recoverable);
    }

    #[test]
    fn test_poor_score_downgrades_to_basic() {
        let mut orch = desktop_orchestrator();
        orch.initialize(Mode::Auto).unwrap();
        assert_eq!(orch.current_tier(), Tier::Premium);

        orch.ingest_sample(poor_sample());
        assert_eq!(orch.current_tier(), Tier::Basic);
        assert_eq!(orch.stats().tier_switches, 1);
    }

    #[test]
    fn test_upgrade_requires_sustained_good_score() {
        let mut orch = desktop_orchestrator();
        orch.initialize(Mode::Auto).unwrap();
        orch.switch_tier(Tier::Basic).unwrap();

        orch.ingest_sample(good_sample());
        orch.ingest_sample(good_sample());
        assert_eq!(orch.current_tier(), Tier::Basic, "two good ticks are not enough");

        orch.ingest_sample(good_sample());
        assert_eq!(orch.current_tier(), Tier::Standard, "upgrade is one step, to standard");
    }

    #[test]
    fn test_no_upgrade_past_standard_in_one_step() {
        let mut orch = desktop_orchestrator();
        orch.initialize(Mode::Auto).unwrap();
        orch.switch_tier(Tier::Basic).unwrap();
        for _ in 0..10 {
            orch.ingest_sample(good_sample());
        }
        assert_eq!(orch.current_tier(), Tier::Standard);
    }

    #[test]
    fn test_middling_score_adapts_config_in_place() {
        let mut orch = desktop_orchestrator();
        orch.initialize(Mode::Auto).unwrap();
        let before = orch.current_config();

        // Stressed but not catastrophic: cpu high, few drops.
        orch.ingest_sample(PerformanceSample {
            cpu_pct: 85.0,
            ..Default::default()
        });
        let after = orch.current_config();
        assert_eq!(orch.current_tier(), Tier::Premium, "tier must not change");
        assert!(after.sampling_interval_ms > before.sampling_interval_ms);
    }

    #[test]
    fn test_switch_tier_round_trip_restores_config() {
        let mut orch = desktop_orchestrator();
        orch.initialize(Mode::Auto).unwrap();
        let original = orch.current_config();

        orch.switch_tier(Tier::Basic).unwrap();
        assert_ne!(orch.current_config(), original);
        orch.switch_tier(Tier::Premium).unwrap();
        assert_eq!(orch.current_config(), original);
    }

    #[test]
    fn test_mode_switch_to_performance_pins_basic() {
        let mut orch = desktop_orchestrator();
        orch.initialize(Mode::Auto).unwrap();
        orch.switch_mode(Mode::Performance).unwrap();

        assert_eq!(orch.current_tier(), Tier::Basic);
        let config = orch.current_config();
        assert!(config.power_saving);
        assert_eq!(config.max_concurrent, 1);
    }

    #[test]
    fn test_same_tier_mode_switch_reconfigures_in_place() {
        // Low-power pins the device at basic in every mode, so the mode
        // switch resolves to the running tier.
        let probe = CapabilityProbe::new(
            Arc::new(FixedProbe {
                cores: 8,
                gpu: true,
                parallel: true,
                low_power: true,
                mobile: false,
            }),
            Arc::new(FixedCamera(CameraClass::High)),
        );
        let mut orch = TierOrchestrator::new(probe, Arc::new(StubExtractor));

        let changes = Arc::new(Mutex::new(Vec::new()));
        {
            let changes = Arc::clone(&changes);
            orch.on_tier_change(move |change| changes.lock().unwrap().push(*change));
        }

        orch.initialize(Mode::Auto).unwrap();
        assert_eq!(orch.current_tier(), Tier::Basic);
        assert_eq!(orch.current_config().sampling_interval_ms, 400);

        orch.switch_mode(Mode::Performance).unwrap();
        assert_eq!(orch.current_tier(), Tier::Basic);
        assert_eq!(orch.current_mode(), Mode::Performance);
        assert_eq!(
            orch.current_config().sampling_interval_ms,
            200,
            "the live strategy must pick up the new mode's config"
        );
        assert_eq!(orch.stats().tier_switches, 0, "no strategy rebuild");
        assert_eq!(
            changes.lock().unwrap().len(),
            1,
            "only the initialize event: a same-tier mode switch emits nothing"
        );
    }

    #[test]
    fn test_performance_mode_blocks_upgrade() {
        let mut orch = desktop_orchestrator();
        orch.initialize(Mode::Performance).unwrap();
        for _ in 0..10 {
            orch.ingest_sample(good_sample());
        }
        assert_eq!(orch.current_tier(), Tier::Basic);
    }

    #[test]
    fn test_dispose_blocks_further_lifecycle_calls() {
        let mut orch = desktop_orchestrator();
        orch.initialize(Mode::Auto).unwrap();
        orch.dispose();

        let err = orch.initialize(Mode::Auto).unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyDisposed);
        assert_eq!(orch.current_tier(), Tier::None);
    }

    #[test]
    fn test_tier_change_events_carry_reason() {
        let mut orch = desktop_orchestrator();
        let changes = Arc::new(Mutex::new(Vec::new()));
        {
            let changes = Arc::clone(&changes);
            orch.on_tier_change(move |change| changes.lock().unwrap().push(*change));
        }

        orch.initialize(Mode::Auto).unwrap();
        orch.ingest_sample(poor_sample());

        let seen = changes.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].reason, SwitchReason::Initialized);
        assert_eq!(seen[0].to, Tier::Premium);
        assert_eq!(seen[1].reason, SwitchReason::PerformanceDowngrade);
        assert_eq!(seen[1].from, Tier::Premium);
        assert_eq!(seen[1].to, Tier::Basic);
    }

    #[test]
    fn test_stats_serialize_for_diagnostics() {
        let mut orch = desktop_orchestrator();
        orch.initialize(Mode::Auto).unwrap();
        let json = serde_json::to_string(&orch.stats()).unwrap();
        assert!(json.contains("\"tier_switches\":0"));
    }
}
