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

//! Continuous performance sampling on a background thread.
//!
//! The monitor owns a single sampling thread that wakes on a fixed cadence,
//! computes a [`PerformanceSample`], and broadcasts it to subscribers. The
//! frame pipeline feeds it via [`MonitorHandle::record_frame`] /
//! [`MonitorHandle::record_dropped_frame`] on its own cadence.
//!
//! CPU load is estimated with a timed synthetic workload (calibrated at
//! thread start, normalized to 0-100, smoothed over the last 10 samples)
//! rather than an OS counter: the same estimator works on every platform the
//! pipeline targets, including ones where no process-level CPU API exists.

use crate::stats::RollingWindow;
use aperture_core::{Dispatcher, HardwareProbe, PerformanceSample, ThermalBucket};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use sysinfo::System;

/// Iterations of the synthetic CPU workload per tick.
const WORKLOAD_ITERATIONS: u64 = 200_000;
/// Workload slowdown factor that maps to 100% CPU load.
const WORKLOAD_SATURATION_RATIO: f32 = 3.0;
/// A frame counts as dropped when the inter-frame gap exceeds this multiple
/// of the expected interval for the configured target frame rate.
const DROP_GAP_FACTOR: f32 = 1.5;

/// Configuration for the performance monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Sampling cadence.
    pub cadence: Duration,
    /// Target frame rate the pipeline is currently configured for; used for
    /// the dropped-frame gap heuristic and the fps denominator.
    pub target_fps: f32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cadence: Duration::from_millis(1000),
            target_fps: 5.0,
        }
    }
}

/// State shared between the sampling thread and the frame pipeline.
#[derive(Debug)]
struct SharedState {
    epoch: Instant,
    frames: AtomicU32,
    dropped: AtomicU32,
    /// Microseconds since `epoch` of the last recorded frame; 0 = none yet.
    last_frame_us: AtomicU64,
    /// Target fps as f32 bits; updated when the active config changes.
    target_fps_bits: AtomicU32,
    latest: Mutex<PerformanceSample>,
}

impl SharedState {
    fn new(target_fps: f32) -> Self {
        Self {
            epoch: Instant::now(),
            frames: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
            last_frame_us: AtomicU64::new(0),
            target_fps_bits: AtomicU32::new(target_fps.to_bits()),
            latest: Mutex::new(PerformanceSample::default()),
        }
    }

    fn target_fps(&self) -> f32 {
        f32::from_bits(self.target_fps_bits.load(Ordering::Relaxed))
    }
}

/// A cheap, cloneable handle the frame pipeline uses to feed the monitor
/// and to pull the latest sample for its scale-ladder decisions.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    shared: Arc<SharedState>,
}

impl MonitorHandle {
    /// Records one processed frame. If the gap since the previous frame
    /// exceeds 1.5x the expected inter-frame interval, the missing time is
    /// also counted as a dropped frame.
    pub fn record_frame(&self) {
        let now_us = self.shared.epoch.elapsed().as_micros() as u64;
        let prev_us = self.shared.last_frame_us.swap(now_us.max(1), Ordering::Relaxed);
        self.shared.frames.fetch_add(1, Ordering::Relaxed);

        let target_fps = self.shared.target_fps();
        if prev_us != 0 && target_fps > 0.0 {
            let expected_us = 1_000_000.0 / target_fps;
            let gap_us = (now_us.saturating_sub(prev_us)) as f32;
            if gap_us > expected_us * DROP_GAP_FACTOR {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Records an explicitly dropped frame (e.g. queue overflow).
    pub fn record_dropped_frame(&self) {
        self.shared.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Updates the target frame rate after a config replacement.
    pub fn set_target_fps(&self, fps: f32) {
        self.shared
            .target_fps_bits
            .store(fps.to_bits(), Ordering::Relaxed);
    }

    /// The most recent sample the monitor produced.
    pub fn latest_sample(&self) -> PerformanceSample {
        self.shared.latest.lock().unwrap().clone()
    }

    /// Stores `sample` as the latest published sample. The monitor thread
    /// calls this on every tick; hosts embedding their own sampler can feed
    /// the pipeline through it directly.
    pub fn publish_sample(&self, sample: PerformanceSample) {
        *self.shared.latest.lock().unwrap() = sample;
    }

    /// Dropped frames accumulated since the last sampling tick.
    pub fn pending_dropped(&self) -> u32 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

/// Samples CPU/memory/frame-rate/battery on a fixed cadence and broadcasts
/// the result to subscribers.
pub struct PerformanceMonitor {
    config: MonitorConfig,
    shared: Arc<SharedState>,
    dispatcher: Dispatcher<PerformanceSample>,
    probe: Arc<dyn HardwareProbe>,
    running: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig, probe: Arc<dyn HardwareProbe>) -> Self {
        let shared = Arc::new(SharedState::new(config.target_fps));
        Self {
            config,
            shared,
            dispatcher: Dispatcher::new(),
            probe,
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            handle: None,
        }
    }

    /// Starts the sampling thread. Calling while already running is a no-op:
    /// exactly one timer is ever active.
    pub fn start_monitoring(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            log::debug!("PerformanceMonitor: already running, start ignored.");
            return;
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        self.stop_tx = Some(stop_tx);

        let shared = Arc::clone(&self.shared);
        let dispatcher = self.dispatcher.clone();
        let probe = Arc::clone(&self.probe);
        let cadence = self.config.cadence;
        let running = Arc::clone(&self.running);

        let handle = thread::spawn(move || {
            log::info!("PerformanceMonitor thread started (cadence {cadence:?}).");
            let baseline_ms = calibrate_workload();
            let mut cpu_window = RollingWindow::<10>::new();
            let mut system = System::new();

            while running.load(Ordering::Relaxed) {
                match stop_rx.recv_timeout(cadence) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }

                let sample = compute_sample(
                    &shared,
                    &probe,
                    &mut system,
                    &mut cpu_window,
                    baseline_ms,
                    cadence,
                );
                *shared.latest.lock().unwrap() = sample.clone();
                dispatcher.emit(&sample);
            }
            log::info!("PerformanceMonitor thread stopped.");
        });
        self.handle = Some(handle);
    }

    /// Stops the sampling thread. Calling while already stopped is a no-op;
    /// no further callbacks fire once this returns.
    pub fn stop_monitoring(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        // Dropping the sender disconnects the channel and wakes the thread.
        self.stop_tx = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Registers a sample subscriber. Panicking subscribers are isolated.
    pub fn on_performance_change(&self, callback: impl Fn(&PerformanceSample) + Send + Sync + 'static) {
        self.dispatcher.subscribe(callback);
    }

    /// A cloneable handle for the frame pipeline.
    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// The most recent sample.
    pub fn latest_sample(&self) -> PerformanceSample {
        self.shared.latest.lock().unwrap().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for PerformanceMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

/// Runs the synthetic workload once and returns the elapsed milliseconds.
fn timed_workload() -> f32 {
    let start = Instant::now();
    let mut acc: u64 = 0x9E37_79B9_7F4A_7C15;
    for i in 0..WORKLOAD_ITERATIONS {
        acc = acc.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(i);
    }
    std::hint::black_box(acc);
    start.elapsed().as_secs_f32() * 1000.0
}

/// Calibrates the unloaded workload duration; the minimum of three runs
/// approximates an idle core.
fn calibrate_workload() -> f32 {
    (0..3)
        .map(|_| timed_workload())
        .fold(f32::MAX, f32::min)
        .max(0.001)
}

fn compute_sample(
    shared: &SharedState,
    probe: &Arc<dyn HardwareProbe>,
    system: &mut System,
    cpu_window: &mut RollingWindow<10>,
    baseline_ms: f32,
    cadence: Duration,
) -> PerformanceSample {
    // CPU: slowdown of the synthetic workload relative to the calibrated
    // baseline, normalized so a 3x slowdown reads as 100%.
    let elapsed_ms = timed_workload();
    let ratio = elapsed_ms / baseline_ms;
    let raw_cpu = ((ratio - 1.0) / (WORKLOAD_SATURATION_RATIO - 1.0) * 100.0).clamp(0.0, 100.0);
    cpu_window.push(raw_cpu);
    let cpu_pct = cpu_window.average();

    // Memory: used/total ratio where the platform exposes one, else 0.
    system.refresh_memory();
    let total = system.total_memory();
    let memory_pct = if total > 0 {
        (system.used_memory() as f32 / total as f32) * 100.0
    } else {
        0.0
    };

    // Frame rate: frames recorded in the preceding window versus wall time,
    // counters reset after each read.
    let frames = shared.frames.swap(0, Ordering::Relaxed);
    let dropped_frames = shared.dropped.swap(0, Ordering::Relaxed);
    let fps = frames as f32 / cadence.as_secs_f32().max(0.001);

    // Battery impact: platform discharge rate when available, else a linear
    // CPU/memory blend.
    let battery_impact_pct = probe
        .discharge_rate_pct()
        .map(|rate| rate.clamp(0.0, 100.0))
        .unwrap_or_else(|| (cpu_pct * 0.7 + memory_pct * 0.3).clamp(0.0, 100.0));

    let thermal = thermal_bucket(cpu_pct, battery_impact_pct);

    PerformanceSample {
        cpu_pct,
        memory_pct,
        fps,
        dropped_frames,
        battery_impact_pct,
        thermal,
    }
}

/// Heuristic thermal classification from CPU and battery-impact estimates.
fn thermal_bucket(cpu_pct: f32, battery_impact_pct: f32) -> ThermalBucket {
    if cpu_pct > 90.0 || battery_impact_pct > 85.0 {
        ThermalBucket::Critical
    } else if cpu_pct > 75.0 || battery_impact_pct > 70.0 {
        ThermalBucket::Serious
    } else if cpu_pct > 60.0 || battery_impact_pct > 50.0 {
        ThermalBucket::Fair
    } else {
        ThermalBucket::Nominal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::SysinfoProbe;
    use std::sync::atomic::AtomicU32 as TestCounter;

    fn test_monitor(cadence_ms: u64) -> PerformanceMonitor {
        let _ = env_logger::builder().is_test(true).try_init();
        PerformanceMonitor::new(
            MonitorConfig {
                cadence: Duration::from_millis(cadence_ms),
                target_fps: 10.0,
            },
            Arc::new(SysinfoProbe::new()),
        )
    }

    #[test]
    fn test_start_twice_single_timer() {
        let mut monitor = test_monitor(20);
        monitor.start_monitoring();
        monitor.start_monitoring();
        assert!(monitor.is_running());
        monitor.stop_monitoring();
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_stop_when_stopped_is_noop() {
        let mut monitor = test_monitor(20);
        monitor.stop_monitoring();
        monitor.stop_monitoring();
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_samples_reach_subscribers_and_stop_silences_them() {
        let mut monitor = test_monitor(15);
        let received = Arc::new(TestCounter::new(0));
        {
            let received = Arc::clone(&received);
            monitor.on_performance_change(move |_| {
                received.fetch_add(1, Ordering::SeqCst);
            });
        }

        monitor.start_monitoring();
        thread::sleep(Duration::from_millis(120));
        monitor.stop_monitoring();

        let after_stop = received.load(Ordering::SeqCst);
        assert!(after_stop > 0, "expected at least one sample");

        thread::sleep(Duration::from_millis(60));
        assert_eq!(
            received.load(Ordering::SeqCst),
            after_stop,
            "no callbacks may fire after stop"
        );
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_delivery() {
        let mut monitor = test_monitor(15);
        let received = Arc::new(TestCounter::new(0));

        monitor.on_performance_change(|_| panic!("subscriber bug"));
        {
            let received = Arc::clone(&received);
            monitor.on_performance_change(move |_| {
                received.fetch_add(1, Ordering::SeqCst);
            });
        }

        monitor.start_monitoring();
        thread::sleep(Duration::from_millis(100));
        monitor.stop_monitoring();

        assert!(received.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_gap_exceeding_expected_interval_counts_as_drop() {
        let monitor = test_monitor(1000);
        let handle = monitor.handle();
        handle.set_target_fps(100.0); // expected interval 10ms

        handle.record_frame();
        thread::sleep(Duration::from_millis(40)); // 4x the expected interval
        handle.record_frame();

        assert!(handle.pending_dropped() >= 1);
    }

    #[test]
    fn test_tight_frames_do_not_count_as_drops() {
        let monitor = test_monitor(1000);
        let handle = monitor.handle();
        handle.set_target_fps(5.0); // expected interval 200ms

        handle.record_frame();
        handle.record_frame();
        handle.record_frame();

        assert_eq!(handle.pending_dropped(), 0);
    }

    #[test]
    fn test_thermal_bucket_thresholds() {
        assert_eq!(thermal_bucket(10.0, 10.0), ThermalBucket::Nominal);
        assert_eq!(thermal_bucket(65.0, 10.0), ThermalBucket::Fair);
        assert_eq!(thermal_bucket(80.0, 10.0), ThermalBucket::Serious);
        assert_eq!(thermal_bucket(95.0, 10.0), ThermalBucket::Critical);
        assert_eq!(thermal_bucket(10.0, 90.0), ThermalBucket::Critical);
    }

    #[test]
    fn test_workload_calibration_positive() {
        assert!(calibrate_workload() > 0.0);
    }
}
