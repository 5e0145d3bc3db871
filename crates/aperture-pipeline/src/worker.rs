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

//! Background frame extraction off the foreground path.
//!
//! The worker receives frames over a queue bounded to the two most recent
//! entries; submitting to a full queue evicts the oldest frame rather than
//! blocking or growing, so sustained backpressure can never accumulate
//! memory. Results flow back over an unbounded channel the scheduler drains
//! opportunistically.

use aperture_core::{FrameBuffer, FrameResult};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

/// Frame-processing function the worker applies to each job. Built by the
/// strategy from the host's feature extractor plus the heuristic fallback.
pub type ProcessFn = Arc<dyn Fn(&FrameBuffer) -> FrameResult + Send + Sync>;

/// Capacity of the job queue: only the two most recent frames are worth
/// processing; anything older is stale camera data.
const QUEUE_CAPACITY: usize = 2;

struct Job {
    key: u64,
    frame: FrameBuffer,
}

/// A single background extraction thread with a bounded, drop-oldest queue.
pub struct FrameWorker {
    job_tx: Option<Sender<Job>>,
    /// Producer-side receiver clone, used for drop-oldest eviction and for
    /// clearing the queue from the cleanup tick.
    job_rx: Receiver<Job>,
    result_rx: Receiver<(u64, FrameResult)>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FrameWorker {
    /// Spawns the worker thread.
    pub fn spawn(process: ProcessFn) -> Self {
        let (job_tx, job_rx) = bounded::<Job>(QUEUE_CAPACITY);
        let (result_tx, result_rx) = unbounded::<(u64, FrameResult)>();

        let worker_rx = job_rx.clone();
        let handle = thread::spawn(move || {
            log::debug!("FrameWorker thread started.");
            while let Ok(job) = worker_rx.recv() {
                // A panicking extractor must not take the worker down; the
                // frame is simply lost and the next one processed normally.
                let outcome = catch_unwind(AssertUnwindSafe(|| process(&job.frame)));
                match outcome {
                    Ok(result) => {
                        if result_tx.send((job.key, result)).is_err() {
                            break;
                        }
                    }
                    Err(_) => {
                        log::warn!("FrameWorker: extraction panicked, frame discarded.");
                    }
                }
            }
            log::debug!("FrameWorker thread stopped.");
        });

        Self {
            job_tx: Some(job_tx),
            job_rx,
            result_rx,
            handle: Some(handle),
        }
    }

    /// Hands a frame to the worker, evicting the oldest queued frame when
    /// the queue is full. Returns `true` if an older frame was evicted.
    pub fn submit(&self, key: u64, frame: FrameBuffer) -> bool {
        let Some(tx) = self.job_tx.as_ref() else {
            return false;
        };

        let mut evicted = false;
        let mut job = Job { key, frame };
        loop {
            match tx.try_send(job) {
                Ok(()) => return evicted,
                Err(TrySendError::Full(returned)) => {
                    if self.job_rx.try_recv().is_ok() {
                        evicted = true;
                    }
                    job = returned;
                }
                Err(TrySendError::Disconnected(_)) => return evicted,
            }
        }
    }

    /// Non-blocking drain of all completed results.
    pub fn drain_results(&self) -> Vec<(u64, FrameResult)> {
        self.result_rx.try_iter().collect()
    }

    /// Discards every queued-but-unprocessed frame.
    pub fn clear_queue(&self) {
        while self.job_rx.try_recv().is_ok() {}
    }

    /// A detached closure that clears the queue, for the periodic cleanup
    /// tick (which outlives no worker but runs on its own thread).
    pub fn clear_handle(&self) -> impl Fn() + Send + 'static {
        let rx = self.job_rx.clone();
        move || while rx.try_recv().is_ok() {}
    }

    /// Stops the worker thread and waits for it to exit. Idempotent.
    pub fn shutdown(&mut self) {
        self.job_tx = None;
        self.clear_queue();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FrameWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
