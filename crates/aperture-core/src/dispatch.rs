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

//! Multi-subscriber event fan-out with panic isolation.
//!
//! Every long-lived component in the pipeline (monitor, orchestrator) emits
//! events to zero or more registered subscribers. A panicking subscriber
//! must never prevent delivery to the others or propagate back into the
//! emitting component, so each invocation is wrapped in `catch_unwind`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

/// A thread-safe registry of event subscribers.
///
/// Cloning a `Dispatcher` yields a handle to the same subscriber list, in
/// the same way a channel sender is cloned and handed around.
pub struct Dispatcher<T> {
    subscribers: Arc<Mutex<Vec<Callback<T>>>>,
    panics: Arc<AtomicU64>,
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
            panics: Arc::clone(&self.panics),
        }
    }
}

impl<T> Default for Dispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Dispatcher<T> {
    /// Creates a dispatcher with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            panics: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Registers a subscriber. Subscribers are invoked in registration
    /// order on every emit.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) {
        let mut subs = self.subscribers.lock().unwrap();
        subs.push(Box::new(callback));
    }

    /// Delivers `event` to every subscriber.
    ///
    /// A panic in one subscriber is caught, logged, and counted; delivery
    /// continues with the next subscriber.
    pub fn emit(&self, event: &T) {
        let subs = self.subscribers.lock().unwrap();
        for (index, callback) in subs.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                self.panics.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "Dispatcher: subscriber #{index} panicked; isolating and continuing delivery."
                );
            }
        }
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// `true` when no subscribers are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total subscriber panics swallowed so far.
    pub fn panic_count(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    /// Removes every subscriber. Used on disposal.
    pub fn clear(&self) {
        self.subscribers.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_emit_reaches_all_subscribers() {
        let dispatcher = Dispatcher::<u32>::new();
        let hits = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            dispatcher.subscribe(move |value| {
                hits.fetch_add(*value, Ordering::SeqCst);
            });
        }

        dispatcher.emit(&2);
        assert_eq!(hits.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let dispatcher = Dispatcher::<()>::new();
        let delivered = Arc::new(AtomicU32::new(0));

        dispatcher.subscribe(|_| panic!("subscriber bug"));
        {
            let delivered = Arc::clone(&delivered);
            dispatcher.subscribe(move |_| {
                delivered.fetch_add(1, Ordering::SeqCst);
            });
        }

        dispatcher.emit(&());
        dispatcher.emit(&());

        assert_eq!(delivered.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.panic_count(), 2);
    }

    #[test]
    fn test_clear_removes_subscribers() {
        let dispatcher = Dispatcher::<()>::new();
        dispatcher.subscribe(|_| {});
        assert_eq!(dispatcher.len(), 1);
        dispatcher.clear();
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_emit_from_thread() {
        let dispatcher = Dispatcher::<u32>::new();
        let hits = Arc::new(AtomicU32::new(0));
        {
            let hits = Arc::clone(&hits);
            dispatcher.subscribe(move |v| {
                hits.fetch_add(*v, Ordering::SeqCst);
            });
        }

        let handle = {
            let dispatcher = dispatcher.clone();
            std::thread::spawn(move || dispatcher.emit(&7))
        };
        handle.join().expect("thread join failed");
        assert_eq!(hits.load(Ordering::SeqCst), 7);
    }
}
