//! # Live View Feed Module
//!
//! Keeps a fixed-length rolling window of the most recent samples for display.
//!
//! A drain thread pulls from a `DropOldest` hub subscription, so a renderer that
//! stalls never backs up acquisition; it only ever sees the freshest data.
//! Sequence discontinuities within a session are counted as gaps. A sample
//! from a new session clears the window and the gap counters.

use crate::hub::{ConsumerStats, DistributionHub, OverflowPolicy};
use crate::sensor::{Sample, SessionId};
use crossbeam_channel::RecvTimeoutError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Gap counters for the current session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GapStats {
    /// Number of discontinuities seen
    pub gaps: u64,
    /// Total sequence numbers skipped across all gaps
    pub missing_samples: u64,
}

struct LiveWindow {
    samples: VecDeque<Sample>,
    capacity: usize,
    session: Option<SessionId>,
    last_sequence: Option<u64>,
    gaps: GapStats,
}

impl LiveWindow {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            session: None,
            last_sequence: None,
            gaps: GapStats::default(),
        }
    }

    fn push(&mut self, sample: Sample) {
        if self.session != Some(sample.session) {
            self.samples.clear();
            self.session = Some(sample.session);
            self.last_sequence = None;
            self.gaps = GapStats::default();
        }

        if let Some(last) = self.last_sequence {
            if sample.sequence > last + 1 {
                self.gaps.gaps += 1;
                self.gaps.missing_samples += sample.sequence - last - 1;
            }
        }
        self.last_sequence = Some(sample.sequence);

        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }
}

/// Rolling display window fed from the distribution hub.
pub struct LiveViewFeed {
    window: Arc<Mutex<LiveWindow>>,
    consumer: Arc<ConsumerStats>,
    should_stop: Arc<AtomicBool>,
    drain_thread: Option<thread::JoinHandle<()>>,
}

impl LiveViewFeed {
    /// Subscribe to `hub` and start the drain thread.
    ///
    /// The window holds `window_seconds * sample_rate` samples.
    pub fn start(
        hub: &DistributionHub,
        queue_capacity: usize,
        window_seconds: f64,
        sample_rate: u32,
    ) -> std::io::Result<Self> {
        let capacity = ((window_seconds * sample_rate as f64).round() as usize).max(1);
        let window = Arc::new(Mutex::new(LiveWindow::new(capacity)));
        let subscription = hub.subscribe("live_view", queue_capacity, OverflowPolicy::DropOldest);
        let consumer = subscription.stats();
        let should_stop = Arc::new(AtomicBool::new(false));

        let thread_window = window.clone();
        let thread_stop = should_stop.clone();
        let drain_thread = thread::Builder::new()
            .name("live-view".to_string())
            .spawn(move || {
                while !thread_stop.load(Ordering::Relaxed) {
                    match subscription.recv_timeout(POLL_INTERVAL) {
                        Ok(sample) => {
                            let mut window = lock(&thread_window);
                            window.push(sample);
                            for sample in subscription.try_iter() {
                                window.push(sample);
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::debug!("Live view drain stopped");
            })?;

        Ok(Self {
            window,
            consumer,
            should_stop,
            drain_thread: Some(drain_thread),
        })
    }

    /// Copy of the current window, oldest first
    pub fn window(&self) -> Vec<Sample> {
        lock(&self.window).samples.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<Sample> {
        lock(&self.window).samples.back().copied()
    }

    pub fn len(&self) -> usize {
        lock(&self.window).samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        lock(&self.window).capacity
    }

    pub fn session(&self) -> Option<SessionId> {
        lock(&self.window).session
    }

    pub fn gap_stats(&self) -> GapStats {
        lock(&self.window).gaps
    }

    /// Samples the hub evicted from this feed's queue
    pub fn dropped(&self) -> u64 {
        self.consumer.dropped()
    }

    /// Stop the drain thread and unsubscribe.
    pub fn stop(&mut self) {
        self.should_stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.drain_thread.take() {
            if handle.join().is_err() {
                log::error!("Live view drain thread panicked");
            }
        }
    }
}

impl Drop for LiveViewFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(window: &Mutex<LiveWindow>) -> MutexGuard<'_, LiveWindow> {
    window.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
