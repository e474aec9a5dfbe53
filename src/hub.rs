//! # Distribution Hub Module
//!
//! Fans every decoded sample out to independent per-consumer queues.
//!
//! ## Key Components
//! - `DistributionHub`: registry of consumer queues, `publish` never blocks
//! - `Subscription`: consumer end of one bounded queue, plus its counters
//! - `OverflowPolicy`: what happens when a consumer's queue is full
//!
//! Each queue is a bounded crossbeam channel owned by the hub. The hub keeps a
//! clone of every receiver so it can evict the oldest entry itself when a
//! display-style consumer falls behind. A full queue only ever affects its own
//! consumer; the read thread and other consumers are untouched.

use crate::sensor::Sample;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Behavior when a consumer's queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest queued sample to make room (live display)
    DropOldest,
    /// Refuse the new sample and raise the backlog counter (recording)
    ReportBacklog,
}

/// Per-consumer delivery counters
#[derive(Debug, Default)]
pub struct ConsumerStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
    backlogged: AtomicU64,
    closed: AtomicBool,
}

impl ConsumerStats {
    /// Samples placed on the queue
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Samples evicted under `DropOldest`
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Samples refused under `ReportBacklog`
    pub fn backlogged(&self) -> u64 {
        self.backlogged.load(Ordering::Relaxed)
    }
}

struct ConsumerSlot {
    id: u64,
    name: String,
    policy: OverflowPolicy,
    tx: Sender<Sample>,
    // Hub-side receiver clone, used only to evict under DropOldest
    evict_rx: Receiver<Sample>,
    stats: Arc<ConsumerStats>,
}

impl ConsumerSlot {
    fn deliver(&self, sample: Sample) {
        match self.tx.try_send(sample) {
            Ok(()) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(sample)) => match self.policy {
                OverflowPolicy::DropOldest => self.evict_and_retry(sample),
                OverflowPolicy::ReportBacklog => {
                    let previous = self.stats.backlogged.fetch_add(1, Ordering::Relaxed);
                    if previous == 0 {
                        log::warn!(
                            "Consumer '{}' queue is full, samples are being refused (sequence {})",
                            self.name,
                            sample.sequence
                        );
                    }
                }
            },
            Err(TrySendError::Disconnected(_)) => {
                self.stats.closed.store(true, Ordering::Relaxed);
            }
        }
    }

    fn evict_and_retry(&self, sample: Sample) {
        // The consumer may drain concurrently, so the eviction can come up empty
        if let Ok(_oldest) = self.evict_rx.try_recv() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
        match self.tx.try_send(sample) {
            Ok(()) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Consumer end of a hub queue. Dropping it unregisters the consumer.
pub struct Subscription {
    id: u64,
    name: String,
    rx: Receiver<Sample>,
    stats: Arc<ConsumerStats>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until a sample arrives or the hub is gone.
    pub fn recv(&self) -> Option<Sample> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Sample, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<Sample, TryRecvError> {
        self.rx.try_recv()
    }

    /// Drain what is queued right now without blocking.
    pub fn try_iter(&self) -> impl Iterator<Item = Sample> + '_ {
        self.rx.try_iter()
    }

    /// Underlying receiver, for `crossbeam_channel::select!`
    pub fn receiver(&self) -> &Receiver<Sample> {
        &self.rx
    }

    pub fn queued(&self) -> usize {
        self.rx.len()
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        self.stats.clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stats.closed.store(true, Ordering::Relaxed);
    }
}

/// Fan-out point between the read thread and the consumers.
#[derive(Default)]
pub struct DistributionHub {
    consumers: RwLock<Vec<ConsumerSlot>>,
    next_id: AtomicU64,
}

impl DistributionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer with its own queue of `capacity` samples.
    pub fn subscribe(&self, name: &str, capacity: usize, policy: OverflowPolicy) -> Subscription {
        let (tx, rx) = bounded(capacity.max(1));
        let stats = Arc::new(ConsumerStats::default());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let slot = ConsumerSlot {
            id,
            name: name.to_string(),
            policy,
            tx,
            evict_rx: rx.clone(),
            stats: stats.clone(),
        };
        self.consumers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(slot);
        log::debug!("Consumer '{}' subscribed (id {}, capacity {})", name, id, capacity);

        Subscription {
            id,
            name: name.to_string(),
            rx,
            stats,
        }
    }

    /// Hand `sample` to every registered consumer without blocking.
    pub fn publish(&self, sample: &Sample) {
        let mut saw_closed = false;
        {
            let consumers = self.consumers.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            for slot in consumers.iter() {
                if slot.stats.closed.load(Ordering::Relaxed) {
                    saw_closed = true;
                    continue;
                }
                slot.deliver(*sample);
            }
        }
        if saw_closed {
            self.remove_closed();
        }
    }

    fn remove_closed(&self) {
        let mut consumers = self.consumers.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        consumers.retain(|slot| {
            let closed = slot.stats.closed.load(Ordering::Relaxed);
            if closed {
                log::debug!("Consumer '{}' (id {}) unsubscribed", slot.name, slot.id);
            }
            !closed
        });
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|slot| !slot.stats.closed.load(Ordering::Relaxed))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    fn sample(sequence: u64) -> Sample {
        Sample {
            session: 1,
            sequence,
            relative_timestamp: Sample::relative_time(sequence, 500),
            eeg: 0,
            ppg_red: 0,
            ppg_ir: 0,
            quaternion: [0; 4],
        }
    }

    #[test]
    fn test_each_consumer_gets_every_sample_in_order() {
        let hub = DistributionHub::new();
        let a = hub.subscribe("a", 100, OverflowPolicy::DropOldest);
        let b = hub.subscribe("b", 100, OverflowPolicy::ReportBacklog);
        for i in 0..50 {
            hub.publish(&sample(i));
        }
        let got_a: Vec<u64> = a.try_iter().map(|s| s.sequence).collect();
        let got_b: Vec<u64> = b.try_iter().map(|s| s.sequence).collect();
        assert_eq!(got_a, (0..50).collect::<Vec<_>>());
        assert_eq!(got_a, got_b);
    }

    #[test]
    fn test_drop_oldest_keeps_newest() {
        let hub = DistributionHub::new();
        let live = hub.subscribe("live", 10, OverflowPolicy::DropOldest);
        for i in 0..25 {
            hub.publish(&sample(i));
        }
        let got: Vec<u64> = live.try_iter().map(|s| s.sequence).collect();
        assert_eq!(got, (15..25).collect::<Vec<_>>());
        assert_eq!(live.stats().dropped(), 15);
        assert_eq!(live.stats().delivered(), 25);
    }

    #[test]
    fn test_report_backlog_refuses_and_counts() {
        let hub = DistributionHub::new();
        let rec = hub.subscribe("recorder", 10, OverflowPolicy::ReportBacklog);
        for i in 0..25 {
            hub.publish(&sample(i));
        }
        let got: Vec<u64> = rec.try_iter().map(|s| s.sequence).collect();
        assert_eq!(got, (0..10).collect::<Vec<_>>());
        assert_eq!(rec.stats().backlogged(), 15);
        assert_eq!(rec.stats().dropped(), 0);
    }

    #[test]
    fn test_dropped_subscription_is_removed() {
        let hub = DistributionHub::new();
        let keep = hub.subscribe("keep", 10, OverflowPolicy::DropOldest);
        let gone = hub.subscribe("gone", 10, OverflowPolicy::DropOldest);
        assert_eq!(hub.consumer_count(), 2);
        drop(gone);
        hub.publish(&sample(0));
        assert_eq!(hub.consumer_count(), 1);
        assert_eq!(keep.try_recv().map(|s| s.sequence), Ok(0));
    }

    #[test]
    fn test_slow_consumer_does_not_affect_fast_consumer() {
        let hub = Arc::new(DistributionHub::new());
        let slow = hub.subscribe("slow", 16, OverflowPolicy::DropOldest);
        let fast = hub.subscribe("fast", 4096, OverflowPolicy::ReportBacklog);
        let total = 3000u64;

        let slow_drain = thread::spawn(move || {
            let mut seen = 0u64;
            while let Ok(_s) = slow.recv_timeout(Duration::from_millis(200)) {
                seen += 1;
                thread::sleep(Duration::from_millis(2));
            }
            (seen, slow.stats().dropped())
        });
        let fast_drain = thread::spawn(move || {
            let mut sequences = Vec::new();
            while let Ok(s) = fast.recv_timeout(Duration::from_millis(200)) {
                sequences.push(s.sequence);
            }
            (sequences, fast.stats().backlogged())
        });

        let started = Instant::now();
        for i in 0..total {
            hub.publish(&sample(i));
        }
        // Publishing never waits on the slow consumer
        assert!(started.elapsed() < Duration::from_secs(2));

        let (fast_seen, fast_backlog) = fast_drain.join().unwrap();
        let (slow_seen, slow_dropped) = slow_drain.join().unwrap();
        assert_eq!(fast_seen, (0..total).collect::<Vec<_>>());
        assert_eq!(fast_backlog, 0);
        assert!(slow_seen < total);
        assert!(slow_dropped > 0);
    }
}
