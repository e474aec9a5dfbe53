//! # Sample Store Module
//!
//! Bounded ring of the most recent decoded samples for the live session.
//!
//! ## Access Model
//! - One writer (the serial read thread) calls `append`
//! - Any number of readers call `snapshot*`, which return owned copies
//! - `begin_session`/`clear` form a barrier: once they return, no sample of an
//!   earlier session is visible to any reader
//!
//! The lock is held only for the ring push or the copy-out, both bounded by
//! the capacity. The writer never waits on a consumer's pace: a reader that
//! falls behind simply finds the old samples evicted.

use crate::sensor::{Sample, SessionId};
use std::collections::VecDeque;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Counters describing store activity since creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub appended: u64,
    pub evicted: u64,
    pub sessions: u64,
}

struct StoreInner {
    samples: VecDeque<Sample>,
    session: Option<SessionId>,
    stats: StoreStats,
}

pub struct SampleStore {
    inner: RwLock<StoreInner>,
    sample_rate: u32,
    capacity: usize,
}

impl SampleStore {
    /// Create a store holding `capacity_seconds * sample_rate` samples.
    pub fn new(sample_rate: u32, capacity_seconds: f64) -> Self {
        let capacity = ((capacity_seconds * sample_rate as f64).round() as usize).max(1);
        Self {
            inner: RwLock::new(StoreInner {
                samples: VecDeque::with_capacity(capacity),
                session: None,
                stats: StoreStats::default(),
            }),
            sample_rate,
            capacity,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Empty the store and mark `session` as the only one it may hold.
    pub fn begin_session(&self, session: SessionId) {
        let mut inner = self.write();
        inner.samples.clear();
        inner.session = Some(session);
        inner.stats.sessions += 1;
        log::debug!("Sample store cleared for session {}", session);
    }

    /// Drop every buffered sample.
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.samples.clear();
        inner.session = None;
    }

    /// Insert a sample, evicting the oldest one when the ring is full.
    ///
    /// A sample from a different session than the current one starts a new
    /// session first, so a snapshot never mixes sessions.
    pub fn append(&self, sample: Sample) {
        let mut inner = self.write();
        if inner.session != Some(sample.session) {
            inner.samples.clear();
            inner.session = Some(sample.session);
            inner.stats.sessions += 1;
        }
        if inner.samples.len() == self.capacity {
            inner.samples.pop_front();
            inner.stats.evicted += 1;
        }
        inner.samples.push_back(sample);
        inner.stats.appended += 1;
    }

    /// Copy of the samples within the trailing `window_seconds`, measured back
    /// from the newest sample, in sequence order.
    ///
    /// The window covers `round(window_seconds * sample_rate)` sequence
    /// numbers ending at the newest one.
    pub fn snapshot(&self, window_seconds: f64) -> Vec<Sample> {
        if window_seconds <= 0.0 {
            return Vec::new();
        }
        let window = (window_seconds * self.sample_rate as f64).round() as u64;
        let inner = self.read();
        let Some(newest) = inner.samples.back() else {
            return Vec::new();
        };
        let first_sequence = (newest.sequence + 1).saturating_sub(window);
        let skip = inner
            .samples
            .partition_point(|s| s.sequence < first_sequence);
        inner.samples.range(skip..).copied().collect()
    }

    /// Copy of everything currently buffered
    pub fn snapshot_all(&self) -> Vec<Sample> {
        self.read().samples.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<Sample> {
        self.read().samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.read().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn session(&self) -> Option<SessionId> {
        self.read().session
    }

    pub fn stats(&self) -> StoreStats {
        self.read().stats
    }
}
