//! Counters shared between the render worker and the control side.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Live counters, updated by the worker and the transfer channel
#[derive(Debug, Default)]
pub struct WorkerStats {
    frames_drawn: AtomicU64,
    dropped_size: AtomicU64,
    dropped_inactive: AtomicU64,
    coalesced: AtomicU64,
    copied: AtomicU64,
    draw_errors: AtomicU64,
    running: AtomicBool,
}

/// Point-in-time copy of [`WorkerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Frames uploaded and drawn
    pub frames_drawn: u64,
    /// Frames whose length or dimensions did not match the texture
    pub dropped_size: u64,
    /// Frames that arrived before init or after a failed init
    pub dropped_inactive: u64,
    /// Pending frames replaced by a newer one before the worker saw them
    pub coalesced: u64,
    /// Frames that needed a defensive copy at transfer time
    pub copied: u64,
    /// Draws that failed after a successful upload
    pub draw_errors: u64,
}

impl WorkerStats {
    pub(crate) fn record_drawn(&self) {
        self.frames_drawn.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_size(&self) {
        self.dropped_size.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_inactive(&self) {
        self.dropped_inactive.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_copied(&self) {
        self.copied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_draw_error(&self) {
        self.draw_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Whether the worker thread is still accepting messages
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_drawn: self.frames_drawn.load(Ordering::Relaxed),
            dropped_size: self.dropped_size.load(Ordering::Relaxed),
            dropped_inactive: self.dropped_inactive.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            copied: self.copied.load(Ordering::Relaxed),
            draw_errors: self.draw_errors.load(Ordering::Relaxed),
        }
    }
}
