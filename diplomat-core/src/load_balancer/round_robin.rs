//! Round-robin cursor for traffic unrelated to camera streaming.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::worker::WorkerAddr;

/// A shared position into the confirmed pool.
///
/// The counter only ever increments; the position is taken modulo the pool
/// size at the time of each call, so a pool resize may skip or repeat one
/// member once.
#[derive(Debug, Default)]
pub struct RoundRobinCursor {
    next: AtomicUsize,
}

impl RoundRobinCursor {
    /// Create a cursor starting at the first member.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the cursor and return the member it lands on.
    pub fn next<'a>(&self, pool: &'a [WorkerAddr]) -> Option<&'a WorkerAddr> {
        if pool.is_empty() {
            return None;
        }
        // Wrapping on overflow keeps the sequence going; a single skip at usize::MAX is fine.
        let ticket = self.next.fetch_add(1, Ordering::Relaxed);
        pool.get(ticket % pool.len())
    }
}
