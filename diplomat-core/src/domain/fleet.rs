//! The shared routing state of the redirect fleet.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::domain::worker::{CameraId, WorkerAddr};
use crate::load_balancer::{self, RoundRobinCursor};

/// Outcome of committing one health sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Workers that passed their probe and were not confirmed before.
    pub promoted: Vec<WorkerAddr>,
    /// Previously confirmed workers that failed their probe.
    pub evicted: Vec<WorkerAddr>,
    /// Cameras whose assignment was dropped with an evicted worker.
    pub pruned_assignments: Vec<CameraId>,
    /// The confirmed set after the sweep.
    pub confirmed: Arc<Vec<WorkerAddr>>,
}

/// Registry, assignment table and round-robin cursor behind one owner.
///
/// Locks are always taken in the order announced, assignments. The confirmed
/// set is only ever swapped while the assignments write lock is held, so a
/// check-and-create never sees a table and a pool from different sweeps.
#[derive(Debug)]
pub struct FleetState {
    announced: Mutex<Vec<WorkerAddr>>,
    /// Sorted and duplicate-free.
    confirmed: ArcSwap<Vec<WorkerAddr>>,
    assignments: RwLock<HashMap<CameraId, WorkerAddr>>,
    cursor: RoundRobinCursor,
}

impl FleetState {
    /// Create an empty fleet.
    pub fn new() -> Self {
        Self {
            announced: Mutex::new(Vec::new()),
            confirmed: ArcSwap::from_pointee(Vec::new()),
            assignments: RwLock::new(HashMap::new()),
            cursor: RoundRobinCursor::new(),
        }
    }

    /// Register a self-announced worker, pending its first probe.
    ///
    /// Returns `false` if the address was already waiting.
    pub fn announce(&self, addr: WorkerAddr) -> bool {
        let mut announced = self.announced.lock();
        if announced.contains(&addr) {
            return false;
        }
        announced.push(addr);
        true
    }

    /// Workers announced but not yet probed, in announcement order.
    pub fn announced_snapshot(&self) -> Vec<WorkerAddr> {
        self.announced.lock().clone()
    }

    /// Workers that passed the latest completed probe.
    pub fn confirmed_snapshot(&self) -> Arc<Vec<WorkerAddr>> {
        self.confirmed.load_full()
    }

    /// Every address the next sweep has to probe: announced and confirmed.
    pub fn probe_targets(&self) -> Vec<WorkerAddr> {
        let mut targets: BTreeSet<WorkerAddr> = self.announced.lock().iter().cloned().collect();
        targets.extend(self.confirmed.load().iter().cloned());
        targets.into_iter().collect()
    }

    /// Install the result of a sweep.
    ///
    /// `probed` is the target list the sweep started from and `healthy` the
    /// subset whose probe succeeded. Probed addresses leave the announced
    /// list; anything announced while the probes ran waits for the next sweep.
    pub fn commit_sweep(&self, probed: &[WorkerAddr], healthy: Vec<WorkerAddr>) -> SweepReport {
        let healthy_set: BTreeSet<WorkerAddr> = healthy.into_iter().collect();
        let next: Arc<Vec<WorkerAddr>> = Arc::new(healthy_set.iter().cloned().collect());

        let mut announced = self.announced.lock();
        announced.retain(|addr| !probed.contains(addr));

        let mut assignments = self.assignments.write();
        let previous = self.confirmed.swap(Arc::clone(&next));

        let mut pruned_assignments = Vec::new();
        assignments.retain(|camera, worker| {
            let keep = healthy_set.contains(worker);
            if !keep {
                pruned_assignments.push(camera.clone());
            }
            keep
        });
        drop(assignments);
        drop(announced);

        pruned_assignments.sort();
        SweepReport {
            promoted: next.iter().filter(|w| !previous.contains(*w)).cloned().collect(),
            evicted: previous.iter().filter(|w| !healthy_set.contains(*w)).cloned().collect(),
            pruned_assignments,
            confirmed: next,
        }
    }

    /// The worker currently serving `camera`, if any. Never creates a binding.
    pub fn assignment_for(&self, camera: &CameraId) -> Option<WorkerAddr> {
        self.assignments.read().get(camera).cloned()
    }

    /// Copy of the whole assignment table.
    pub fn assignments_snapshot(&self) -> HashMap<CameraId, WorkerAddr> {
        self.assignments.read().clone()
    }

    /// Return the worker bound to `camera`, binding it to the least-loaded
    /// confirmed worker first if it has none.
    ///
    /// Returns `None` only when no binding exists and the confirmed pool is
    /// empty.
    pub fn resolve_or_assign(&self, camera: &CameraId) -> Option<WorkerAddr> {
        if let Some(worker) = self.assignment_for(camera) {
            return Some(worker);
        }

        let mut assignments = self.assignments.write();
        // Another request may have bound the camera between the two locks.
        if let Some(worker) = assignments.get(camera) {
            return Some(worker.clone());
        }

        let confirmed = self.confirmed.load();
        let worker = load_balancer::select_least_loaded(&confirmed, &assignments)?;
        assignments.insert(camera.clone(), worker.clone());
        info!(camera = %camera, worker = %worker, "camera assigned");
        Some(worker)
    }

    /// Next confirmed worker in round-robin order.
    pub fn next_round_robin(&self) -> Option<WorkerAddr> {
        self.cursor.next(&self.confirmed.load()).cloned()
    }
}

impl Default for FleetState {
    fn default() -> Self {
        Self::new()
    }
}

/// A thread-safe reference to the fleet state.
pub type SharedFleet = Arc<FleetState>;
