//! Least-loaded selector used when a camera is first ingested.

use std::collections::{BTreeMap, HashMap};

use crate::domain::worker::{CameraId, WorkerAddr};

/// Count the cameras bound to each confirmed worker.
///
/// Every confirmed worker gets an entry, starting at zero. Bindings to workers
/// outside `confirmed` are ignored.
pub fn load_by_worker<'a>(
    confirmed: &'a [WorkerAddr],
    assignments: &HashMap<CameraId, WorkerAddr>,
) -> BTreeMap<&'a WorkerAddr, usize> {
    let mut load: BTreeMap<&WorkerAddr, usize> = confirmed.iter().map(|w| (w, 0)).collect();

    for worker in assignments.values() {
        if let Some(count) = load.get_mut(worker) {
            *count += 1;
        }
    }

    load
}

/// Selects the confirmed worker carrying the fewest cameras.
///
/// Ties go to the lowest address. Returns `None` when `confirmed` is empty.
pub fn select_least_loaded(
    confirmed: &[WorkerAddr],
    assignments: &HashMap<CameraId, WorkerAddr>,
) -> Option<WorkerAddr> {
    load_by_worker(confirmed, assignments)
        .into_iter()
        // BTreeMap iterates in address order and min_by_key keeps the first minimum.
        .min_by_key(|(_, count)| *count)
        .map(|(worker, _)| worker.clone())
}
