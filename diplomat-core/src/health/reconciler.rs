//! One reconciliation sweep: probe every known worker, then swap state.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::domain::fleet::{SharedFleet, SweepReport};
use crate::domain::worker::WorkerAddr;

/// A liveness check against a single worker.
///
/// Implementations bound their own duration and report any failure as
/// `false`; a sweep never retries.
#[async_trait]
pub trait HealthProbe: Send + Sync + 'static {
    /// Whether `addr` answered its liveness check successfully.
    async fn is_alive(&self, addr: &WorkerAddr) -> bool;
}

/// Drives health sweeps against a fleet.
#[derive(Debug)]
pub struct Reconciler<P> {
    fleet: SharedFleet,
    probe: Arc<P>,
}

impl<P> Clone for Reconciler<P> {
    fn clone(&self) -> Self {
        Self {
            fleet: Arc::clone(&self.fleet),
            probe: Arc::clone(&self.probe),
        }
    }
}

impl<P: HealthProbe> Reconciler<P> {
    /// Create a reconciler for `fleet` using `probe`.
    pub fn new(fleet: SharedFleet, probe: P) -> Self {
        Self {
            fleet,
            probe: Arc::new(probe),
        }
    }

    /// Run one sweep.
    ///
    /// Probes run concurrently with no fleet lock held; the new membership is
    /// committed in one step once every probe has reported.
    pub async fn sweep(&self) -> SweepReport {
        let targets = self.fleet.probe_targets();

        let mut probes = JoinSet::new();
        for addr in targets.iter().cloned() {
            let probe = Arc::clone(&self.probe);
            probes.spawn(async move {
                let alive = probe.is_alive(&addr).await;
                (addr, alive)
            });
        }

        let mut healthy = Vec::with_capacity(targets.len());
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((addr, true)) => healthy.push(addr),
                Ok((addr, false)) => debug!(worker = %addr, "worker failed liveness probe"),
                Err(e) => warn!("liveness probe task failed: {}", e),
            }
        }

        let report = self.fleet.commit_sweep(&targets, healthy);

        for worker in &report.promoted {
            info!(worker = %worker, "worker confirmed");
        }
        for worker in &report.evicted {
            warn!(worker = %worker, "worker evicted after failed probe");
        }
        if !report.pruned_assignments.is_empty() {
            info!(
                count = report.pruned_assignments.len(),
                "pruned assignments bound to evicted workers"
            );
        }

        report
    }
}
