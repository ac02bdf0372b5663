//! Round-robin routing for everything that is not a camera stream.

use crate::domain::fleet::SharedFleet;
use crate::domain::worker::WorkerAddr;
use crate::error::RouteError;

/// Spreads generic traffic over the confirmed pool.
#[derive(Debug, Clone)]
pub struct FallbackRouter {
    fleet: SharedFleet,
}

impl FallbackRouter {
    /// Create a router over `fleet`.
    pub fn new(fleet: SharedFleet) -> Self {
        Self { fleet }
    }

    /// The next confirmed worker in turn.
    pub fn next(&self) -> Result<WorkerAddr, RouteError> {
        self.fleet.next_round_robin().ok_or(RouteError::Unavailable)
    }
}
