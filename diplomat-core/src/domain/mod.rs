//! Fleet membership and assignment state.

pub mod fleet;
pub mod worker;

pub use fleet::{FleetState, SharedFleet, SweepReport};
pub use worker::{AddrError, CameraId, WorkerAddr};
