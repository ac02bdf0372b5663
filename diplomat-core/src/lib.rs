//! Diplomat core.
//!
//! In-memory routing state for a live-video redirect fleet: which workers are
//! alive, which worker serves which camera, and how each kind of request is
//! matched to a worker.

pub mod domain;
pub mod error;
pub mod health;
pub mod load_balancer;
pub mod routing;
pub mod session;

pub use domain::{CameraId, FleetState, SharedFleet, WorkerAddr};
pub use error::{ErrorKind, RouteError};
