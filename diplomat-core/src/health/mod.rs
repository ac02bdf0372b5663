//! Periodic health reconciliation of the worker pool.

pub mod reconciler;

pub use reconciler::{HealthProbe, Reconciler};
