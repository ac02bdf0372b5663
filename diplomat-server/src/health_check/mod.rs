//! Active HTTP health checking of announced and confirmed workers.

pub mod prober;

pub use prober::{spawn_reconciler, HttpProbe};
