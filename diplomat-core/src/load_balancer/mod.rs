//! Worker selection strategies.

pub mod least_loaded;
pub mod round_robin;

pub use least_loaded::{load_by_worker, select_least_loaded};
pub use round_robin::RoundRobinCursor;
