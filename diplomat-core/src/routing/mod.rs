//! Per-request routers: ingest, viewer and round-robin fallback.

pub mod fallback;
pub mod ingest;
pub mod viewer;

pub use fallback::FallbackRouter;
pub use ingest::IngestRouter;
pub use viewer::ViewerRouter;

/// URL prefix handled by the ingest router.
pub const INGEST_PREFIX: &str = "/ingest/";
/// URL prefix handled by the viewer router.
pub const STREAM_PREFIX: &str = "/stream/";
