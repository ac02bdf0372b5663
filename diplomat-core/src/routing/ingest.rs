//! Routing for ingest clients publishing a camera.

use tracing::debug;

use crate::domain::fleet::SharedFleet;
use crate::domain::worker::{CameraId, WorkerAddr};
use crate::error::RouteError;
use crate::routing::INGEST_PREFIX;

/// Extract the camera id from an ingest path.
///
/// The camera is everything between the `/ingest/` prefix and the final path
/// segment, so `/ingest/room-12/seg-0042.ts` publishes `room-12`.
pub fn camera_from_path(path: &str) -> Result<CameraId, RouteError> {
    let rest = path
        .strip_prefix(INGEST_PREFIX)
        .ok_or_else(|| RouteError::BadRequest(format!("not an ingest path: {path}")))?;
    let camera = rest.rfind('/').map(|i| &rest[..i]).unwrap_or_default();
    CameraId::new(camera).ok_or_else(|| RouteError::BadRequest("missing camera id".to_string()))
}

/// Binds cameras to workers on first publish.
#[derive(Debug, Clone)]
pub struct IngestRouter {
    fleet: SharedFleet,
}

impl IngestRouter {
    /// Create a router over `fleet`.
    pub fn new(fleet: SharedFleet) -> Self {
        Self { fleet }
    }

    /// Worker for the camera named in `path`, assigning one if needed.
    pub fn route(&self, path: &str) -> Result<WorkerAddr, RouteError> {
        let camera = camera_from_path(path)?;
        self.resolve_or_assign(&camera)
    }

    /// Worker for `camera`, assigning the least-loaded one if needed.
    pub fn resolve_or_assign(&self, camera: &CameraId) -> Result<WorkerAddr, RouteError> {
        let worker = self.fleet.resolve_or_assign(camera).ok_or(RouteError::Unavailable)?;
        debug!(camera = %camera, worker = %worker, "ingest routed");
        Ok(worker)
    }
}
