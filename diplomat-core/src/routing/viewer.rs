//! Routing for authenticated viewers.
//!
//! A viewer path looks like `/stream/<school>/<token>/<room>/<file>`. Students
//! and teachers are sent to the camera of the class they are in right now;
//! admins name the room directly. Either way the camera must already be
//! bound to a worker by its ingest client; this router never assigns.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::fleet::SharedFleet;
use crate::domain::worker::{CameraId, WorkerAddr};
use crate::error::RouteError;
use crate::routing::STREAM_PREFIX;
use crate::session::{unix_now, CameraDirectory, Role, SessionAuthority, UnixTime};

/// The parts of a viewer path the router needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerPath<'a> {
    /// School that issued the session.
    pub school: &'a str,
    /// Session token.
    pub token: &'a str,
    /// Room named by the path, if it has one.
    pub room: Option<&'a str>,
}

impl<'a> ViewerPath<'a> {
    /// Split a `/stream/...` path.
    pub fn parse(path: &'a str) -> Result<Self, RouteError> {
        let rest = path
            .strip_prefix(STREAM_PREFIX)
            .ok_or_else(|| RouteError::BadRequest(format!("not a stream path: {path}")))?;
        let segments: Vec<&str> = rest.split('/').collect();

        if segments.len() < 3 || segments[0].is_empty() || segments[1].is_empty() {
            return Err(RouteError::BadRequest(
                "expected /stream/<school>/<session>/...".to_string(),
            ));
        }

        // The room is the directory holding the requested file.
        let room = (segments.len() >= 4)
            .then(|| segments[segments.len() - 2])
            .filter(|r| !r.is_empty());

        Ok(Self {
            school: segments[0],
            token: segments[1],
            room,
        })
    }
}

/// Looks up the worker already serving a viewer's camera.
#[derive(Clone)]
pub struct ViewerRouter {
    fleet: SharedFleet,
    sessions: Arc<dyn SessionAuthority>,
    directory: Arc<dyn CameraDirectory>,
}

impl std::fmt::Debug for ViewerRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerRouter").field("fleet", &self.fleet).finish_non_exhaustive()
    }
}

impl ViewerRouter {
    /// Create a router over `fleet` backed by the given collaborators.
    pub fn new(
        fleet: SharedFleet,
        sessions: Arc<dyn SessionAuthority>,
        directory: Arc<dyn CameraDirectory>,
    ) -> Self {
        Self {
            fleet,
            sessions,
            directory,
        }
    }

    /// Route a viewer request at the current time.
    pub async fn route(&self, path: &str) -> Result<WorkerAddr, RouteError> {
        self.route_at(path, unix_now()).await
    }

    /// Route a viewer request as of `now`.
    pub async fn route_at(&self, path: &str, now: UnixTime) -> Result<WorkerAddr, RouteError> {
        let viewer = ViewerPath::parse(path)?;

        let role = self
            .sessions
            .check_session(viewer.school, viewer.token, now)
            .await
            .inspect_err(|e| warn!(school = viewer.school, "session rejected: {}", e))?;

        let camera = self.camera_for(role, &viewer, now).await?;
        let worker = self.fleet.assignment_for(&camera).ok_or(RouteError::Unavailable)?;

        debug!(camera = %camera, worker = %worker, ?role, "viewer routed");
        Ok(worker)
    }

    async fn camera_for(
        &self,
        role: Role,
        viewer: &ViewerPath<'_>,
        now: UnixTime,
    ) -> Result<CameraId, RouteError> {
        if role.is_enrolled() {
            return Ok(self.directory.camera_for_session(viewer.school, viewer.token, now).await?);
        }

        let room = viewer
            .room
            .ok_or_else(|| RouteError::BadRequest("missing room".to_string()))?;
        Ok(self.directory.camera_for_room(room).await?)
    }
}
