//! Viewer sessions and the camera directory.
//!
//! Both are owned by an external store in production. The traits here are the
//! contract the viewer router relies on, and [`InMemoryDirectory`] is a
//! complete implementation that can be seeded from a JSON snapshot.

pub mod memory;

use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::domain::worker::CameraId;

pub use memory::{ClassRecord, DirectorySnapshot, InMemoryDirectory, PersonRecord, SessionRecord};

/// Seconds since the Unix epoch.
pub type UnixTime = i64;

/// The current wall-clock time as [`UnixTime`].
pub fn unix_now() -> UnixTime {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as UnixTime)
        .unwrap_or_default()
}

/// What a session holder is allowed to watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Role {
    /// Enrolled viewer; sees the room of the class in session.
    #[serde(rename = "S")]
    Student,
    /// Enrolled viewer; sees the room of the class in session.
    #[serde(rename = "T")]
    Teacher,
    /// May watch any room by naming it.
    #[serde(rename = "A")]
    Admin,
}

impl Role {
    /// Whether the role resolves its camera through the class schedule.
    pub fn is_enrolled(self) -> bool {
        matches!(self, Role::Student | Role::Teacher)
    }
}

impl FromStr for Role {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S" => Ok(Role::Student),
            "T" => Ok(Role::Teacher),
            "A" => Ok(Role::Admin),
            other => Err(SessionError::UnknownRole(other.to_string())),
        }
    }
}

/// Why a session was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No session with that school and token.
    #[error("session not found")]
    NotFound,

    /// The session outlived the maximum age and has been purged.
    #[error("session {token} too old, {overdue_secs} seconds past expiry")]
    Expired {
        /// The expired session token.
        token: String,
        /// How far past the maximum age the session was.
        overdue_secs: i64,
    },

    /// The session's user has no role on record.
    #[error("no role recorded for user '{0}'")]
    NoRole(String),

    /// The store returned a role code this server does not know.
    #[error("unknown role code '{0}'")]
    UnknownRole(String),

    /// The backing store failed.
    #[error("session store error: {0}")]
    Store(String),
}

/// Why no camera could be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// Nothing is scheduled for the session's user right now.
    #[error("no class in session for this viewer")]
    NoActiveClass,

    /// The room has no camera.
    #[error("no camera installed in room '{0}'")]
    UnknownRoom(String),

    /// The backing store failed.
    #[error("directory store error: {0}")]
    Store(String),
}

/// Session expiry rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Sessions older than this are rejected and purged.
    pub max_age: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(30 * 60),
        }
    }
}

impl SessionPolicy {
    /// Seconds past expiry of a session issued at `issued_at`, or `None` if
    /// it is still valid at `now`. A session exactly `max_age` old is valid.
    pub fn overdue_secs(&self, issued_at: UnixTime, now: UnixTime) -> Option<i64> {
        let overdue = now - issued_at - self.max_age.as_secs() as i64;
        (overdue > 0).then_some(overdue)
    }
}

/// Authenticates short-lived viewer sessions.
#[async_trait]
pub trait SessionAuthority: Send + Sync {
    /// Validate the session `token` issued by `school` and return the role of
    /// its holder. Expired sessions are purged as a side effect.
    async fn check_session(
        &self,
        school: &str,
        token: &str,
        now: UnixTime,
    ) -> Result<Role, SessionError>;
}

/// Resolves what a viewer should be watching.
#[async_trait]
pub trait CameraDirectory: Send + Sync {
    /// Camera of the room where the holder of `school`'s session `token`
    /// has a class at `now`.
    async fn camera_for_session(
        &self,
        school: &str,
        token: &str,
        now: UnixTime,
    ) -> Result<CameraId, DirectoryError>;

    /// Camera installed in `room`.
    async fn camera_for_room(&self, room: &str) -> Result<CameraId, DirectoryError>;
}
