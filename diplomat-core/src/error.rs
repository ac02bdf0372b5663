//! Request-scoped routing failures.

use crate::domain::worker::AddrError;
use crate::session::{DirectoryError, SessionError};

/// How a routing failure should be reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself was malformed.
    BadRequest,
    /// Missing, invalid or expired credentials.
    Unauthorized,
    /// Nothing matches what was asked for.
    NotFound,
    /// No worker can take the request right now.
    Unavailable,
    /// A collaborator failed.
    Internal,
}

/// Why a request could not be routed to a worker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// The path or query did not carry what the route needs.
    #[error("{0}")]
    BadRequest(String),

    /// An announced worker address was rejected.
    #[error(transparent)]
    BadAddress(#[from] AddrError),

    /// The announce secret did not match.
    #[error("incorrect announce credential")]
    BadCredential,

    /// The viewer session was rejected.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// No camera could be resolved for the viewer.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// The confirmed pool is empty, or the camera has no worker.
    #[error("No server available to process your request!")]
    Unavailable,

    /// Something behind the router failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RouteError {
    /// Classification used to pick a response status.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RouteError::BadRequest(_) | RouteError::BadAddress(_) => ErrorKind::BadRequest,
            RouteError::BadCredential => ErrorKind::Unauthorized,
            RouteError::Session(SessionError::Store(_)) => ErrorKind::Internal,
            RouteError::Session(_) => ErrorKind::Unauthorized,
            RouteError::Directory(DirectoryError::Store(_)) => ErrorKind::Internal,
            RouteError::Directory(_) => ErrorKind::NotFound,
            RouteError::Unavailable => ErrorKind::Unavailable,
            RouteError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to show the client. Internal detail is withheld.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "Internal server error".to_string(),
            ErrorKind::Unauthorized if matches!(self, RouteError::Session(_)) => {
                "Error checking session!".to_string()
            }
            _ => self.to_string(),
        }
    }
}
