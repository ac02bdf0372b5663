//! Worker and camera identifiers.

use std::fmt;
use std::str::FromStr;

use http::uri::Authority;

/// Error returned when an announced worker address cannot be accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddrError {
    /// Nothing was supplied.
    #[error("worker address is empty")]
    Empty,

    /// The value is not a bare `host[:port]` authority.
    #[error("worker address '{0}' is not a valid host[:port]")]
    Malformed(String),
}

/// The network address of a worker, as it announced itself.
///
/// A worker carries no state beyond its address. Ordering is lexicographic
/// and is what breaks ties between equally loaded workers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerAddr(String);

impl WorkerAddr {
    /// Validate and wrap a `host[:port]` authority.
    pub fn parse(raw: &str) -> Result<Self, AddrError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AddrError::Empty);
        }
        // Authority happily accepts userinfo, which has no business in a redirect target.
        if raw.contains(['/', '@', '?', '#']) || raw.chars().any(char::is_whitespace) {
            return Err(AddrError::Malformed(raw.to_string()));
        }
        Authority::from_str(raw).map_err(|_| AddrError::Malformed(raw.to_string()))?;
        Ok(Self(raw.to_string()))
    }

    /// The address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorkerAddr {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Identifier of a camera, either published by an ingest client or looked up
/// for a viewer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CameraId(String);

impl CameraId {
    /// Wrap a camera identifier. Returns `None` for an empty string.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
