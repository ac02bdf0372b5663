//! Diplomat redirect engine.
//!
//! The Tokio/hyper front end that answers every request with a temporary
//! redirect to a worker, plus the background reconciler that keeps the worker
//! pool honest.

pub mod config;
pub mod health_check;
pub mod server;
pub mod tls;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use diplomat_core::session::{DirectorySnapshot, InMemoryDirectory, SessionPolicy};

/// Conditions that stop the process before it serves anything.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Configuration was missing or invalid.
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    /// The certificate or key could not be loaded.
    #[error(transparent)]
    Tls(#[from] tls::TlsError),

    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: std::net::SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The interrupt handler could not be installed.
    #[error("failed to listen for interrupts: {0}")]
    Signal(#[source] std::io::Error),

    /// The directory snapshot could not be read.
    #[error("failed to read directory snapshot {path}: {source}")]
    DirectoryRead {
        /// Snapshot path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The directory snapshot is not valid JSON.
    #[error("failed to parse directory snapshot {path}: {source}")]
    DirectoryParse {
        /// Snapshot path.
        path: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// Load the session directory from a JSON snapshot, or start empty.
pub fn load_directory(
    path: Option<&Path>,
    policy: SessionPolicy,
) -> Result<Arc<InMemoryDirectory>, StartupError> {
    let directory = InMemoryDirectory::new().with_policy(policy);
    let Some(path) = path else {
        return Ok(Arc::new(directory));
    };

    let raw = std::fs::read_to_string(path).map_err(|source| StartupError::DirectoryRead {
        path: path.display().to_string(),
        source,
    })?;
    let snapshot: DirectorySnapshot =
        serde_json::from_str(&raw).map_err(|source| StartupError::DirectoryParse {
            path: path.display().to_string(),
            source,
        })?;

    Ok(Arc::new(directory.seeded(snapshot)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use diplomat_core::session::{Role, SessionAuthority, SessionError};
    use std::time::Duration;

    #[tokio::test]
    async fn no_snapshot_means_empty_directory() {
        let directory = load_directory(None, SessionPolicy::default()).unwrap();
        assert_eq!(
            directory.check_session("n", "anything", 0).await,
            Err(SessionError::NotFound)
        );
    }

    #[test]
    fn unreadable_snapshot_is_fatal() {
        let err = load_directory(Some(Path::new("/nonexistent/directory.json")), SessionPolicy::default())
            .unwrap_err();
        assert!(matches!(err, StartupError::DirectoryRead { .. }));
    }

    #[tokio::test]
    async fn snapshot_is_loaded_under_the_policy() {
        let path = std::env::temp_dir().join(format!("diplomat-directory-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{
                "sessions": [{"school": "n", "token": "t1", "user": "u", "issued_at": 0}],
                "people": [{"school": "n", "user": "u", "role": "T"}]
            }"#,
        )
        .unwrap();

        let policy = SessionPolicy {
            max_age: Duration::from_secs(10),
        };
        let directory = load_directory(Some(&path), policy).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(directory.check_session("n", "t1", 10).await, Ok(Role::Teacher));
        assert!(matches!(
            directory.check_session("n", "t1", 11).await,
            Err(SessionError::Expired { .. })
        ));
    }

    #[test]
    fn malformed_snapshot_is_fatal() {
        let path = std::env::temp_dir().join(format!("diplomat-bad-{}.json", std::process::id()));
        std::fs::write(&path, "{not json").unwrap();

        let err = load_directory(Some(&path), SessionPolicy::default()).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, StartupError::DirectoryParse { .. }));
    }
}
