//! Diplomat
//!
//! Redirects camera ingest, viewer and generic traffic to a health-checked
//! pool of workers.
//!
//! ## Usage
//!
//! ```bash
//! DIPLOMAT_ANNOUNCE_SECRET=... diplomat
//!
//! # Plaintext on a custom port, with a seeded session directory
//! DIPLOMAT_PLAINTEXT=1 DIPLOMAT_LISTEN_ADDR=0.0.0.0:8080 \
//!   DIPLOMAT_DIRECTORY_PATH=./directory.json diplomat
//! ```

#![deny(missing_docs)]

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use diplomat_core::health::Reconciler;
use diplomat_core::FleetState;
use diplomat_server::config::Config;
use diplomat_server::health_check::{spawn_reconciler, HttpProbe};
use diplomat_server::server::{self, AppState};
use diplomat_server::{load_directory, tls, StartupError};

/// Loads configuration and credentials, starts the reconciler, then serves
/// until the listener fails or the process is interrupted.
#[tokio::main]
async fn main() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("diplomat=info,diplomat_core=info,diplomat_server=info")),
        )
        .init();

    let config = Config::from_env()?;

    info!("Diplomat starting");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Reconcile interval: {:?}", config.reconcile_interval);
    info!("  Probe timeout: {:?}", config.probe_timeout);
    info!("  Session max age: {:?}", config.session_max_age);

    let tls_acceptor = match &config.tls {
        Some(paths) => Some(tls::load_acceptor(&paths.cert, &paths.key)?),
        None => {
            info!("  TLS disabled, serving plaintext");
            None
        }
    };

    let directory = load_directory(config.directory_path.as_deref(), config.session_policy())?;

    let fleet = Arc::new(FleetState::new());
    let probe = HttpProbe::new(config.probe_timeout, config.liveness_path.clone());
    spawn_reconciler(Reconciler::new(Arc::clone(&fleet), probe), config.reconcile_interval);

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: config.listen_addr,
            source,
        })?;
    info!("Listening on {}", config.listen_addr);

    let state = Arc::new(AppState::new(
        fleet,
        directory.clone(),
        directory,
        config.announce_secret.clone(),
    ));

    tokio::select! {
        () = server::serve(listener, tls_acceptor, state) => {}
        result = tokio::signal::ctrl_c() => {
            result.map_err(StartupError::Signal)?;
            info!("Interrupted");
        }
    }

    info!("Shutting down.");
    Ok(())
}
