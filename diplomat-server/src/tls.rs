//! TLS termination for the redirect server.
//!
//! Loads the PEM certificate chain and PKCS#8 key into a
//! `rustls::ServerConfig` and wraps it in an acceptor.

use pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

/// The certificate or key could not be loaded.
#[derive(Debug, Error)]
pub enum TlsError {
    /// A PEM file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The file being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The key file holds no PKCS#8 private key.
    #[error("no PKCS#8 private key in {0}")]
    NoKey(PathBuf),

    /// rustls rejected the certificate/key pair.
    #[error("invalid certificate or key: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Loads a TLS `ServerConfig` from the given certificate and key paths.
pub fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>, TlsError> {
    let read_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| TlsError::Read { path, source }
    };

    let cert_file = File::open(cert_path).map_err(read_err(cert_path))?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_err(cert_path))?;

    let key_file = File::open(key_path).map_err(read_err(key_path))?;
    let mut key_reader = BufReader::new(key_file);
    let key = rustls_pemfile::pkcs8_private_keys(&mut key_reader)
        .next()
        .ok_or_else(|| TlsError::NoKey(key_path.to_path_buf()))?
        .map(PrivateKeyDer::Pkcs8)
        .map_err(read_err(key_path))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    // The service only speaks HTTP/1.1.
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

/// Build an acceptor from the given certificate and key paths.
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TlsError> {
    load_tls_config(cert_path, key_path).map(TlsAcceptor::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_are_reported() {
        let err = load_tls_config(Path::new("/nonexistent/cert.pem"), Path::new("/nonexistent/key.pem"))
            .unwrap_err();
        match err {
            TlsError::Read { path, .. } => assert_eq!(path, PathBuf::from("/nonexistent/cert.pem")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
