//! Server configuration from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use diplomat_core::session::SessionPolicy;
use thiserror::Error;

/// A configuration value was missing or unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} must be set")]
    Missing(&'static str),

    /// A variable could not be parsed.
    #[error("invalid value for {var}: '{value}'")]
    Invalid {
        /// The variable name.
        var: &'static str,
        /// The rejected value.
        value: String,
    },

    /// The probe timeout would let a sweep overrun its interval.
    #[error("probe timeout ({timeout:?}) must be shorter than the reconcile interval ({interval:?})")]
    ProbeTimeoutTooLong {
        /// Configured probe timeout.
        timeout: Duration,
        /// Configured reconcile interval.
        interval: Duration,
    },
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the redirect server listens on.
    pub listen_addr: SocketAddr,
    /// Certificate and key paths, or `None` to serve plaintext.
    pub tls: Option<TlsPaths>,
    /// Shared secret workers present when announcing.
    pub announce_secret: String,
    /// Period between health sweeps.
    pub reconcile_interval: Duration,
    /// Upper bound on a single liveness probe.
    pub probe_timeout: Duration,
    /// Path requested on each worker by the liveness probe.
    pub liveness_path: String,
    /// JSON snapshot seeding the session directory.
    pub directory_path: Option<PathBuf>,
    /// Viewer sessions older than this are rejected.
    pub session_max_age: Duration,
}

/// Location of the PEM certificate chain and private key.
#[derive(Debug, Clone)]
pub struct TlsPaths {
    /// Certificate chain.
    pub cert: PathBuf,
    /// PKCS#8 private key.
    pub key: PathBuf,
}

impl Config {
    /// Read configuration from `DIPLOMAT_*` environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `DIPLOMAT_LISTEN_ADDR` | `0.0.0.0:443` |
    /// | `DIPLOMAT_PLAINTEXT` | unset (TLS on) |
    /// | `DIPLOMAT_TLS_CERT` / `DIPLOMAT_TLS_KEY` | `public.crt` / `private.key` |
    /// | `DIPLOMAT_ANNOUNCE_SECRET` | required |
    /// | `DIPLOMAT_RECONCILE_INTERVAL_MS` | `5000` |
    /// | `DIPLOMAT_PROBE_TIMEOUT_MS` | `2000` |
    /// | `DIPLOMAT_LIVENESS_PATH` | `/` |
    /// | `DIPLOMAT_DIRECTORY_PATH` | unset |
    /// | `DIPLOMAT_SESSION_MAX_AGE_SECS` | `1800` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen_addr = parse_or(&lookup, "DIPLOMAT_LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 443)))?;

        let plaintext = lookup("DIPLOMAT_PLAINTEXT")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let tls = (!plaintext).then(|| TlsPaths {
            cert: lookup("DIPLOMAT_TLS_CERT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public.crt")),
            key: lookup("DIPLOMAT_TLS_KEY")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("private.key")),
        });

        let announce_secret = lookup("DIPLOMAT_ANNOUNCE_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("DIPLOMAT_ANNOUNCE_SECRET"))?;

        let reconcile_interval =
            Duration::from_millis(parse_or(&lookup, "DIPLOMAT_RECONCILE_INTERVAL_MS", 5000u64)?);
        let probe_timeout = Duration::from_millis(parse_or(&lookup, "DIPLOMAT_PROBE_TIMEOUT_MS", 2000u64)?);
        if reconcile_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "DIPLOMAT_RECONCILE_INTERVAL_MS",
                value: "0".to_string(),
            });
        }
        if probe_timeout >= reconcile_interval {
            return Err(ConfigError::ProbeTimeoutTooLong {
                timeout: probe_timeout,
                interval: reconcile_interval,
            });
        }

        let liveness_path = lookup("DIPLOMAT_LIVENESS_PATH").unwrap_or_else(|| "/".to_string());
        if !liveness_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                var: "DIPLOMAT_LIVENESS_PATH",
                value: liveness_path,
            });
        }

        let session_max_age =
            Duration::from_secs(parse_or(&lookup, "DIPLOMAT_SESSION_MAX_AGE_SECS", 30 * 60u64)?);

        Ok(Self {
            listen_addr,
            tls,
            announce_secret,
            reconcile_interval,
            probe_timeout,
            liveness_path,
            directory_path: lookup("DIPLOMAT_DIRECTORY_PATH").map(PathBuf::from),
            session_max_age,
        })
    }

    /// Session expiry rules for the directory.
    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            max_age: self.session_max_age,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[("DIPLOMAT_ANNOUNCE_SECRET", "s3cret")]).unwrap();
        assert_eq!(cfg.listen_addr, SocketAddr::from(([0, 0, 0, 0], 443)));
        assert_eq!(cfg.reconcile_interval, Duration::from_secs(5));
        assert_eq!(cfg.probe_timeout, Duration::from_secs(2));
        assert_eq!(cfg.liveness_path, "/");
        assert_eq!(cfg.tls.as_ref().unwrap().cert, PathBuf::from("public.crt"));
        assert!(cfg.directory_path.is_none());
        assert_eq!(cfg.session_policy(), SessionPolicy::default());
    }

    #[test]
    fn session_age_is_configurable() {
        let cfg = config(&[
            ("DIPLOMAT_ANNOUNCE_SECRET", "s"),
            ("DIPLOMAT_SESSION_MAX_AGE_SECS", "600"),
        ])
        .unwrap();
        assert_eq!(cfg.session_policy().max_age, Duration::from_secs(600));
    }

    #[test]
    fn secret_is_required() {
        assert!(matches!(config(&[]), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn plaintext_disables_tls() {
        let cfg = config(&[("DIPLOMAT_ANNOUNCE_SECRET", "s"), ("DIPLOMAT_PLAINTEXT", "true")]).unwrap();
        assert!(cfg.tls.is_none());
    }

    #[test]
    fn probe_timeout_must_fit_the_interval() {
        let err = config(&[
            ("DIPLOMAT_ANNOUNCE_SECRET", "s"),
            ("DIPLOMAT_RECONCILE_INTERVAL_MS", "1000"),
            ("DIPLOMAT_PROBE_TIMEOUT_MS", "1000"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::ProbeTimeoutTooLong { .. }));
    }

    #[test]
    fn rejects_garbage() {
        let err = config(&[("DIPLOMAT_ANNOUNCE_SECRET", "s"), ("DIPLOMAT_LISTEN_ADDR", "nowhere")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "DIPLOMAT_LISTEN_ADDR", .. }));
    }
}
