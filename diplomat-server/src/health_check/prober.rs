//! Background prober for HTTP liveness checks.

use std::time::Duration;

use async_trait::async_trait;
use http_body_util::Empty;
use hyper::body::Bytes;
use hyper::{StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use diplomat_core::health::{HealthProbe, Reconciler};
use diplomat_core::WorkerAddr;

/// Issues `GET http://<worker><liveness_path>` and expects a 200.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client<HttpConnector, Empty<Bytes>>,
    timeout: Duration,
    liveness_path: String,
}

impl HttpProbe {
    /// Create a probe bounded by `timeout` per request.
    pub fn new(timeout: Duration, liveness_path: impl Into<String>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));

        Self {
            client: Client::builder(TokioExecutor::new()).build(connector),
            timeout,
            liveness_path: liveness_path.into(),
        }
    }

    fn uri(&self, addr: &WorkerAddr) -> Result<Uri, hyper::http::uri::InvalidUri> {
        format!("http://{}{}", addr, self.liveness_path).parse()
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn is_alive(&self, addr: &WorkerAddr) -> bool {
        let uri = match self.uri(addr) {
            Ok(uri) => uri,
            Err(e) => {
                warn!(worker = %addr, "cannot build liveness URI: {}", e);
                return false;
            }
        };

        match time::timeout(self.timeout, self.client.get(uri)).await {
            Ok(Ok(response)) if response.status() == StatusCode::OK => true,
            Ok(Ok(response)) => {
                warn!(worker = %addr, status = %response.status(), "worker reported unhealthy");
                false
            }
            Ok(Err(e)) => {
                warn!(worker = %addr, "liveness probe failed: {}", e);
                false
            }
            Err(_) => {
                warn!(worker = %addr, timeout = ?self.timeout, "liveness probe timed out");
                false
            }
        }
    }
}

/// Spawns a background Tokio task that sweeps the fleet every `interval`,
/// starting immediately. The task runs until the runtime shuts down.
pub fn spawn_reconciler<P: HealthProbe>(reconciler: Reconciler<P>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        // A slow sweep pushes the next one back rather than bunching them up.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let report = reconciler.sweep().await;
            debug!(
                confirmed = report.confirmed.len(),
                evicted = report.evicted.len(),
                "reconciliation sweep complete"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response};
    use hyper_util::rt::TokioIo;
    use diplomat_core::{CameraId, FleetState};
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn spawn_worker(status: StatusCode) -> WorkerAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let service = service_fn(move |_req: Request<hyper::body::Incoming>| async move {
                        let mut response = Response::new(Full::new(Bytes::new()));
                        *response.status_mut() = status;
                        Ok::<_, Infallible>(response)
                    });
                    let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
                });
            }
        });
        WorkerAddr::parse(&addr.to_string()).unwrap()
    }

    /// Answers from a flag instead of the network, so the clock can be paused.
    struct FlagProbe(Arc<AtomicBool>);

    #[async_trait]
    impl HealthProbe for FlagProbe {
        async fn is_alive(&self, _addr: &WorkerAddr) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reconciler_sweeps_on_every_tick() {
        let interval = Duration::from_secs(5);
        let alive = Arc::new(AtomicBool::new(true));
        let fleet = Arc::new(FleetState::new());
        let worker = WorkerAddr::parse("w1:443").unwrap();

        let handle = spawn_reconciler(
            Reconciler::new(Arc::clone(&fleet), FlagProbe(Arc::clone(&alive))),
            interval,
        );

        // Let the immediate first tick pass with nothing to probe.
        time::sleep(Duration::from_millis(100)).await;
        fleet.announce(worker.clone());
        assert!(fleet.confirmed_snapshot().is_empty());

        time::sleep(interval).await;
        assert_eq!(*fleet.confirmed_snapshot(), vec![worker.clone()]);
        assert!(fleet.announced_snapshot().is_empty());
        let camera = CameraId::new("c1").unwrap();
        assert_eq!(fleet.resolve_or_assign(&camera), Some(worker));

        alive.store(false, Ordering::SeqCst);
        time::sleep(interval).await;
        assert!(fleet.confirmed_snapshot().is_empty());
        assert_eq!(fleet.assignment_for(&camera), None);

        handle.abort();
    }

    #[tokio::test]
    async fn ok_means_alive() {
        let worker = spawn_worker(StatusCode::OK).await;
        let probe = HttpProbe::new(Duration::from_secs(1), "/");
        assert!(probe.is_alive(&worker).await);
    }

    #[tokio::test]
    async fn other_statuses_mean_dead() {
        let worker = spawn_worker(StatusCode::SERVICE_UNAVAILABLE).await;
        let probe = HttpProbe::new(Duration::from_secs(1), "/");
        assert!(!probe.is_alive(&worker).await);
    }

    #[tokio::test]
    async fn unreachable_means_dead() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = HttpProbe::new(Duration::from_millis(500), "/");
        assert!(!probe.is_alive(&WorkerAddr::parse(&addr.to_string()).unwrap()).await);
    }

    #[tokio::test]
    async fn silent_worker_times_out() {
        // Accepts but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let probe = HttpProbe::new(Duration::from_millis(200), "/");
        let started = std::time::Instant::now();
        assert!(!probe.is_alive(&WorkerAddr::parse(&addr.to_string()).unwrap()).await);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
