//! Server module for accepting connections and answering with redirects.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use diplomat_core::routing::{FallbackRouter, IngestRouter, ViewerRouter, INGEST_PREFIX, STREAM_PREFIX};
use diplomat_core::session::{CameraDirectory, SessionAuthority};
use diplomat_core::{ErrorKind, RouteError, SharedFleet, WorkerAddr};

/// Path workers announce themselves on.
pub const ANNOUNCE_PATH: &str = "/announce/";

/// Largest announce body read before the credential is checked.
pub const MAX_ANNOUNCE_BODY: usize = 1024;

/// Pause after a failed `accept`, so fd exhaustion does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Everything a request handler needs, shared across connections.
#[derive(Debug)]
pub struct AppState {
    fleet: SharedFleet,
    ingest: IngestRouter,
    viewer: ViewerRouter,
    fallback: FallbackRouter,
    announce_secret: String,
}

impl AppState {
    /// Wire the routers over `fleet`.
    pub fn new(
        fleet: SharedFleet,
        sessions: Arc<dyn SessionAuthority>,
        directory: Arc<dyn CameraDirectory>,
        announce_secret: impl Into<String>,
    ) -> Self {
        Self {
            ingest: IngestRouter::new(Arc::clone(&fleet)),
            viewer: ViewerRouter::new(Arc::clone(&fleet), sessions, directory),
            fallback: FallbackRouter::new(Arc::clone(&fleet)),
            fleet,
            announce_secret: announce_secret.into(),
        }
    }
}

/// Accepts connections from an already bound listener for as long as the
/// process runs. Failed accepts are logged and retried.
pub async fn serve(listener: TcpListener, tls_acceptor: Option<TlsAcceptor>, state: Arc<AppState>) {
    let listener = &listener;
    accept_loop(move || listener.accept(), tls_acceptor, state).await
}

async fn accept_loop<F, Fut>(mut accept: F, tls_acceptor: Option<TlsAcceptor>, state: Arc<AppState>)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<(TcpStream, SocketAddr)>>,
{
    loop {
        let (stream, peer) = match accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        let state = Arc::clone(&state);

        if let Some(acceptor) = &tls_acceptor {
            let acceptor = acceptor.clone();
            tokio::task::spawn(async move {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => serve_connection(tls_stream, state).await,
                    Err(e) => debug!(%peer, "TLS handshake failed: {}", e),
                }
            });
        } else {
            // Unencrypted fallback
            tokio::task::spawn(serve_connection(stream, state));
        }
    }
}

async fn serve_connection<S>(stream: S, state: Arc<AppState>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| handle_request(req, Arc::clone(&state)));
    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
        debug!("Error serving connection: {:?}", err);
    }
}

/// Dispatches a request by URL prefix and turns the outcome into a response.
async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let path = req.uri().path().to_string();
    let request_uri = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    debug!(method = %req.method(), uri = %request_uri, "request received");

    let outcome = if path == ANNOUNCE_PATH || path == "/announce" {
        announce(req, &state).await.map(|()| announced())
    } else {
        let routed = if path.starts_with(INGEST_PREFIX) {
            state.ingest.route(&path)
        } else if path.starts_with(STREAM_PREFIX) {
            state.viewer.route(&path).await
        } else {
            state.fallback.next()
        };
        routed.map(|worker| redirect(&worker, &request_uri))
    };

    let mut response = outcome.unwrap_or_else(|e| error_response(&e));
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    Ok(response)
}

/// Registers the worker in the `url` query parameter; the body is the secret.
async fn announce<B>(req: Request<B>, state: &AppState) -> Result<(), RouteError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let raw_addr = req
        .uri()
        .query()
        .and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == "url")
                .map(|(_, v)| v.into_owned())
        })
        .ok_or_else(|| RouteError::BadRequest("Incorrect parameters given!".to_string()))?;

    let body = Limited::new(req.into_body(), MAX_ANNOUNCE_BODY)
        .collect()
        .await
        .map_err(|e| {
            warn!("Could not read body from announce request: {}", e);
            RouteError::BadRequest("Could not read body from announce request!".to_string())
        })?
        .to_bytes();

    if !constant_time_eq(&body, state.announce_secret.as_bytes()) {
        warn!(worker = %raw_addr, "announce rejected: bad credential");
        return Err(RouteError::BadCredential);
    }

    let addr = WorkerAddr::parse(&raw_addr)?;
    if state.fleet.announce(addr.clone()) {
        info!(worker = %addr, "worker announced");
    }
    Ok(())
}

/// Byte comparison whose duration does not depend on where the inputs differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn redirect(worker: &WorkerAddr, request_uri: &str) -> Response<Full<Bytes>> {
    let location = format!("https://{}{}", worker, request_uri);
    match HeaderValue::from_str(&location) {
        Ok(value) => {
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::TEMPORARY_REDIRECT;
            response.headers_mut().insert(header::LOCATION, value);
            response
        }
        Err(e) => error_response(&RouteError::Internal(format!("bad redirect target {location}: {e}"))),
    }
}

fn announced() -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, json!({ "status": true }))
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `{"status": false, "err": ...}` with a status matching the failure.
fn error_response(err: &RouteError) -> Response<Full<Bytes>> {
    let kind = err.kind();
    match kind {
        ErrorKind::Internal => error!("request failed: {}", err),
        _ => debug!("request not routed: {}", err),
    }
    json_response(status_for(kind), json!({ "status": false, "err": err.public_message() }))
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
