//! Server module for handling incoming connections and routing decisions.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dropgate_core::SelectionFilter;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderName, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backends::BackendPool;

/// Response header naming the chosen backend.
pub const BACKEND_HEADER: HeaderName = HeaderName::from_static("x-dropgate-backend");

/// Request header naming a backend that already failed this request.
pub const AVOID_HEADER: HeaderName = HeaderName::from_static("x-dropgate-avoid");

/// What every connection needs to route a request.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Whitelist-aware selection.
    pub filter: Arc<SelectionFilter>,
    /// Backends and their load.
    pub pool: Arc<BackendPool>,
}

/// Starts the proxy server on the given address.
pub async fn start_server(
    addr: SocketAddr,
    state: AppState,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Listening");
    serve(listener, state, shutdown).await
}

/// Accept connections on `listener` until `shutdown` changes.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted.context("failed to accept connection")?,
            _ = shutdown.changed() => return Ok(()),
        };

        let io = TokioIo::new(stream);
        let state = state.clone();
        tokio::task::spawn(async move {
            let service = service_fn(move |req| handle_request(state.clone(), req));
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(%peer, %err, "Error serving connection");
            }
        });
    }
}

/// Routes one request and reports the decision.
async fn handle_request(
    state: AppState,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let uri = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let avoid = req
        .headers()
        .get(&AVOID_HEADER)
        .and_then(|value| value.to_str().ok());

    let ranked = state.pool.ranked();
    let chosen = state
        .filter
        .select_server(req.method().as_str(), uri, &ranked, avoid)
        .cloned();

    let Some(backend) = chosen else {
        debug!(method = %req.method(), uri, "No backend available");
        let mut response = Response::new(Full::new(Bytes::from_static(b"no backend available\n")));
        *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
        return Ok(response);
    };

    let _in_flight = backend.begin_request();
    let mut response = Response::new(Full::new(Bytes::from(format!(
        "routed to {} ({})\n",
        backend.id, backend.addr
    ))));
    if let Ok(value) = HeaderValue::from_str(&backend.id) {
        response.headers_mut().insert(BACKEND_HEADER, value);
    }
    Ok(response)
}
