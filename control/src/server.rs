//! Debug HTTP server
//!
//! Serves controller health, Prometheus metrics and a JSON view of the most
//! recently published DAG.
//!
//! | Path              | Body                                   |
//! |-------------------|----------------------------------------|
//! | `/healthz`        | `ok`                                   |
//! | `/metrics`        | Prometheus text format                 |
//! | `/debug/dag`      | DAG and diagnostics as JSON            |
//! | `/debug/clusters` | generated cluster names, one per line  |

use crate::apis::metrics::gather_controller_metrics;
use crate::dag::BuildOutcome;
use crate::error::SiltaError;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Debug server
pub struct DebugServer {
    bind_addr: String,
    dag: watch::Receiver<Arc<BuildOutcome>>,
}

impl DebugServer {
    pub fn new(bind_addr: String, dag: watch::Receiver<Arc<BuildOutcome>>) -> Self {
        Self { bind_addr, dag }
    }

    /// Accept connections until the listener fails
    pub async fn serve(self) -> Result<(), SiltaError> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        info!("Debug server listening on {}", self.bind_addr);

        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Accept error on {}: {}", self.bind_addr, e);
                    continue;
                }
            };
            debug!("Accepted debug connection from {}", peer_addr);

            let dag = self.dag.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let response = handle_request(&req, &dag);
                    async move { Ok::<_, Infallible>(response) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Connection error: {}", e);
                }
            });
        }
    }
}

/// Route a debug request
pub fn handle_request<B>(
    req: &Request<B>,
    dag: &watch::Receiver<Arc<BuildOutcome>>,
) -> Response<Full<Bytes>> {
    if req.method() != Method::GET {
        return text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n".to_string());
    }

    match req.uri().path() {
        "/healthz" => text(StatusCode::OK, "ok\n".to_string()),
        "/metrics" => match gather_controller_metrics() {
            Ok(body) => text(StatusCode::OK, body),
            Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, e),
        },
        "/debug/dag" => {
            let outcome = dag.borrow().clone();
            match serde_json::to_string_pretty(outcome.as_ref()) {
                Ok(body) => respond(StatusCode::OK, "application/json", body),
                Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            }
        }
        "/debug/clusters" => {
            let outcome = dag.borrow().clone();
            let body: String = outcome
                .dag
                .clusters()
                .keys()
                .map(|name| format!("{}\n", name))
                .collect();
            text(StatusCode::OK, body)
        }
        _ => text(StatusCode::NOT_FOUND, "not found\n".to_string()),
    }
}

fn text(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    respond(status, "text/plain; charset=utf-8", body)
}

fn respond(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
