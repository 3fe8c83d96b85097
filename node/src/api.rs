use std::convert::Infallible;

use chordal_lib::NodeId;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::error::Result;
use crate::network_client::NetworkClient;
use crate::node::ChordNode;
use crate::stabilizer::shutdown_requested;

fn format_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> Response<Full<Bytes>> {
    format_response(status, json!({ "error": message.to_string() }).to_string())
}

fn ping() -> Response<Full<Bytes>> {
    format_response(StatusCode::OK, json!({ "message": "pong" }).to_string())
}

fn state<T: NetworkClient>(node: &ChordNode<T>) -> Response<Full<Bytes>> {
    match serde_json::to_string(&node.snapshot()) {
        Ok(body) => format_response(StatusCode::OK, body),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

fn lookup_key(query: Option<&str>) -> Option<NodeId> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("key="))
        .and_then(|value| value.parse().ok())
}

async fn lookup<T: NetworkClient>(node: &ChordNode<T>, query: Option<&str>) -> Response<Full<Bytes>> {
    let Some(key) = lookup_key(query) else {
        return error_response(StatusCode::BAD_REQUEST, "expected ?key=<integer id>");
    };
    match node.find_successor(key).await {
        Ok(owner) => format_response(
            StatusCode::OK,
            json!({ "key": key, "id": owner.id, "address": owner.address }).to_string(),
        ),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e),
    }
}

/// Routes one request. Kept free of hyper's body type so it can be driven directly.
pub async fn route<T: NetworkClient>(
    node: &ChordNode<T>,
    method: &Method,
    path: &str,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/ping") => ping(),
        (&Method::GET, "/state") => state(node),
        (&Method::GET, "/lookup") => lookup(node, query).await,
        _ => error_response(StatusCode::NOT_FOUND, "Not Found"),
    }
}

async fn handler<T: NetworkClient>(
    node: ChordNode<T>,
    req: Request<hyper::body::Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    Ok(route(&node, req.method(), req.uri().path(), req.uri().query()).await)
}

/// Serves the read-only HTTP API until shutdown is requested.
pub async fn run<T: NetworkClient>(
    node: ChordNode<T>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    log_info!(
        node.info.address,
        "API is listening on http://{}",
        listener.local_addr()?
    );
    loop {
        let (tcp, _) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(connection) => connection,
                Err(e) => {
                    log_error!(node.info.address, "Failed to accept API connection: {}", e);
                    continue;
                }
            },
            _ = shutdown_requested(&mut shutdown) => break,
        };
        let io = TokioIo::new(tcp);
        let node = node.clone();
        tokio::task::spawn(async move {
            let address = node.info.address.clone();
            let service = service_fn(move |req| handler(node.clone(), req));
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                log_error!(address, "Error serving API connection: {:?}", err);
            }
        });
    }
    Ok(())
}
