//! CONNECT-tunnel termination: accept the TLS handshake under a per-host
//! leaf certificate, dial the real origin once, and multiplex every request
//! seen on the tunnel over that single origin connection -- plain requests
//! are captured into history, WebSocket upgrades are handed to
//! `relay::bridge` after their handshake headers are stripped of
//! `permessage-deflate` (spec §6).

use crate::history::{record, CapturedExchange};
use crate::relay::bridge;
use crate::ProxyState;
use hyper::client::conn::SendRequest;
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::upgrade::Upgraded;
use hyper::{Body, Request, Response, StatusCode};
use rustls::ServerName;
use std::convert::Infallible;
use std::sync::Arc;
use sukyan_common::new_uuid;
use sukyan_types::WsConnection;
use sukyan_ws_interceptor::headers::strip_permessage_deflate;
use sukyan_ws_interceptor::WsInterceptor;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio_rustls::{TlsAcceptor, TlsConnector};

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("certificate issuance failed: {0}")]
    Cert(#[from] crate::cert::CertError),
    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),
    #[error("invalid server name: {0}")]
    InvalidServerName(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(#[from] hyper::Error),
}

pub async fn handle_connect(req: Request<Body>, state: Arc<ProxyState>) -> Response<Body> {
    let authority = match req.uri().authority().cloned() {
        Some(a) => a,
        None => return error_response(StatusCode::BAD_REQUEST, "CONNECT target has no authority"),
    };
    let host = authority.host().to_string();
    let port = authority.port_u16().unwrap_or(443);

    tokio::spawn(async move {
        let log_target = format!("{host}:{port}");
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                if let Err(e) = serve_tunnel(upgraded, host, port, state).await {
                    log::warn!("mitm tunnel for {log_target} ended: {e}");
                }
            }
            Err(e) => log::warn!("failed to take over CONNECT tunnel for {log_target}: {e}"),
        }
    });

    Response::builder().status(StatusCode::OK).body(Body::empty()).unwrap()
}

async fn serve_tunnel(
    upgraded: Upgraded,
    host: String,
    port: u16,
    state: Arc<ProxyState>,
) -> Result<(), ConnectError> {
    let leaf = state.ca.leaf_for_host(&host)?;
    let server_config = Arc::new(
        rustls::ServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(leaf.chain.clone(), leaf.key.clone())?,
    );
    let client_tls = TlsAcceptor::from(server_config).accept(upgraded).await?;

    let tcp = TcpStream::connect((host.as_str(), port)).await?;
    let server_name =
        ServerName::try_from(host.as_str()).map_err(|e| ConnectError::InvalidServerName(e.to_string()))?;
    let origin_tls = TlsConnector::from(state.client_tls.clone()).connect(server_name, tcp).await?;
    let (send_request, connection) = hyper::client::conn::Builder::new().handshake(origin_tls).await?;

    let log_target = format!("{host}:{port}");
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            log::debug!("origin connection for {log_target} closed: {e}");
        }
    });
    let send_request = Arc::new(AsyncMutex::new(send_request));

    let host_for_service = host.clone();
    let service = service_fn(move |req: Request<Body>| {
        let state = state.clone();
        let host = host_for_service.clone();
        let send_request = send_request.clone();
        async move { Ok::<_, Infallible>(handle_tunneled_request(req, host, port, state, send_request).await) }
    });

    Http::new()
        .http1_only(true)
        .serve_connection(client_tls, service)
        .with_upgrades()
        .await?;
    Ok(())
}

async fn handle_tunneled_request(
    req: Request<Body>,
    host: String,
    port: u16,
    state: Arc<ProxyState>,
    send_request: Arc<AsyncMutex<SendRequest<Body>>>,
) -> Response<Body> {
    if is_websocket_upgrade(&req) {
        match handle_websocket_upgrade(req, &host, &state, send_request).await {
            Ok(resp) => resp,
            Err(e) => {
                log::warn!("websocket upgrade to {host}:{port} failed: {e}");
                error_response(StatusCode::BAD_GATEWAY, "websocket upgrade failed")
            }
        }
    } else {
        match forward_plain_request(req, &state, send_request).await {
            Ok(resp) => resp,
            Err(e) => {
                log::warn!("tunneled request to {host}:{port} failed: {e}");
                error_response(StatusCode::BAD_GATEWAY, "upstream request failed")
            }
        }
    }
}

fn is_websocket_upgrade(req: &Request<Body>) -> bool {
    let has_token = |name: hyper::header::HeaderName, token: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
            .unwrap_or(false)
    };
    has_token(hyper::header::CONNECTION, "upgrade") && has_token(hyper::header::UPGRADE, "websocket")
}

async fn forward_plain_request(
    req: Request<Body>,
    state: &Arc<ProxyState>,
    send_request: Arc<AsyncMutex<SendRequest<Body>>>,
) -> Result<Response<Body>, hyper::Error> {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let request_headers = req.headers().clone();
    let (parts, body) = req.into_parts();
    let request_body = hyper::body::to_bytes(body).await?.to_vec();
    let outgoing = Request::from_parts(parts, Body::from(request_body.clone()));

    let response = send_request.lock().await.send_request(outgoing).await?;
    let (resp_parts, resp_body) = response.into_parts();
    let response_body = hyper::body::to_bytes(resp_body).await?.to_vec();

    let exchange = CapturedExchange {
        method,
        uri,
        request_headers,
        request_body,
        response_status: Some(resp_parts.status.as_u16()),
        response_headers: resp_parts.headers.clone(),
        response_body: response_body.clone(),
    };
    record(&state.store, exchange, state.workspace_id.clone(), state.scan_id.clone()).await;

    Ok(Response::from_parts(resp_parts, Body::from(response_body)))
}

async fn handle_websocket_upgrade(
    req: Request<Body>,
    host: &str,
    state: &Arc<ProxyState>,
    send_request: Arc<AsyncMutex<SendRequest<Body>>>,
) -> Result<Response<Body>, ConnectError> {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let stripped = strip_permessage_deflate(&header_pairs(req.headers()));

    let client_upgrade = hyper::upgrade::on(req);

    let mut origin_req = Request::builder().method(method).uri(uri);
    for (name, value) in &stripped {
        origin_req = origin_req.header(name, value);
    }
    let origin_req = origin_req.body(Body::empty()).expect("valid websocket upgrade request");

    let origin_response = send_request.lock().await.send_request(origin_req).await?;

    if origin_response.status() != StatusCode::SWITCHING_PROTOCOLS {
        return Ok(origin_response);
    }

    let response_headers = strip_permessage_deflate(&header_pairs(origin_response.headers()));
    let origin_upgrade = hyper::upgrade::on(origin_response);
    let mut client_response = Response::builder().status(StatusCode::SWITCHING_PROTOCOLS);
    for (name, value) in &response_headers {
        client_response = client_response.header(name, value);
    }
    let client_response = client_response.body(Body::empty()).expect("valid switching-protocols response");

    let store = state.store.clone();
    let workspace_id = state.workspace_id.clone();
    let scan_id = state.scan_id.clone();
    let request_headers = stripped;
    let host = host.to_string();
    tokio::spawn(async move {
        let (client_upgraded, origin_upgraded) = match tokio::try_join!(client_upgrade, origin_upgrade) {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("websocket upgrade handshake to {host} did not complete: {e}");
                return;
            }
        };

        let connection = WsConnection {
            id: sukyan_common::WsConnectionId::new(new_uuid()),
            url: format!("wss://{host}"),
            request_headers,
            response_headers,
            status: Some(101),
            workspace_id,
            scan_id,
            upgrade_history_id: None,
            opened_at: sukyan_common::now_millis(),
            closed_at: None,
        };
        let stored = match store.create_ws_connection(connection).await {
            Ok(stored) => stored,
            Err(e) => {
                log::warn!("failed to persist websocket connection for {host} (continuing): {e}");
                return;
            }
        };
        let connection_id = stored.id.clone();

        let interceptor = Arc::new(WsInterceptor::new(false));
        bridge(client_upgraded, origin_upgraded, interceptor, store.clone(), connection_id).await;

        let closed = WsConnection { closed_at: Some(sukyan_common::now_millis()), ..stored };
        if let Err(e) = store.update_ws_connection(closed).await {
            log::warn!("failed to mark websocket connection closed for {host} (continuing): {e}");
        }
    });

    Ok(client_response)
}

fn header_pairs(headers: &hyper::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| (name.to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
        .collect()
}

fn headers_from_pairs(pairs: &[(String, String)]) -> hyper::HeaderMap {
    let mut map = hyper::HeaderMap::new();
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (
            hyper::header::HeaderName::from_bytes(name.as_bytes()),
            hyper::header::HeaderValue::from_str(value),
        ) {
            map.append(name, value);
        }
    }
    map
}

fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    Response::builder().status(status).body(Body::from(message.to_string())).unwrap()
}
