//! The MITM interception server from spec §6: a CONNECT-capable HTTP proxy
//! that issues per-host leaf certificates off a self-signed root, serves
//! that root at the fixed `sukyan` virtual host, records every exchange it
//! sees into the shared `Store`, and taps WebSocket traffic through
//! `sukyan-ws-interceptor` without rewriting it.

pub mod cert;
pub mod connect;
pub mod history;
pub mod plain;
pub mod relay;
pub mod tls;
pub mod vhost;

use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Request, Response, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use sukyan_common::{ScanId, WorkspaceId};
use sukyan_config::ProxyConfig;
use sukyan_store::Store;
use tokio::net::TcpListener;

pub use cert::{CertAuthority, CertError};

/// Shared, cloneable state handed to every connection the proxy accepts.
pub struct ProxyState {
    pub ca: Arc<CertAuthority>,
    pub store: Arc<dyn Store>,
    pub config: ProxyConfig,
    pub client_tls: Arc<rustls::ClientConfig>,
    pub plain_client: hyper::Client<hyper::client::HttpConnector>,
    pub workspace_id: Option<WorkspaceId>,
    pub scan_id: Option<ScanId>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("failed to generate the root certificate authority: {0}")]
    Cert(#[from] cert::CertError),
    #[error("failed to bind {0}: {1}")]
    Bind(SocketAddr, std::io::Error),
}

pub struct ProxyServer {
    state: Arc<ProxyState>,
}

impl ProxyServer {
    /// Generates a fresh root CA and builds the server. `organization` names
    /// the CA's subject; `ca_validity_days` bounds both the root and every
    /// leaf it signs.
    pub fn new(
        config: ProxyConfig,
        store: Arc<dyn Store>,
        organization: &str,
        ca_validity_days: u32,
        workspace_id: Option<WorkspaceId>,
        scan_id: Option<ScanId>,
    ) -> Result<Self, ProxyError> {
        let ca = Arc::new(CertAuthority::generate(organization, ca_validity_days)?);
        let state = Arc::new(ProxyState {
            ca,
            store,
            config,
            client_tls: tls::client_config(),
            plain_client: hyper::Client::new(),
            workspace_id,
            scan_id,
        });
        Ok(Self { state })
    }

    pub fn ca(&self) -> &Arc<CertAuthority> {
        &self.state.ca
    }

    pub async fn run(&self) -> Result<(), ProxyError> {
        let addr: SocketAddr = format!("{}:{}", self.state.config.bind_address, self.state.config.port)
            .parse()
            .expect("proxy bind address and port form a valid socket address");
        let listener = TcpListener::bind(addr).await.map_err(|e| ProxyError::Bind(addr, e))?;
        log::info!("sukyan proxy listening on {addr} (vhost={})", self.state.config.vhost);

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    log::warn!("failed to accept proxy connection: {e}");
                    continue;
                }
            };
            let state = self.state.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| root_service(req, state.clone()));
                if let Err(e) = Http::new().serve_connection(stream, service).with_upgrades().await {
                    log::debug!("proxy connection from {peer} closed: {e}");
                }
            });
        }
    }
}

async fn root_service(req: Request<Body>, state: Arc<ProxyState>) -> Result<Response<Body>, Infallible> {
    if req.method() == hyper::Method::CONNECT {
        return Ok(connect::handle_connect(req, state).await);
    }

    if is_for_vhost(&req, &state.config.vhost) {
        return Ok(vhost::handle(req.uri().path(), &state.ca));
    }

    if req.uri().authority().is_none() {
        return Ok(Response::builder()
            .status(StatusCode::BAD_REQUEST)
            .body(Body::from("expected an absolute-URI proxy request"))
            .unwrap());
    }

    Ok(plain::forward(req, &state).await)
}

fn is_for_vhost(req: &Request<Body>, vhost: &str) -> bool {
    let host = req
        .headers()
        .get(hyper::header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().host());
    host.map(|h| h.eq_ignore_ascii_case(vhost) || h.starts_with(&format!("{vhost}:"))).unwrap_or(false)
}
