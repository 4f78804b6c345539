//! Plain (non-CONNECT) HTTP proxying: a client sends an absolute-URI
//! request straight to the proxy over cleartext HTTP, so there is no tunnel
//! to terminate -- each request is simply forwarded and captured (spec §6:
//! "accepts standard HTTP proxy traffic with MITM").

use crate::history::{record, CapturedExchange};
use crate::ProxyState;
use hyper::{Body, Request, Response, StatusCode};
use std::sync::Arc;

pub async fn forward(req: Request<Body>, state: &Arc<ProxyState>) -> Response<Body> {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let request_headers = req.headers().clone();
    let (parts, body) = req.into_parts();

    let request_body = match hyper::body::to_bytes(body).await {
        Ok(bytes) => bytes.to_vec(),
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &format!("failed to read request body: {e}")),
    };
    let outgoing = Request::from_parts(parts, Body::from(request_body.clone()));

    let response = match state.plain_client.request(outgoing).await {
        Ok(resp) => resp,
        Err(e) => {
            log::warn!("plain proxy request to {uri} failed: {e}");
            return error_response(StatusCode::BAD_GATEWAY, "upstream request failed");
        }
    };

    let (resp_parts, resp_body) = response.into_parts();
    let response_body = match hyper::body::to_bytes(resp_body).await {
        Ok(bytes) => bytes.to_vec(),
        Err(e) => return error_response(StatusCode::BAD_GATEWAY, &format!("failed to read upstream body: {e}")),
    };

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

    Response::from_parts(resp_parts, Body::from(response_body))
}

fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    Response::builder().status(status).body(Body::from(message.to_string())).unwrap()
}
