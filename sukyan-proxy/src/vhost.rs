//! The fixed `sukyan` virtual host (spec §6): a homepage at `/` and the
//! issuing CA certificate at `/ca`, served whenever a request's `Host`
//! matches `ProxyConfig::vhost` regardless of which listener it arrived on.

use crate::cert::CertAuthority;
use hyper::{Body, Response, StatusCode};
use std::sync::Arc;

const HOMEPAGE: &str = concat!(
    "<!DOCTYPE html><html><head><title>sukyan</title></head><body>",
    "<h1>sukyan</h1><p>Install the <a href=\"/ca\">CA certificate</a> ",
    "to intercept TLS traffic through this proxy.</p></body></html>",
);

pub fn handle(path: &str, ca: &Arc<CertAuthority>) -> Response<Body> {
    match path {
        "/" | "" => Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/html; charset=utf-8")
            .body(Body::from(HOMEPAGE))
            .unwrap(),
        "/ca" => Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "application/octet-stream")
            .header("content-disposition", "attachment; filename=\"sukyan-ca.crt\"")
            .body(Body::from(ca.ca_cert_der().to_vec()))
            .unwrap(),
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn homepage_is_html() {
        let ca = Arc::new(CertAuthority::generate("Sukyan", 365).unwrap());
        let response = handle("/", &ca);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("content-type").unwrap(), "text/html; charset=utf-8");
    }

    #[tokio::test]
    async fn ca_endpoint_serves_der_with_deterministic_filename() {
        let ca = Arc::new(CertAuthority::generate("Sukyan", 365).unwrap());
        let response = handle("/ca", &ca);
        assert_eq!(response.headers().get("content-type").unwrap(), "application/octet-stream");
        assert_eq!(
            response.headers().get("content-disposition").unwrap(),
            "attachment; filename=\"sukyan-ca.crt\""
        );
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], ca.ca_cert_der());
    }

    #[tokio::test]
    async fn unknown_path_on_the_vhost_is_not_found() {
        let ca = Arc::new(CertAuthority::generate("Sukyan", 365).unwrap());
        let response = handle("/nope", &ca);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
