//! Client-side TLS configuration for dialing the real origin once a CONNECT
//! tunnel or absolute-URI HTTPS request has been accepted, grounded on
//! `nexus-infra/src/cert_manager.rs`'s `create_client_config` -- this proxy
//! always wants real certificate validation against the system roots, so
//! only the `verify_hostname = true` branch of that method survives here.

use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use std::sync::Arc;

pub fn client_config() -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(ta.subject, ta.spki, ta.name_constraints)
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Arc::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_client_config_without_panicking() {
        let config = client_config();
        assert!(config.alpn_protocols.is_empty());
    }
}
