//! On-the-fly leaf certificate issuance for the MITM proxy, grounded on
//! `nexus-infra/src/cert_manager.rs`'s `generate_self_signed_cert` --
//! adapted here to a root CA that signs one leaf per intercepted host
//! instead of a single static server certificate.

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, SanType, PKCS_ECDSA_P256_SHA256,
};
use rustls::{Certificate as RustlsCertificate, PrivateKey};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("certificate generation failed: {0}")]
    Generation(String),
}

type Result<T> = std::result::Result<T, CertError>;

/// A leaf certificate chain (leaf + CA) and its private key, ready for
/// `rustls::ServerConfig::with_single_cert`.
#[derive(Clone)]
pub struct CertifiedKey {
    pub chain: Vec<RustlsCertificate>,
    pub key: PrivateKey,
}

/// Issues a fresh leaf certificate for every intercepted host, signed by a
/// self-signed root generated once at startup, caching issued leaves for
/// the life of the process (spec §6: the proxy serves the CA at `/ca` so
/// operators can trust it once).
pub struct CertAuthority {
    ca_cert: Certificate,
    ca_cert_der: Vec<u8>,
    leaves: RwLock<HashMap<String, Arc<CertifiedKey>>>,
    validity: Duration,
}

impl CertAuthority {
    pub fn generate(organization: &str, validity_days: u32) -> Result<Self> {
        let mut params = CertificateParams::default();
        params.distinguished_name = {
            let mut name = DistinguishedName::new();
            name.push(DnType::CommonName, format!("{organization} Root CA"));
            name.push(DnType::OrganizationName, organization);
            name
        };
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        params.alg = &PKCS_ECDSA_P256_SHA256;
        params.key_pair =
            Some(KeyPair::generate(&PKCS_ECDSA_P256_SHA256).map_err(|e| CertError::Generation(e.to_string()))?);
        set_validity(&mut params, validity_days);

        let ca_cert = Certificate::from_params(params).map_err(|e| CertError::Generation(e.to_string()))?;
        let ca_cert_der = ca_cert.serialize_der().map_err(|e| CertError::Generation(e.to_string()))?;

        Ok(Self {
            ca_cert,
            ca_cert_der,
            leaves: RwLock::new(HashMap::new()),
            validity: Duration::from_secs(validity_days as u64 * 86_400),
        })
    }

    /// The root CA certificate in DER form, served verbatim at `/ca`.
    pub fn ca_cert_der(&self) -> &[u8] {
        &self.ca_cert_der
    }

    pub fn leaf_for_host(&self, host: &str) -> Result<Arc<CertifiedKey>> {
        if let Some(cached) = self.leaves.read().unwrap().get(host) {
            return Ok(cached.clone());
        }

        let mut params = CertificateParams::new(vec![host.to_string()]);
        params.distinguished_name = {
            let mut name = DistinguishedName::new();
            name.push(DnType::CommonName, host);
            name
        };
        params.subject_alt_names = vec![SanType::DnsName(host.to_string())];
        params.alg = &PKCS_ECDSA_P256_SHA256;
        params.key_pair =
            Some(KeyPair::generate(&PKCS_ECDSA_P256_SHA256).map_err(|e| CertError::Generation(e.to_string()))?);
        set_validity(&mut params, (self.validity.as_secs() / 86_400) as u32);

        let leaf = Certificate::from_params(params).map_err(|e| CertError::Generation(e.to_string()))?;
        let leaf_der = leaf
            .serialize_der_with_signer(&self.ca_cert)
            .map_err(|e| CertError::Generation(e.to_string()))?;
        let key_der = leaf.serialize_private_key_der();

        let certified = Arc::new(CertifiedKey {
            chain: vec![RustlsCertificate(leaf_der), RustlsCertificate(self.ca_cert_der.clone())],
            key: PrivateKey(key_der),
        });

        self.leaves.write().unwrap().insert(host.to_string(), certified.clone());
        Ok(certified)
    }
}

fn set_validity(params: &mut CertificateParams, validity_days: u32) {
    let not_before = time::OffsetDateTime::now_utc();
    params.not_before = not_before;
    params.not_after = not_before + time::Duration::days(validity_days as i64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_a_self_signed_root() {
        let ca = CertAuthority::generate("Sukyan", 365).unwrap();
        assert!(!ca.ca_cert_der().is_empty());
    }

    #[test]
    fn issues_and_caches_leaf_per_host() {
        let ca = CertAuthority::generate("Sukyan", 365).unwrap();
        let a = ca.leaf_for_host("example.com").unwrap();
        let b = ca.leaf_for_host("example.com").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let other = ca.leaf_for_host("other.example").unwrap();
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn leaf_chain_includes_the_issuing_ca() {
        let ca = CertAuthority::generate("Sukyan", 365).unwrap();
        let leaf = ca.leaf_for_host("example.com").unwrap();
        assert_eq!(leaf.chain.len(), 2);
        assert_eq!(leaf.chain[1].0, ca.ca_cert_der());
    }
}
