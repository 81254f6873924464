use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::Secret;
use rustls::{crypto::ring, sign::CertifiedKey, InconsistentKeys};
use rustls_pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::common::{Certificate, CertificateNameError, LoadBalancer, ResourceKey};

const TLS_CERT_KEY: &str = "tls.crt";
const TLS_PRIVATE_KEY_KEY: &str = "tls.key";
const CA_CERT_KEY: &str = "ca.crt";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CertificateError {
    #[error(transparent)]
    Name(#[from] CertificateNameError),
    #[error("secret {0} not found")]
    NotFound(String),
    #[error("secret {0} has no {1}")]
    MissingData(String, &'static str),
    #[error("secret {0} has an invalid certificate {1}")]
    InvalidCertificate(String, String),
    #[error("secret {0} has an invalid private key {1}")]
    InvalidKey(String, String),
    #[error("secret {0} has a private key that does not belong to its certificate")]
    KeyMismatch(String),
}

pub trait SecretLookup {
    fn secret(&self, key: &ResourceKey) -> Option<&Secret>;
}

fn secret_data<'a>(secret: &'a Secret, secret_name: &str, field: &'static str) -> Result<Option<&'a [u8]>, CertificateError> {
    let data = secret.data.as_ref().and_then(|data| data.get(field)).map(|data| data.0.as_slice()).filter(|data| !data.is_empty());
    match data {
        Some(data) => {
            std::str::from_utf8(data).map_err(|e| CertificateError::InvalidCertificate(secret_name.to_owned(), e.to_string()))?;
            Ok(Some(data))
        },
        None => Ok(None),
    }
}

fn as_text(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

/// The private key must carry the public key of the leaf certificate. Key types whose public key
/// can't be derived are accepted.
fn check_key_pair(secret_name: &str, leaf: CertificateDer<'static>, key: PrivateKeyDer<'static>) -> Result<(), CertificateError> {
    match CertifiedKey::from_der(vec![leaf], key, &ring::default_provider()) {
        Ok(_) => Ok(()),
        Err(rustls::Error::InconsistentKeys(InconsistentKeys::KeyMismatch)) => Err(CertificateError::KeyMismatch(secret_name.to_owned())),
        Err(e) => Err(CertificateError::InvalidKey(secret_name.to_owned(), e.to_string())),
    }
}

/// Builds a certificate out of a `kubernetes.io/tls` style secret. A CA bundle, when present, is
/// appended to the certificate chain.
pub fn certificate_from_secret(secret_name: &str, secret: &Secret) -> Result<Certificate, CertificateError> {
    let certificate = secret_data(secret, secret_name, TLS_CERT_KEY)?.ok_or_else(|| CertificateError::MissingData(secret_name.to_owned(), TLS_CERT_KEY))?;
    let private_key = secret_data(secret, secret_name, TLS_PRIVATE_KEY_KEY)?.ok_or_else(|| CertificateError::MissingData(secret_name.to_owned(), TLS_PRIVATE_KEY_KEY))?;

    let leaf = CertificateDer::from_pem_slice(certificate).map_err(|e| CertificateError::InvalidCertificate(secret_name.to_owned(), e.to_string()))?;
    let key = PrivateKeyDer::from_pem_slice(private_key).map_err(|e| CertificateError::InvalidKey(secret_name.to_owned(), e.to_string()))?;
    check_key_pair(secret_name, leaf, key)?;

    let mut cert = as_text(certificate);
    if let Some(ca) = secret_data(secret, secret_name, CA_CERT_KEY)? {
        cert = format!("{}\n{}", cert.trim_matches('\n'), as_text(ca).trim_matches('\n'));
    }
    Ok(Certificate { cert, key: as_text(private_key) })
}

/// Picks one certificate per domain out of the certificates rules asked for on each port.
fn collapse_rule_certificates(port_domains: &BTreeMap<String, BTreeMap<String, Vec<ResourceKey>>>) -> BTreeMap<String, ResourceKey> {
    let mut domain_ports: BTreeMap<&str, BTreeMap<&str, &ResourceKey>> = BTreeMap::new();
    for (port, domains) in port_domains {
        for (domain, certificates) in domains {
            if let Some(certificate) = certificates.iter().min_by_key(|c| c.to_string()) {
                domain_ports.entry(domain).or_default().insert(port, certificate);
            }
        }
    }

    let mut collapsed = BTreeMap::new();
    for (domain, ports) in domain_ports {
        let distinct: BTreeSet<&ResourceKey> = ports.values().copied().collect();
        match distinct.into_iter().collect::<Vec<_>>().as_slice() {
            [certificate] => {
                collapsed.insert(domain.to_owned(), (*certificate).clone());
            },
            _ => {
                for (port, certificate) in ports {
                    collapsed.insert(format!("{domain}/{port}"), certificate.clone());
                }
            },
        }
    }
    collapsed
}

/// Decides which secret serves each port, domain or `domain/port` of the load balancer.
pub fn certificate_references(load_balancer: &LoadBalancer, log_context: &str) -> BTreeMap<String, ResourceKey> {
    let mut port_defaults = BTreeMap::new();
    let mut port_domains: BTreeMap<String, BTreeMap<String, Vec<ResourceKey>>> = BTreeMap::new();

    for frontend in load_balancer.active_frontends().filter(|f| f.protocol.requires_certificate()) {
        let port = frontend.port.to_string();
        if !frontend.certificate_name.is_empty() {
            match ResourceKey::from_certificate_name(&frontend.certificate_name) {
                Ok(key) => {
                    port_defaults.entry(port.clone()).or_insert(key);
                },
                Err(e) => info!("{log_context} Can't use default certificate of {} {e}", frontend.name),
            }
        }

        let domains = port_domains.entry(port).or_default();
        for rule in frontend.rules.iter().filter(|r| !r.domain.is_empty() && !r.certificate_name.is_empty()) {
            match ResourceKey::from_certificate_name(&rule.certificate_name) {
                Ok(key) => domains.entry(rule.domain.clone()).or_default().push(key),
                Err(e) => info!("{log_context} Can't use certificate of rule {} {e}", rule.rule_id),
            }
        }
    }

    let mut references = port_defaults;
    for (domain, key) in collapse_rule_certificates(&port_domains) {
        references.entry(domain).or_insert(key);
    }
    debug!("{log_context} Certificate references {references:?}");
    references
}

/// Resolves certificate references against secrets, reading each secret once.
pub struct CertificateResolver<'a> {
    lookup: &'a dyn SecretLookup,
    cache: BTreeMap<ResourceKey, Result<Certificate, CertificateError>>,
    log_context: &'a str,
}

impl<'a> CertificateResolver<'a> {
    pub fn new(lookup: &'a dyn SecretLookup, log_context: &'a str) -> Self {
        Self { lookup, cache: BTreeMap::new(), log_context }
    }

    pub fn certificate(&mut self, key: &ResourceKey) -> Result<&Certificate, &CertificateError> {
        let lookup = self.lookup;
        self.cache
            .entry(key.clone())
            .or_insert_with(|| {
                let name = key.to_string();
                let secret = lookup.secret(key).ok_or_else(|| CertificateError::NotFound(name.clone()))?;
                certificate_from_secret(&name, secret)
            })
            .as_ref()
    }

    pub fn resolve(&mut self, load_balancer: &LoadBalancer) -> BTreeMap<String, Certificate> {
        let log_context = self.log_context;
        let mut certificates = BTreeMap::new();
        for (target, key) in certificate_references(load_balancer, log_context) {
            match self.certificate(&key) {
                Ok(certificate) => {
                    certificates.insert(target, certificate.clone());
                },
                Err(e) => warn!("{log_context} Can't get certificate for {target} {e}"),
            }
        }
        certificates
    }

    pub fn secrets_read(&self) -> usize {
        self.cache.len()
    }
}
