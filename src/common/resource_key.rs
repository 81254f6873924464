use std::fmt::Display;

use k8s_openapi::api::core::v1::{Endpoints, Secret, Service};
use kube::ResourceExt;
use thiserror::Error;

pub const DEFAULT_NAMESPACE_NAME: &str = "default";
pub const DEFAULT_KIND_NAME: &str = "Service";
pub const SECRET_KIND_NAME: &str = "Secret";

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
    pub kind: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CertificateNameError {
    #[error("invalid certificate name {0}")]
    Invalid(String),
}

impl ResourceKey {
    pub fn namespaced(name: &str, namespace: &str) -> Self {
        Self { name: name.to_owned(), namespace: namespace.to_owned(), ..Default::default() }
    }

    pub fn secret(name: &str, namespace: &str) -> Self {
        Self { name: name.to_owned(), namespace: namespace.to_owned(), kind: SECRET_KIND_NAME.to_owned() }
    }

    /// Parses `ns/name` or the legacy `ns_name` form of a certificate reference.
    pub fn from_certificate_name(certificate_name: &str) -> std::result::Result<Self, CertificateNameError> {
        let separator = if certificate_name.contains('_') {
            '_'
        } else if certificate_name.contains('/') {
            '/'
        } else {
            return Err(CertificateNameError::Invalid(certificate_name.to_owned()));
        };
        let parts: Vec<&str> = certificate_name.split(separator).collect();
        match parts.as_slice() {
            [namespace, name] => Ok(Self::secret(name, namespace)),
            _ => Err(CertificateNameError::Invalid(certificate_name.to_owned())),
        }
    }
}

impl Default for ResourceKey {
    fn default() -> Self {
        Self { namespace: DEFAULT_NAMESPACE_NAME.to_owned(), name: String::default(), kind: DEFAULT_KIND_NAME.to_owned() }
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl From<&Service> for ResourceKey {
    fn from(service: &Service) -> Self {
        Self {
            namespace: service.namespace().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned()),
            name: service.name_any(),
            kind: DEFAULT_KIND_NAME.to_owned(),
        }
    }
}

impl From<&Endpoints> for ResourceKey {
    fn from(endpoints: &Endpoints) -> Self {
        Self {
            namespace: endpoints.namespace().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned()),
            name: endpoints.name_any(),
            kind: DEFAULT_KIND_NAME.to_owned(),
        }
    }
}

impl From<&Secret> for ResourceKey {
    fn from(secret: &Secret) -> Self {
        Self {
            namespace: secret.namespace().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned()),
            name: secret.name_any(),
            kind: SECRET_KIND_NAME.to_owned(),
        }
    }
}

impl From<(Option<String>, String)> for ResourceKey {
    fn from((namespace, name): (Option<String>, String)) -> Self {
        Self { namespace: namespace.unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned()), name, kind: DEFAULT_KIND_NAME.to_owned() }
    }
}
