mod backends_resolver;
mod secrets_resolver;

pub use backends_resolver::{fill_backends, resolve_backend_protocol, resolve_backends, EndpointCache, ReferenceError, ServiceLookup};
pub use secrets_resolver::{certificate_from_secret, certificate_references, CertificateError, CertificateResolver, SecretLookup};
