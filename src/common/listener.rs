use gateway_api::{gateways::GatewayListeners, httproutes::HTTPRoute};
use serde::Deserialize;
use thiserror::Error;

use super::{route::StreamRoute, Protocol, ProtocolError, ResourceKey};

const SECRET_KIND: &str = "Secret";

/// A gateway listener after admission, together with the routes accepted on it. Route hostnames
/// are expected to be intersected with the listener hostname already.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedListener {
    pub gateway_namespace: String,
    pub gateway_name: String,
    #[serde(flatten)]
    pub listener: GatewayListeners,
    #[serde(default)]
    pub http_routes: Vec<HTTPRoute>,
    #[serde(default)]
    pub stream_routes: Vec<StreamRoute>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerCertificateError {
    #[error("listener has no tls configuration")]
    NoTls,
    #[error("listener needs exactly one certificate but has {0}")]
    NotExactlyOneCertificate(usize),
    #[error("certificate reference of kind {0} is not a secret")]
    NotASecret(String),
    #[error("certificate reference {0} has no namespace")]
    NoNamespace(String),
    #[error("listener has no hostname")]
    NoHostname,
}

impl AttachedListener {
    pub fn gateway_key(&self) -> ResourceKey {
        ResourceKey::namespaced(&self.gateway_name, &self.gateway_namespace)
    }

    pub fn name(&self) -> &str {
        &self.listener.name
    }

    pub fn port(&self) -> i32 {
        self.listener.port
    }

    pub fn hostname(&self) -> Option<&String> {
        self.listener.hostname.as_ref()
    }

    pub fn has_tls(&self) -> bool {
        self.listener.tls.is_some()
    }

    pub fn protocol(&self) -> Result<Protocol, ProtocolError> {
        self.listener.protocol.parse()
    }

    /// The secret and domain served by a TLS listener.
    pub fn certificate(&self) -> Result<(ResourceKey, &str), ListenerCertificateError> {
        let tls = self.listener.tls.as_ref().ok_or(ListenerCertificateError::NoTls)?;
        let certificate_refs = tls.certificate_refs.as_deref().unwrap_or_default();
        let [certificate] = certificate_refs else {
            return Err(ListenerCertificateError::NotExactlyOneCertificate(certificate_refs.len()));
        };
        if let Some(kind) = certificate.kind.as_ref().filter(|kind| *kind != SECRET_KIND) {
            return Err(ListenerCertificateError::NotASecret(kind.clone()));
        }
        let namespace = certificate.namespace.as_ref().ok_or_else(|| ListenerCertificateError::NoNamespace(certificate.name.clone()))?;
        let hostname = self.listener.hostname.as_deref().ok_or(ListenerCertificateError::NoHostname)?;
        Ok((ResourceKey::secret(&certificate.name, namespace), hostname))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTENER: &str = r"
gatewayNamespace: cpaas-system
gatewayName: g1
name: https
port: 443
protocol: HTTPS
hostname: a.com
tls:
  mode: Terminate
  certificateRefs:
  - name: tls-a
    namespace: cpaas-system
";

    #[test]
    pub fn test_listener_certificate() {
        let mut listener: AttachedListener = serde_yaml::from_str(LISTENER).unwrap();
        assert_eq!(listener.protocol(), Ok(Protocol::Https));
        assert_eq!(listener.gateway_key().to_string(), "cpaas-system/g1");
        let (key, domain) = listener.certificate().unwrap();
        assert_eq!(key.to_string(), "cpaas-system/tls-a");
        assert_eq!(domain, "a.com");

        listener.listener.hostname = None;
        assert_eq!(listener.certificate(), Err(ListenerCertificateError::NoHostname));

        listener.listener.tls = None;
        assert_eq!(listener.certificate(), Err(ListenerCertificateError::NoTls));
    }

    #[test]
    pub fn test_listener_certificate_references() {
        let two = LISTENER.replace("  - name: tls-a\n", "  - name: tls-b\n    namespace: cpaas-system\n  - name: tls-a\n");
        let listener: AttachedListener = serde_yaml::from_str(&two).unwrap();
        assert_eq!(listener.certificate(), Err(ListenerCertificateError::NotExactlyOneCertificate(2)));

        let config_map = LISTENER.replace("  - name: tls-a\n", "  - name: tls-a\n    kind: ConfigMap\n");
        let listener: AttachedListener = serde_yaml::from_str(&config_map).unwrap();
        assert_eq!(listener.certificate(), Err(ListenerCertificateError::NotASecret("ConfigMap".to_owned())));

        let no_namespace = LISTENER.replace("    namespace: cpaas-system\n", "");
        let listener: AttachedListener = serde_yaml::from_str(&no_namespace).unwrap();
        assert_eq!(listener.certificate(), Err(ListenerCertificateError::NoNamespace("tls-a".to_owned())));

        let tcp: AttachedListener = serde_yaml::from_str(&LISTENER.replace("protocol: HTTPS", "protocol: TLS")).unwrap();
        assert!(tcp.protocol().is_err());
    }
}
