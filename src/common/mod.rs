mod backend;
mod extension;
mod frontend;
mod listener;
pub mod matcher;
mod policy;
pub mod references_resolver;
mod resource_key;
mod route;
mod rule;

use std::{fmt::Display, str::FromStr};

pub use backend::{Backend, BackendGroup, BackendMode, Endpoint};
pub use extension::{
    Attachment, AttachmentLevel, AttachmentStrength, CorsConfig, Extension, ExtensionKind, ExtensionSet, RedirectConfig, RewriteConfig, RewriteRequestConfig,
    RewriteResponseConfig, TimeoutConfig,
};
pub use frontend::{Frontend, FrontendKey, LoadBalancer};
pub use listener::{AttachedListener, ListenerCertificateError};
pub use policy::{sort_policies, Certificate, HttpPolicy, NgxPolicy, Policy, PolicyConfig, RankContract, StreamPolicy, Subsystem, MATCH_FIRST, MATCH_LAST};
pub use resource_key::{CertificateNameError, ResourceKey, DEFAULT_NAMESPACE_NAME};
pub use route::{backend_services, metadata_key, BackendRef, StreamRoute, StreamRouteRule, StreamRouteSpec};
pub use rule::{InternalRule, RuleOrigin};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BACKEND_PROTOCOL_FROM_APP_PROTOCOL: &str = "$http_backend_protocol";
pub const SOURCE_TYPE_INGRESS: &str = "ingress";
pub const SOURCE_TYPE_HTTP_ROUTE: &str = "httproute";
pub const SOURCE_TYPE_GRPC_ROUTE: &str = "grpcroute";
pub const SOURCE_TYPE_TCP_ROUTE: &str = "tcproute";
pub const SOURCE_TYPE_UDP_ROUTE: &str = "udproute";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Grpc,
    Tcp,
    Udp,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unsupported frontend protocol {0}")]
pub struct ProtocolError(String);

impl Protocol {
    pub fn is_stream(self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }

    pub fn is_http(self) -> bool {
        matches!(self, Protocol::Http | Protocol::Https)
    }

    pub fn requires_certificate(self) -> bool {
        matches!(self, Protocol::Https | Protocol::Grpc)
    }

    /// Protocol of the kubernetes service port serving this frontend.
    pub fn service_protocol(self) -> &'static str {
        match self {
            Protocol::Udp => "UDP",
            _ => "TCP",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Grpc => "grpc",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "grpc" => Ok(Protocol::Grpc),
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            _ => Err(ProtocolError(s.to_owned())),
        }
    }
}

/// Where a frontend or rule came from, e.g. an ingress or a gateway route.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct Source {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, rename = "type")]
    pub source_type: String,
}

/// A weighted reference to a kubernetes service port.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct BackendService {
    pub namespace: String,
    pub name: String,
    pub port: i32,
    pub weight: i32,
}

impl BackendService {
    pub fn service_key(&self, protocol: Protocol) -> String {
        create_service_key(&self.namespace, &self.name, protocol.service_protocol(), self.port)
    }
}

pub fn create_service_key(namespace: &str, name: &str, protocol: &str, port: i32) -> String {
    format!("{namespace}-{name}-{protocol}-{port}").to_lowercase()
}
