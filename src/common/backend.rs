use std::fmt::Display;

use serde::Serialize;

use super::Protocol;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    #[default]
    Http,
    Tcp,
    Udp,
    Grpc,
}

impl From<Protocol> for BackendMode {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Tcp => BackendMode::Tcp,
            Protocol::Udp => BackendMode::Udp,
            Protocol::Http | Protocol::Https => BackendMode::Http,
            Protocol::Grpc => BackendMode::Grpc,
        }
    }
}

/// A live endpoint of a service as found in the cluster, before any weight is assigned.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Endpoint {
    pub address: String,
    pub port: i32,
    pub protocol: String,
    pub app_protocol: Option<String>,
    pub from_other_clusters: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Backend {
    pub address: String,
    #[serde(rename = "otherclusters")]
    pub from_other_clusters: bool,
    pub port: i32,
    pub svc: String,
    pub ns: String,
    pub weight: i32,
    #[serde(skip)]
    pub protocol: String,
    #[serde(skip)]
    pub app_protocol: Option<String>,
}

impl Backend {
    pub fn same_target(&self, other: &Backend) -> bool {
        self.address == other.address && self.port == other.port && self.weight == other.weight
    }

    pub fn is_https(&self) -> bool {
        self.app_protocol.as_deref().is_some_and(|p| p.eq_ignore_ascii_case("https"))
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.address, self.port, self.weight)
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BackendGroup {
    pub name: String,
    pub session_affinity_policy: String,
    pub session_affinity_attribute: String,
    pub mode: BackendMode,
    pub backends: Vec<Backend>,
}

impl BackendGroup {
    pub fn has_backends(&self) -> bool {
        !self.backends.is_empty()
    }

    /// Structural equality used for catalogue deduplication. Backends compare on target and weight only.
    pub fn same_as(&self, other: &BackendGroup) -> bool {
        self.name == other.name
            && self.mode == other.mode
            && self.session_affinity_policy == other.session_affinity_policy
            && self.session_affinity_attribute == other.session_affinity_attribute
            && self.backends.len() == other.backends.len()
            && self.backends.iter().zip(&other.backends).all(|(a, b)| a.same_target(b))
    }
}
