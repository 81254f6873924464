use std::{collections::BTreeMap, fmt::Display};

use typed_builder::TypedBuilder;

use super::{BackendGroup, BackendService, ExtensionSet, InternalRule, Protocol, Source};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrontendKey {
    pub port: i32,
    pub protocol: Protocol,
}

impl Display for FrontendKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.protocol, self.port)
    }
}

/// One listening port and protocol of the load balancer.
#[derive(Clone, Debug, TypedBuilder)]
pub struct Frontend {
    #[builder(setter(into))]
    pub name: String,
    #[builder(setter(into))]
    pub alb_name: String,
    pub port: i32,
    pub protocol: Protocol,
    #[builder(default, setter(into))]
    pub backend_protocol: String,
    #[builder(default)]
    pub source: Option<Source>,
    #[builder(default)]
    pub services: Vec<BackendService>,
    #[builder(default)]
    pub backend_group: Option<BackendGroup>,
    #[builder(default, setter(into))]
    pub certificate_name: String,
    #[builder(default)]
    pub rules: Vec<InternalRule>,
    #[builder(default)]
    pub extensions: ExtensionSet,
    #[builder(default)]
    pub conflict: bool,
}

impl Frontend {
    pub fn key(&self) -> FrontendKey {
        FrontendKey { port: self.port, protocol: self.protocol }
    }

    pub fn default_group_name(&self) -> String {
        self.to_string()
    }

    pub fn default_backend_group(&self) -> Option<&BackendGroup> {
        self.backend_group.as_ref().filter(|group| group.has_backends())
    }
}

impl Display for Frontend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.alb_name, self.port, self.protocol)
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoadBalancer {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub frontends: Vec<Frontend>,
}

impl LoadBalancer {
    pub fn new(name: &str, frontends: Vec<Frontend>) -> Self {
        Self { name: name.to_owned(), frontends, ..Default::default() }
    }

    pub fn active_frontends(&self) -> impl Iterator<Item = &Frontend> {
        self.frontends.iter().filter(|f| !f.conflict)
    }
}
