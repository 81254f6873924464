use std::net::IpAddr;

use k8s_openapi::{
    api::core::v1::{Endpoints, Secret, Service, ServicePort},
    apimachinery::pkg::util::intstr::IntOrString,
};
use kube::ResourceExt;
use serde::Deserialize;
use tracing::warn;

use crate::{
    common::{
        references_resolver::{ReferenceError, SecretLookup, ServiceLookup},
        AttachedListener, BackendService, Endpoint, Protocol, ResourceKey, DEFAULT_NAMESPACE_NAME,
    },
    crds::{AlbCr, FrontendCr, RuleCr, TimeoutPolicyCr},
};

const EXTERNAL_NAME_SERVICE_TYPE: &str = "ExternalName";

/// Everything one compile pass reads. A missing `frontends` or `listeners` key means that source
/// is not in use, which is different from a source without entries.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub frontends: Option<Vec<FrontendCr>>,
    #[serde(default)]
    pub rules: Vec<RuleCr>,
    #[serde(default)]
    pub listeners: Option<Vec<AttachedListener>>,
    #[serde(default, rename = "timeoutPolicies")]
    pub timeout_policies: Vec<TimeoutPolicyCr>,
    #[serde(default)]
    pub alb: Option<AlbCr>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub endpoints: Vec<Endpoints>,
    #[serde(default)]
    pub secrets: Vec<Secret>,
}

fn extend_source<T>(this: &mut Option<Vec<T>>, other: Option<Vec<T>>) {
    if let Some(other) = other {
        this.get_or_insert_with(Vec::new).extend(other);
    }
}

impl Snapshot {
    pub fn extend(&mut self, other: Snapshot) {
        extend_source(&mut self.frontends, other.frontends);
        extend_source(&mut self.listeners, other.listeners);
        self.rules.extend(other.rules);
        self.timeout_policies.extend(other.timeout_policies);
        if other.alb.is_some() {
            self.alb = other.alb;
        }
        self.services.extend(other.services);
        self.endpoints.extend(other.endpoints);
        self.secrets.extend(other.secrets);
    }

    fn service(&self, key: &ResourceKey) -> Option<&Service> {
        self.services.iter().find(|service| ResourceKey::from(*service) == *key)
    }

    fn service_endpoints(&self, key: &ResourceKey) -> Option<&Endpoints> {
        self.endpoints.iter().find(|endpoints| ResourceKey::from(*endpoints) == *key)
    }

    fn port_endpoints(&self, key: &ResourceKey, port: &ServicePort, protocol: Protocol) -> Result<Vec<Endpoint>, ReferenceError> {
        let Some(endpoints) = self.service_endpoints(key) else {
            return Ok(vec![]);
        };

        let mut resolved = vec![];
        for subset in endpoints.subsets.iter().flatten() {
            let target_port = match &port.target_port {
                Some(IntOrString::Int(target_port)) => *target_port,
                Some(IntOrString::String(_)) => subset
                    .ports
                    .iter()
                    .flatten()
                    .find(|endpoint_port| endpoint_port.name == port.name)
                    .map(|endpoint_port| endpoint_port.port)
                    .ok_or_else(|| ReferenceError::TargetPortNotFound { service: key.to_string(), port_name: port.name.clone().unwrap_or_default() })?,
                None => port.port,
            };
            resolved.extend(subset.addresses.iter().flatten().map(|address| Endpoint {
                address: address.ip.clone(),
                port: target_port,
                protocol: protocol.service_protocol().to_owned(),
                app_protocol: port.app_protocol.clone(),
                from_other_clusters: false,
            }));
        }
        Ok(resolved)
    }
}

impl ServiceLookup for Snapshot {
    fn endpoints(&self, service: &BackendService, protocol: Protocol) -> Result<Vec<Endpoint>, ReferenceError> {
        let key = ResourceKey::namespaced(&service.name, &service.namespace);
        let spec = self.service(&key).and_then(|s| s.spec.as_ref()).ok_or_else(|| ReferenceError::ServiceNotFound(key.to_string()))?;

        if spec.type_.as_deref() == Some(EXTERNAL_NAME_SERVICE_TYPE) {
            let external_name = spec.external_name.clone().unwrap_or_default();
            if external_name.parse::<IpAddr>().is_err() {
                warn!("External name {external_name} of {key} is not an address, skipping it");
                return Ok(vec![]);
            }
            return Ok(vec![Endpoint {
                address: external_name,
                port: service.port,
                protocol: protocol.service_protocol().to_owned(),
                app_protocol: None,
                from_other_clusters: false,
            }]);
        }

        let port = spec
            .ports
            .iter()
            .flatten()
            .find(|port| port.port == service.port && port.protocol.as_deref().unwrap_or("TCP") == protocol.service_protocol())
            .ok_or_else(|| ReferenceError::PortNotFound { service: key.to_string(), protocol: protocol.service_protocol().to_owned(), port: service.port })?;
        self.port_endpoints(&key, port, protocol)
    }
}

impl SecretLookup for Snapshot {
    fn secret(&self, key: &ResourceKey) -> Option<&Secret> {
        self.secrets
            .iter()
            .find(|secret| secret.name_any() == key.name && secret.namespace().as_deref().unwrap_or(DEFAULT_NAMESPACE_NAME) == key.namespace)
    }
}
