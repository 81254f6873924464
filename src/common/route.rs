use gateway_api::httproutes::HTTPBackendReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{references_resolver::ReferenceError, BackendService, ResourceKey, DEFAULT_NAMESPACE_NAME};

const SERVICE_KIND: &str = "Service";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackendRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

impl From<&HTTPBackendReference> for BackendRef {
    fn from(reference: &HTTPBackendReference) -> Self {
        BackendRef {
            group: reference.group.clone(),
            kind: reference.kind.clone(),
            name: reference.name.clone(),
            namespace: reference.namespace.clone(),
            port: reference.port,
            weight: reference.weight,
        }
    }
}

impl TryFrom<&BackendRef> for BackendService {
    type Error = ReferenceError;

    fn try_from(backend_ref: &BackendRef) -> Result<Self, Self::Error> {
        if let Some(kind) = backend_ref.kind.as_ref().filter(|kind| *kind != SERVICE_KIND) {
            return Err(ReferenceError::UnsupportedBackendKind(kind.clone()));
        }
        let missing = |field| ReferenceError::MissingField { reference: backend_ref.name.clone(), field };
        Ok(BackendService {
            namespace: backend_ref.namespace.clone().ok_or_else(|| missing("namespace"))?,
            name: backend_ref.name.clone(),
            port: backend_ref.port.ok_or_else(|| missing("port"))?,
            weight: backend_ref.weight.ok_or_else(|| missing("weight"))?,
        })
    }
}

/// All references must be usable, otherwise the whole rule is rejected.
pub fn backend_services(backend_refs: &[BackendRef]) -> Result<Vec<BackendService>, ReferenceError> {
    backend_refs.iter().map(BackendService::try_from).collect()
}

pub fn metadata_key(metadata: &ObjectMeta) -> ResourceKey {
    ResourceKey::namespaced(metadata.name.as_deref().unwrap_or_default(), metadata.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE_NAME))
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StreamRouteRule {
    #[serde(default)]
    pub backend_refs: Vec<BackendRef>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StreamRouteSpec {
    #[serde(default)]
    pub rules: Vec<StreamRouteRule>,
}

/// TCPRoute or UDPRoute, the listener protocol tells them apart.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StreamRoute {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: StreamRouteSpec,
}

impl StreamRoute {
    pub fn key(&self) -> ResourceKey {
        metadata_key(&self.metadata)
    }
}
