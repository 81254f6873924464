use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{
    matcher::Dslx, BackendService, RedirectConfig, RewriteRequestConfig, RewriteResponseConfig, Source, TimeoutConfig,
};

pub const CRD_GROUP: &str = "crd.alauda.io";
pub const GATEWAY_KIND: &str = "Gateway";

/// Label binding frontends and rules to their load balancer.
pub fn alb_name_label(domain: &str) -> String {
    format!("alb2.{domain}/name")
}

/// Label binding a rule to its frontend.
pub fn frontend_label(domain: &str) -> String {
    format!("alb2.{domain}/frontend")
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ServiceRef {
    pub name: String,
    pub namespace: String,
    pub port: i32,
    #[serde(default)]
    pub weight: i32,
}

impl From<&ServiceRef> for BackendService {
    fn from(service: &ServiceRef) -> Self {
        BackendService { namespace: service.namespace.clone(), name: service.name.clone(), port: service.port, weight: service.weight }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ServiceGroup {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_affinity_policy: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_affinity_attribute: String,
    #[serde(default)]
    pub services: Vec<ServiceRef>,
}

impl ServiceGroup {
    pub fn backend_services(&self) -> Vec<BackendService> {
        self.services.iter().map(BackendService::from).collect()
    }
}

/// Extension settings shared by frontends and rules.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct SharedConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otel: Option<Value>,
    #[serde(default, rename = "modsecurity", skip_serializing_if = "Option::is_none")]
    pub waf: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct FrontendConfig {
    #[serde(flatten)]
    pub shared: SharedConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<RedirectConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct RuleConfig {
    #[serde(flatten)]
    pub shared: SharedConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<RedirectConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite_request: Option<RewriteRequestConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite_response: Option<RewriteResponseConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Instance {
    #[serde(default)]
    pub conflict: bool,
    #[serde(default, rename = "probeTime")]
    pub probe_time: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct FrontendStatus {
    #[serde(default)]
    pub instances: BTreeMap<String, Instance>,
}

impl FrontendStatus {
    /// A frontend is conflicted as soon as one instance reports its port taken.
    pub fn conflict(&self) -> bool {
        self.instances.values().any(|instance| instance.conflict)
    }
}

/// One listening port of a load balancer.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(group = "crd.alauda.io", version = "v1", kind = "Frontend", struct = "FrontendCr", status = "FrontendStatus", shortname = "ft", namespaced)]
#[serde(rename_all = "camelCase")]
pub struct FrontendSpec {
    pub port: i32,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_group: Option<ServiceGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, rename = "certificate_name")]
    pub certificate_name: String,
    #[serde(default)]
    pub backend_protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<FrontendConfig>,
}

/// A routing rule attached to one frontend.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(group = "crd.alauda.io", version = "v1", kind = "Rule", struct = "RuleCr", shortname = "rl", namespaced)]
pub struct RuleSpec {
    #[serde(default, rename = "type")]
    pub rule_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub dsl: String,
    #[serde(default, rename = "serviceGroup", skip_serializing_if = "Option::is_none")]
    pub service_group: Option<ServiceGroup>,
    #[serde(default)]
    pub certificate_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<RuleConfig>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub dslx: Option<Dslx>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub rewrite_base: String,
    #[serde(default)]
    pub rewrite_target: String,
    #[serde(default, rename = "enableCORS")]
    pub enable_cors: bool,
    #[serde(default, rename = "corsAllowHeaders")]
    pub cors_allow_headers: String,
    #[serde(default, rename = "corsAllowOrigin")]
    pub cors_allow_origin: String,
    #[serde(default, rename = "backendProtocol")]
    pub backend_protocol: String,
    #[serde(default, rename = "redirectURL")]
    pub redirect_url: String,
    #[serde(default)]
    pub vhost: String,
    #[serde(default, rename = "redirectCode")]
    pub redirect_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

/// A load balancer. Only the extension settings under `spec.config` are read, every frontend
/// inherits them.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(group = "crd.alauda.io", version = "v2beta1", kind = "ALB2", struct = "AlbCr", shortname = "alb", namespaced)]
pub struct AlbSpec {
    #[serde(default)]
    pub address: String,
    #[serde(default, rename = "type")]
    pub alb_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<SharedConfig>,
}

/// The object a policy applies to. A section narrows it down to one listener or one rule.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTargetReference {
    #[serde(default)]
    pub group: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

impl PolicyTargetReference {
    pub fn has_section(&self) -> bool {
        self.section_index.is_some() || self.section_name.is_some()
    }
}

/// Upstream timeouts attached to a gateway or a route. `default` yields to settings further down
/// the hierarchy, `override` doesn't.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(group = "gateway.crd.alauda.io", version = "v1alpha1", kind = "TimeoutPolicy", struct = "TimeoutPolicyCr", shortname = "timeout", namespaced)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutPolicySpec {
    pub target_ref: PolicyTargetReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<TimeoutConfig>,
    #[serde(default, rename = "override", skip_serializing_if = "Option::is_none")]
    pub overriding: Option<TimeoutConfig>,
}
