use std::{cmp::Ordering, collections::BTreeMap};

use serde::Serialize;
use serde_json::Value;

use super::{BackendGroup, Extension, ExtensionSet, RewriteRequestConfig, RewriteResponseConfig, Source, TimeoutConfig};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    #[default]
    Http,
    Stream,
}

/// Forced (user priority, complexity priority) pair that pins a policy to one end of a bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RankContract {
    pub user_priority: i32,
    pub complexity_priority: i32,
}

pub const MATCH_LAST: RankContract = RankContract { user_priority: 999, complexity_priority: -1 };
pub const MATCH_FIRST: RankContract = RankContract { user_priority: -1, complexity_priority: i32::MAX };

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PolicyConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite_response: Option<RewriteResponseConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite_request: Option<RewriteRequestConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otel: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waf: Option<Value>,
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

impl PolicyConfig {
    pub fn is_empty(&self) -> bool {
        self.rewrite_response.is_none()
            && self.rewrite_request.is_none()
            && self.timeout.is_none()
            && self.otel.is_none()
            && self.auth.is_none()
            && self.waf.is_none()
            && self.custom.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Policy {
    pub internal_dsl: Vec<Value>,
    #[serde(skip)]
    pub internal_dsl_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    pub complexity_priority: i32,
    pub user_priority: i32,
    pub subsystem: Subsystem,
    pub rule: String,
    #[serde(skip_serializing_if = "PolicyConfig::is_empty")]
    pub config: PolicyConfig,
    pub url: String,
    pub rewrite_base: String,
    pub rewrite_target: String,
    pub enable_cors: bool,
    pub cors_allow_headers: String,
    pub cors_allow_origin: String,
    pub backend_protocol: String,
    pub redirect_url: String,
    pub vhost: String,
    pub redirect_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite_prefix_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite_replace_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_scheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_port: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_prefix_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_replace_prefix: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source_ns: String,
}

impl Policy {
    pub fn with_contract(mut self, contract: RankContract) -> Self {
        self.user_priority = contract.user_priority;
        self.complexity_priority = contract.complexity_priority;
        self
    }

    /// Bucket order: lower user priority first, then more complex match, then longer match, then rule name.
    pub fn rank(&self, other: &Policy) -> Ordering {
        self.user_priority
            .cmp(&other.user_priority)
            .then_with(|| other.complexity_priority.cmp(&self.complexity_priority))
            .then_with(|| other.internal_dsl_len.cmp(&self.internal_dsl_len))
            .then_with(|| self.rule.cmp(&other.rule))
    }

    pub fn apply_extensions(&mut self, extensions: &ExtensionSet) {
        for extension in extensions.extensions() {
            match extension {
                Extension::Redirect(redirect) => {
                    self.redirect_url = redirect.url.clone().unwrap_or_default();
                    self.redirect_code = redirect.code.unwrap_or_default();
                    self.redirect_scheme.clone_from(&redirect.scheme);
                    self.redirect_host.clone_from(&redirect.host);
                    self.redirect_port = redirect.port;
                    self.redirect_prefix_match.clone_from(&redirect.prefix_match);
                    self.redirect_replace_prefix.clone_from(&redirect.replace_prefix);
                },
                Extension::Rewrite(rewrite) => {
                    self.url = rewrite.url.clone().unwrap_or_default();
                    self.rewrite_base = rewrite.rewrite_base.clone().unwrap_or_default();
                    self.rewrite_target = rewrite.rewrite_target.clone().unwrap_or_default();
                    self.rewrite_prefix_match.clone_from(&rewrite.prefix_match);
                    self.rewrite_replace_prefix.clone_from(&rewrite.replace_prefix);
                },
                Extension::Cors(cors) => {
                    self.enable_cors = cors.enable_cors;
                    self.cors_allow_headers.clone_from(&cors.allow_headers);
                    self.cors_allow_origin.clone_from(&cors.allow_origin);
                },
                Extension::Vhost(vhost) => self.vhost.clone_from(vhost),
                Extension::Timeout(timeout) => self.config.timeout = Some(timeout.clone()),
                Extension::RewriteRequest(rewrite) => self.config.rewrite_request = Some(rewrite.clone()),
                Extension::RewriteResponse(rewrite) => self.config.rewrite_response = Some(rewrite.clone()),
                Extension::Otel(otel) => self.config.otel = Some(otel.clone()),
                Extension::Auth(auth) => self.config.auth = Some(auth.clone()),
                Extension::Waf(waf) => self.config.waf = Some(waf.clone()),
                Extension::Custom { key, value } => {
                    self.config.custom.insert(key.clone(), value.clone());
                },
            }
        }
    }
}

pub fn sort_policies(policies: &mut [Policy]) {
    policies.sort_by(Policy::rank);
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Certificate {
    pub cert: String,
    pub key: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct HttpPolicy {
    pub tcp: BTreeMap<i32, Vec<Policy>>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct StreamPolicy {
    pub tcp: BTreeMap<i32, Vec<Policy>>,
    pub udp: BTreeMap<i32, Vec<Policy>>,
}

/// The document consumed by the data plane.
#[derive(Clone, Debug, Default, Serialize)]
pub struct NgxPolicy {
    pub certificate_map: BTreeMap<String, Certificate>,
    pub http: HttpPolicy,
    pub stream: StreamPolicy,
    pub backend_group: Vec<BackendGroup>,
}

impl NgxPolicy {
    pub fn backend_group(&self, name: &str) -> Option<&BackendGroup> {
        self.backend_group.iter().find(|group| group.name == name)
    }

    pub fn http_policies(&self, port: i32) -> &[Policy] {
        self.http.tcp.get(&port).map_or(&[], Vec::as_slice)
    }
}
