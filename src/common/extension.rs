use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RedirectConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_match: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_prefix: Option<String>,
}

impl RedirectConfig {
    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.scheme.is_none() && self.host.is_none() && self.port.is_none() && self.prefix_match.is_none() && self.replace_prefix.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RewriteConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_match: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_prefix: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CorsConfig {
    pub enable_cors: bool,
    #[serde(default)]
    pub allow_headers: String,
    #[serde(default)]
    pub allow_origin: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TimeoutConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_connect_timeout_ms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_send_timeout_ms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_read_timeout_ms: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RewriteRequestConfig {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers_var: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers_remove: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers_add: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers_add_var: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RewriteResponseConfig {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers_remove: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers_add: BTreeMap<String, Vec<String>>,
}

/// Everything a rule may carry besides match and upstream. The core only merges these and
/// copies them into the policy document.
#[derive(Clone, Debug, PartialEq)]
pub enum Extension {
    Redirect(RedirectConfig),
    Rewrite(RewriteConfig),
    Cors(CorsConfig),
    Vhost(String),
    Timeout(TimeoutConfig),
    RewriteRequest(RewriteRequestConfig),
    RewriteResponse(RewriteResponseConfig),
    Otel(Value),
    Auth(Value),
    Waf(Value),
    Custom { key: String, value: Value },
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtensionKind {
    Redirect,
    Rewrite,
    Cors,
    Vhost,
    Timeout,
    RewriteRequest,
    RewriteResponse,
    Otel,
    Auth,
    Waf,
    Custom(String),
}

impl Extension {
    pub fn kind(&self) -> ExtensionKind {
        match self {
            Extension::Redirect(_) => ExtensionKind::Redirect,
            Extension::Rewrite(_) => ExtensionKind::Rewrite,
            Extension::Cors(_) => ExtensionKind::Cors,
            Extension::Vhost(_) => ExtensionKind::Vhost,
            Extension::Timeout(_) => ExtensionKind::Timeout,
            Extension::RewriteRequest(_) => ExtensionKind::RewriteRequest,
            Extension::RewriteResponse(_) => ExtensionKind::RewriteResponse,
            Extension::Otel(_) => ExtensionKind::Otel,
            Extension::Auth(_) => ExtensionKind::Auth,
            Extension::Waf(_) => ExtensionKind::Waf,
            Extension::Custom { key, .. } => ExtensionKind::Custom(key.clone()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttachmentLevel {
    LoadBalancer,
    Frontend,
    Rule,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttachmentStrength {
    Default,
    Override,
}

/// Where an extension was declared. Ordering is strength first, then level, so an override
/// always beats a default and the most specific attachment wins between equals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Attachment {
    pub strength: AttachmentStrength,
    pub level: AttachmentLevel,
}

impl Attachment {
    pub const fn rule() -> Self {
        Self { strength: AttachmentStrength::Default, level: AttachmentLevel::Rule }
    }

    pub const fn frontend() -> Self {
        Self { strength: AttachmentStrength::Default, level: AttachmentLevel::Frontend }
    }

    pub const fn load_balancer() -> Self {
        Self { strength: AttachmentStrength::Default, level: AttachmentLevel::LoadBalancer }
    }

    pub const fn overriding(self) -> Self {
        Self { strength: AttachmentStrength::Override, level: self.level }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtensionSet {
    entries: BTreeMap<ExtensionKind, (Attachment, Extension)>,
}

impl ExtensionSet {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keeps the candidate with the highest attachment. Ties keep the extension seen first.
    pub fn attach(&mut self, attachment: Attachment, extension: Extension) {
        let kind = extension.kind();
        match self.entries.get(&kind) {
            Some((existing, _)) if *existing >= attachment => {},
            _ => {
                self.entries.insert(kind, (attachment, extension));
            },
        }
    }

    pub fn merge(&mut self, other: &ExtensionSet) {
        for (attachment, extension) in other.entries.values() {
            self.attach(*attachment, extension.clone());
        }
    }

    pub fn without(&self, kind: &ExtensionKind) -> ExtensionSet {
        let mut extensions = self.clone();
        extensions.entries.remove(kind);
        extensions
    }

    pub fn get(&self, kind: &ExtensionKind) -> Option<&Extension> {
        self.entries.get(kind).map(|(_, extension)| extension)
    }

    pub fn extensions(&self) -> impl Iterator<Item = &Extension> {
        self.entries.values().map(|(_, extension)| extension)
    }

    pub fn redirect(&self) -> Option<&RedirectConfig> {
        match self.get(&ExtensionKind::Redirect) {
            Some(Extension::Redirect(redirect)) => Some(redirect),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn timeout(ms: u32) -> Extension {
        Extension::Timeout(TimeoutConfig { proxy_read_timeout_ms: Some(ms), ..Default::default() })
    }

    #[test]
    pub fn test_most_specific_default_wins() {
        let mut extensions = ExtensionSet::default();
        extensions.attach(Attachment::load_balancer(), timeout(1));
        extensions.attach(Attachment::rule(), timeout(3));
        extensions.attach(Attachment::frontend(), timeout(2));
        assert_eq!(extensions.get(&ExtensionKind::Timeout), Some(&timeout(3)));
    }

    #[test]
    pub fn test_override_beats_default() {
        let mut extensions = ExtensionSet::default();
        extensions.attach(Attachment::rule(), timeout(3));
        extensions.attach(Attachment::load_balancer().overriding(), timeout(1));
        extensions.attach(Attachment::frontend(), timeout(2));
        assert_eq!(extensions.get(&ExtensionKind::Timeout), Some(&timeout(1)));
    }

    #[test]
    pub fn test_merge_keeps_independent_kinds() {
        let mut rule = ExtensionSet::default();
        rule.attach(Attachment::rule(), Extension::Vhost("a.com".to_owned()));
        rule.attach(Attachment::rule(), Extension::Custom { key: "waf_lite".to_owned(), value: json!({"enable": true}) });

        let mut frontend = ExtensionSet::default();
        frontend.attach(Attachment::frontend(), Extension::Vhost("b.com".to_owned()));
        frontend.attach(Attachment::frontend(), timeout(5));

        rule.merge(&frontend);
        let kinds: Vec<_> = rule.extensions().map(Extension::kind).collect();
        assert_eq!(kinds, vec![ExtensionKind::Vhost, ExtensionKind::Timeout, ExtensionKind::Custom("waf_lite".to_owned())]);
        assert_eq!(rule.get(&ExtensionKind::Vhost), Some(&Extension::Vhost("a.com".to_owned())));
    }
}
