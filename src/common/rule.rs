use typed_builder::TypedBuilder;

use super::{matcher::Dslx, BackendGroup, BackendService, ExtensionSet, Source, SOURCE_TYPE_INGRESS};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleOrigin {
    RuleCr,
    Ingress,
    Gateway,
}

/// Canonical rule shared by the legacy rule resources and gateway routes.
#[derive(Clone, Debug, TypedBuilder)]
pub struct InternalRule {
    #[builder(setter(into))]
    pub rule_id: String,
    pub origin: RuleOrigin,
    #[builder(default)]
    pub source: Option<Source>,
    #[builder(default)]
    pub priority: i32,
    #[builder(default)]
    pub dslx: Option<Dslx>,
    #[builder(default, setter(into))]
    pub domain: String,
    #[builder(default, setter(into))]
    pub certificate_name: String,
    #[builder(default, setter(into))]
    pub backend_protocol: String,
    #[builder(default, setter(into))]
    pub session_affinity_policy: String,
    #[builder(default, setter(into))]
    pub session_affinity_attribute: String,
    #[builder(default)]
    pub services: Vec<BackendService>,
    #[builder(default)]
    pub backend_group: BackendGroup,
    #[builder(default)]
    pub extensions: ExtensionSet,
}

impl InternalRule {
    /// Redirect rules legitimately point at services which do not exist.
    pub fn allow_no_address(&self) -> bool {
        self.extensions.redirect().is_some()
    }

    pub fn ingress_source(&self) -> Option<&Source> {
        self.source.as_ref().filter(|s| s.source_type == SOURCE_TYPE_INGRESS)
    }
}
