use std::collections::BTreeMap;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::common::{
    matcher::{self, MatchError, Specificity, KEY_URL, OP_STARTS_WITH},
    sort_policies, ExtensionKind, ExtensionSet, Frontend, InternalRule, LoadBalancer, NgxPolicy, Policy, Protocol, Subsystem, MATCH_FIRST, MATCH_LAST,
};

fn match_everything() -> Vec<Value> {
    vec![json!([OP_STARTS_WITH, KEY_URL, "/"])]
}

/// Turns the resolved frontends of a load balancer into the ordered policy buckets of the data
/// plane document.
pub struct PolicyGenerator<'a> {
    load_balancer: &'a LoadBalancer,
    specificity: &'a dyn Specificity,
    log_context: &'a str,
}

impl<'a> PolicyGenerator<'a> {
    pub fn new(load_balancer: &'a LoadBalancer, specificity: &'a dyn Specificity, log_context: &'a str) -> Self {
        Self { load_balancer, specificity, log_context }
    }

    pub fn generate(&self) -> NgxPolicy {
        let mut policy = NgxPolicy::default();
        for frontend in self.load_balancer.active_frontends() {
            if frontend.protocol.is_stream() {
                let bucket = if frontend.protocol == Protocol::Udp { &mut policy.stream.udp } else { &mut policy.stream.tcp };
                bucket.entry(frontend.port).or_default().push(self.stream_policy(frontend));
            } else {
                let policies = self.http_policies(frontend);
                policy.http.tcp.entry(frontend.port).or_default().extend(policies);
            }
        }

        let buckets = policy.http.tcp.values_mut().chain(policy.stream.tcp.values_mut()).chain(policy.stream.udp.values_mut());
        for bucket in buckets {
            sort_policies(bucket);
        }
        debug!(
            "{} Generated {} http and {} stream policies",
            self.log_context,
            count(&policy.http.tcp),
            count(&policy.stream.tcp) + count(&policy.stream.udp)
        );
        policy
    }

    fn stream_policy(&self, frontend: &Frontend) -> Policy {
        let log_context = self.log_context;
        let Some(rule) = frontend.rules.first() else {
            let upstream = frontend.backend_group.as_ref().map(|group| group.name.clone());
            if frontend.default_backend_group().is_none() {
                warn!("{log_context} Stream frontend {} has neither rules nor a default backend group", frontend.name);
            }
            return Policy { rule: frontend.default_group_name(), upstream, subsystem: Subsystem::Stream, ..Default::default() };
        };

        if frontend.rules.len() > 1 {
            warn!("{log_context} Stream frontend {} can only serve one rule, ignoring {}", frontend.name, frontend.rules.len() - 1);
        }
        let mut policy =
            Policy { rule: rule.rule_id.clone(), upstream: Some(rule.backend_group.name.clone()), subsystem: Subsystem::Stream, ..Default::default() };
        policy.apply_extensions(&rule.extensions);
        policy
    }

    fn http_policies(&self, frontend: &Frontend) -> Vec<Policy> {
        let log_context = self.log_context;
        let inherited = frontend.extensions.without(&ExtensionKind::Redirect);
        let mut policies: Vec<Policy> = frontend
            .rules
            .iter()
            .filter_map(|rule| match self.rule_policy(rule, &inherited) {
                Ok(policy) => Some(policy),
                Err(e) => {
                    warn!("{log_context} Skipping rule {} {e}", rule.rule_id);
                    None
                },
            })
            .collect();

        if let Some(policy) = Self::default_policy(frontend) {
            policies.push(policy);
        }
        policies
    }

    fn rule_policy(&self, rule: &InternalRule, inherited: &ExtensionSet) -> Result<Policy, MatchError> {
        let dslx = rule.dslx.as_ref().ok_or(MatchError::NoMatcher)?;
        let compiled = matcher::compile(dslx, self.specificity)?;
        let group = &rule.backend_group;

        let mut policy = Policy {
            internal_dsl: compiled.internal_dsl,
            internal_dsl_len: compiled.serialized_len,
            upstream: group.has_backends().then(|| group.name.clone()),
            complexity_priority: compiled.specificity,
            user_priority: rule.priority,
            subsystem: Subsystem::Http,
            rule: rule.rule_id.clone(),
            backend_protocol: rule.backend_protocol.clone(),
            source: rule.source.clone(),
            ..Default::default()
        };
        if let Some(source) = rule.ingress_source() {
            policy.source_type.clone_from(&source.source_type);
            policy.source_name.clone_from(&source.name);
            policy.source_ns.clone_from(&source.namespace);
        }

        let mut extensions = rule.extensions.clone();
        extensions.merge(inherited);
        policy.apply_extensions(&extensions);
        Ok(policy)
    }

    /// Catch-all policy of a frontend. A frontend redirect matches before every rule, a default
    /// backend group only after all of them.
    fn default_policy(frontend: &Frontend) -> Option<Policy> {
        let upstream = frontend.default_backend_group().map(|group| group.name.clone());
        let redirect = frontend.extensions.redirect().is_some();
        if upstream.is_none() && !redirect {
            return None;
        }

        let internal_dsl = match_everything();
        let policy = Policy {
            internal_dsl_len: matcher::serialized_len(&internal_dsl),
            internal_dsl,
            upstream,
            subsystem: Subsystem::Http,
            rule: frontend.name.clone(),
            backend_protocol: frontend.backend_protocol.clone(),
            source: frontend.source.clone(),
            ..Default::default()
        };
        let mut policy = policy.with_contract(if redirect { MATCH_FIRST } else { MATCH_LAST });
        policy.apply_extensions(&frontend.extensions);
        Some(policy)
    }
}

fn count(buckets: &BTreeMap<i32, Vec<Policy>>) -> usize {
    buckets.values().map(Vec::len).sum()
}
