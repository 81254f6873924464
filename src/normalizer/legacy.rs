use kube::ResourceExt;
use tracing::{debug, info};

use crate::{
    common::{
        Attachment, BackendGroup, CorsConfig, Extension, ExtensionSet, Frontend, InternalRule, Protocol, RedirectConfig, RewriteConfig, RuleOrigin, SOURCE_TYPE_INGRESS,
    },
    crds::{frontend_label, AlbCr, FrontendCr, RuleCr, SharedConfig},
};

fn attach_shared(extensions: &mut ExtensionSet, attachment: Attachment, shared: &SharedConfig) {
    if let Some(timeout) = &shared.timeout {
        extensions.attach(attachment, Extension::Timeout(timeout.clone()));
    }
    if let Some(otel) = &shared.otel {
        extensions.attach(attachment, Extension::Otel(otel.clone()));
    }
    if let Some(auth) = &shared.auth {
        extensions.attach(attachment, Extension::Auth(auth.clone()));
    }
    if let Some(waf) = &shared.waf {
        extensions.attach(attachment, Extension::Waf(waf.clone()));
    }
}

/// Configuration of the load balancer itself. Every frontend inherits it unless the frontend or
/// one of its rules declares its own.
pub fn load_balancer_extensions(alb: &AlbCr) -> ExtensionSet {
    let mut extensions = ExtensionSet::default();
    if let Some(config) = &alb.spec.config {
        attach_shared(&mut extensions, Attachment::load_balancer(), config);
    }
    extensions
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}

/// Translates Frontend and Rule resources of one load balancer.
pub struct LegacyNormalizer<'a> {
    alb_name: &'a str,
    domain: &'a str,
    log_context: &'a str,
}

impl<'a> LegacyNormalizer<'a> {
    pub fn new(alb_name: &'a str, domain: &'a str, log_context: &'a str) -> Self {
        Self { alb_name, domain, log_context }
    }

    pub fn frontends(&self, frontends: &[FrontendCr], rules: &[RuleCr]) -> Vec<Frontend> {
        let label = frontend_label(self.domain);
        frontends
            .iter()
            .filter_map(|frontend| {
                let name = frontend.name_any();
                let namespace = frontend.namespace();
                let rules: Vec<&RuleCr> =
                    rules.iter().filter(|rule| rule.labels().get(&label) == Some(&name) && rule.namespace() == namespace).collect();
                self.frontend(frontend, &rules)
            })
            .collect()
    }

    pub fn frontend(&self, frontend: &FrontendCr, rules: &[&RuleCr]) -> Option<Frontend> {
        let log_context = self.log_context;
        let name = frontend.name_any();
        let spec = &frontend.spec;
        if spec.port <= 0 {
            info!("{log_context} Frontend {name} has an invalid port {}", spec.port);
            return None;
        }
        let protocol = spec.protocol.parse::<Protocol>().unwrap_or_else(|e| {
            info!("{log_context} Frontend {name} {e}, using tcp");
            Protocol::Tcp
        });

        let mut extensions = ExtensionSet::default();
        if let Some(config) = &spec.config {
            attach_shared(&mut extensions, Attachment::frontend(), &config.shared);
            if let Some(redirect) = config.redirect.as_ref().filter(|r| !r.is_empty()) {
                extensions.attach(Attachment::frontend(), Extension::Redirect(redirect.clone()));
            }
        }

        let mut ft = Frontend::builder()
            .name(name)
            .alb_name(self.alb_name)
            .port(spec.port)
            .protocol(protocol)
            .backend_protocol(spec.backend_protocol.to_lowercase())
            .source(spec.source.clone())
            .certificate_name(spec.certificate_name.clone())
            .rules(rules.iter().map(|rule| self.rule(rule)).collect())
            .extensions(extensions)
            .conflict(frontend.status.as_ref().is_some_and(|status| status.conflict()))
            .build();

        if let Some(group) = &spec.service_group {
            ft.services = group.backend_services();
            ft.backend_group = Some(BackendGroup {
                name: ft.default_group_name(),
                session_affinity_policy: group.session_affinity_policy.clone(),
                session_affinity_attribute: group.session_affinity_attribute.clone(),
                ..Default::default()
            });
        }
        debug!("{log_context} Frontend {} with {} rules", ft.name, ft.rules.len());
        Some(ft)
    }

    pub fn rule(&self, rule: &RuleCr) -> InternalRule {
        let spec = &rule.spec;
        let origin = match &spec.source {
            Some(source) if source.source_type == SOURCE_TYPE_INGRESS => RuleOrigin::Ingress,
            _ => RuleOrigin::RuleCr,
        };

        let attachment = Attachment::rule();
        let mut extensions = ExtensionSet::default();
        if let Some(config) = &spec.config {
            attach_shared(&mut extensions, attachment, &config.shared);
            if let Some(rewrite) = &config.rewrite_request {
                extensions.attach(attachment, Extension::RewriteRequest(rewrite.clone()));
            }
            if let Some(rewrite) = &config.rewrite_response {
                extensions.attach(attachment, Extension::RewriteResponse(rewrite.clone()));
            }
            if let Some(redirect) = config.redirect.as_ref().filter(|r| !r.is_empty()) {
                extensions.attach(attachment, Extension::Redirect(redirect.clone()));
            }
        }
        if !spec.redirect_url.is_empty() {
            extensions.attach(
                attachment,
                Extension::Redirect(RedirectConfig { url: Some(spec.redirect_url.clone()), code: Some(spec.redirect_code), ..Default::default() }),
            );
        }
        if !spec.url.is_empty() || !spec.rewrite_base.is_empty() || !spec.rewrite_target.is_empty() {
            extensions.attach(
                attachment,
                Extension::Rewrite(RewriteConfig {
                    url: non_empty(&spec.url),
                    rewrite_base: non_empty(&spec.rewrite_base),
                    rewrite_target: non_empty(&spec.rewrite_target),
                    ..Default::default()
                }),
            );
        }
        if spec.enable_cors || !spec.cors_allow_headers.is_empty() || !spec.cors_allow_origin.is_empty() {
            extensions.attach(
                attachment,
                Extension::Cors(CorsConfig {
                    enable_cors: spec.enable_cors,
                    allow_headers: spec.cors_allow_headers.clone(),
                    allow_origin: spec.cors_allow_origin.clone(),
                }),
            );
        }
        if !spec.vhost.is_empty() {
            extensions.attach(attachment, Extension::Vhost(spec.vhost.clone()));
        }

        let (services, affinity_policy, affinity_attribute) = match &spec.service_group {
            Some(group) => (group.backend_services(), group.session_affinity_policy.clone(), group.session_affinity_attribute.clone()),
            None => (vec![], String::new(), String::new()),
        };

        InternalRule::builder()
            .rule_id(rule.name_any())
            .origin(origin)
            .source(spec.source.clone())
            .priority(spec.priority)
            .dslx(spec.dslx.clone())
            .domain(spec.domain.clone())
            .certificate_name(spec.certificate_name.clone())
            .backend_protocol(spec.backend_protocol.to_lowercase())
            .session_affinity_policy(affinity_policy)
            .session_affinity_attribute(affinity_attribute)
            .services(services)
            .extensions(extensions)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{BackendService, ExtensionKind, TimeoutConfig};

    const FRONTENDS: &str = r"
- metadata:
    name: alb-00080
    namespace: cpaas-system
  spec:
    port: 80
    protocol: http
    serviceGroup:
      session_affinity_policy: cookie
      session_affinity_attribute: sid
      services:
      - name: svc-default
        namespace: default
        port: 80
        weight: 100
- metadata:
    name: alb-00000
    namespace: cpaas-system
  spec:
    port: 0
    protocol: http
- metadata:
    name: alb-09000
    namespace: cpaas-system
  spec:
    port: 9000
    protocol: sctp
  status:
    instances:
      pod-a:
        conflict: true
";

    const RULES: &str = r"
- metadata:
    name: alb-00080-a
    namespace: cpaas-system
    labels:
      alb2.cpaas.io/frontend: alb-00080
  spec:
    priority: 3
    backendProtocol: HTTP
    dslx:
    - type: URL
      values:
      - [STARTS_WITH, /a]
    vhost: a.internal
    rewrite_target: /b
    source:
      type: ingress
      name: ing-a
      namespace: default
    serviceGroup:
      services:
      - name: svc-a
        namespace: default
        port: 80
        weight: 50
- metadata:
    name: alb-00080-other-namespace
    namespace: default
    labels:
      alb2.cpaas.io/frontend: alb-00080
  spec:
    priority: 1
- metadata:
    name: alb-09000-a
    namespace: cpaas-system
    labels:
      alb2.cpaas.io/frontend: alb-09000
  spec:
    redirectURL: /login
    redirectCode: 302
";

    #[test]
    pub fn test_legacy_frontends() {
        let frontends: Vec<FrontendCr> = serde_yaml::from_str(FRONTENDS).unwrap();
        let rules: Vec<RuleCr> = serde_yaml::from_str(RULES).unwrap();
        let normalizer = LegacyNormalizer::new("alb", "cpaas.io", "test");
        let frontends = normalizer.frontends(&frontends, &rules);

        assert_eq!(frontends.len(), 2);
        let http = &frontends[0];
        assert_eq!(http.name, "alb-00080");
        assert!(!http.conflict);
        assert_eq!(http.services, vec![BackendService { namespace: "default".to_owned(), name: "svc-default".to_owned(), port: 80, weight: 100 }]);
        let group = http.backend_group.as_ref().unwrap();
        assert_eq!(group.name, "alb-80-http");
        assert_eq!(group.session_affinity_policy, "cookie");

        assert_eq!(http.rules.len(), 1);
        let rule = &http.rules[0];
        assert_eq!(rule.rule_id, "alb-00080-a");
        assert_eq!(rule.origin, RuleOrigin::Ingress);
        assert_eq!(rule.backend_protocol, "http");
        assert_eq!(rule.priority, 3);
        assert_eq!(rule.extensions.get(&ExtensionKind::Vhost), Some(&Extension::Vhost("a.internal".to_owned())));
        assert!(rule.extensions.get(&ExtensionKind::Rewrite).is_some());

        let stream = &frontends[1];
        assert_eq!(stream.protocol, Protocol::Tcp);
        assert!(stream.conflict);
        assert!(stream.rules[0].allow_no_address());
    }

    #[test]
    pub fn test_load_balancer_extensions() {
        let alb = r"
apiVersion: crd.alauda.io/v2beta1
kind: ALB2
metadata: {name: alb, namespace: cpaas-system}
spec:
  address: 10.0.0.1
  type: nginx
  config:
    timeout: {proxy_read_timeout_ms: 100}
    otel: {exporter: {collector: {address: http://otel:4318}}}
";
        let alb: AlbCr = serde_yaml::from_str(alb).unwrap();
        let inherited = load_balancer_extensions(&alb);
        assert_eq!(inherited.extensions().count(), 2);

        let mut extensions = ExtensionSet::default();
        extensions.attach(Attachment::frontend(), Extension::Timeout(TimeoutConfig { proxy_read_timeout_ms: Some(5), ..Default::default() }));
        extensions.merge(&inherited);
        assert_eq!(extensions.get(&ExtensionKind::Timeout), Some(&Extension::Timeout(TimeoutConfig { proxy_read_timeout_ms: Some(5), ..Default::default() })));
        assert!(extensions.get(&ExtensionKind::Otel).is_some());

        let mut overridden = ExtensionSet::default();
        overridden.attach(Attachment::load_balancer().overriding(), Extension::Timeout(TimeoutConfig::default()));
        extensions.merge(&overridden);
        assert_eq!(extensions.get(&ExtensionKind::Timeout), Some(&Extension::Timeout(TimeoutConfig::default())));

        let bare: AlbCr = serde_yaml::from_str("apiVersion: crd.alauda.io/v2beta1\nkind: ALB2\nmetadata: {name: alb}\nspec: {address: '', type: nginx}").unwrap();
        assert!(load_balancer_extensions(&bare).is_empty());
    }
}
