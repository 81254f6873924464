use std::{collections::BTreeMap, fmt::Debug};

use gateway_api::{
    common::{HTTPFilterType, HeaderMatch, HeaderMatchType, HeaderModifier, RequestRedirectScheme},
    httproutes::{HTTPRoute, HttpRouteFilter, HttpRouteRule, HttpRouteRulesMatchesPathType, PathMatch, RouteMatch},
};
use kube::ResourceExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::NormalizeError;
use crate::{
    common::{
        backend_services,
        matcher::{Dslx, DslxTerm, MatchError, KEY_HEADER, KEY_HOST, KEY_METHOD, KEY_PARAM, KEY_URL, OP_ENDS_WITH, OP_EQ, OP_IN, OP_REGEX, OP_STARTS_WITH},
        metadata_key, AttachedListener, Attachment, BackendRef, Extension, ExtensionSet, Frontend, FrontendKey, InternalRule, Protocol, RedirectConfig,
        ResourceKey, RewriteConfig, RewriteRequestConfig, RewriteResponseConfig, RuleOrigin, Source, BACKEND_PROTOCOL_FROM_APP_PROTOCOL, DEFAULT_NAMESPACE_NAME,
        SOURCE_TYPE_GRPC_ROUTE, SOURCE_TYPE_HTTP_ROUTE, SOURCE_TYPE_TCP_ROUTE, SOURCE_TYPE_UDP_ROUTE,
    },
    crds::{TimeoutPolicyCr, GATEWAY_KIND},
};

const HTTP_ROUTE_KIND: &str = "HTTPRoute";
const GRPC_ROUTE_KIND: &str = "GRPCRoute";
const TCP_ROUTE_KIND: &str = "TCPRoute";
const UDP_ROUTE_KIND: &str = "UDPRoute";

/// A missing path type means exact.
fn path_op(path_type: Option<&HttpRouteRulesMatchesPathType>) -> &'static str {
    match path_type {
        None | Some(HttpRouteRulesMatchesPathType::Exact) => OP_EQ,
        Some(HttpRouteRulesMatchesPathType::PathPrefix) => OP_STARTS_WITH,
        Some(HttpRouteRulesMatchesPathType::RegularExpression) => OP_REGEX,
    }
}

fn value_op(match_type: Option<&HeaderMatchType>) -> &'static str {
    match match_type {
        None | Some(HeaderMatchType::Exact) => OP_EQ,
        Some(HeaderMatchType::RegularExpression) => OP_REGEX,
    }
}

fn method_name<M: Serialize + Debug>(method: &M) -> Result<String, MatchError> {
    serde_json::to_value(method)
        .ok()
        .and_then(|value| value.as_str().map(str::to_owned))
        .ok_or_else(|| MatchError::UnsupportedMatchType(format!("{method:?}")))
}

fn keyed_terms(dslx: &mut Dslx, term_type: &str, matches: Option<&Vec<HeaderMatch>>) {
    for m in matches.into_iter().flatten() {
        dslx.push(DslxTerm::new(term_type, value_op(m.r#type.as_ref()), &[m.value.as_str()]).with_key(&m.name));
    }
}

/// Builds the match expression of one route match. Hostnames come first, then query params,
/// path, headers and method.
pub fn match_to_dslx(hostnames: &[String], route_match: &RouteMatch) -> Result<Dslx, MatchError> {
    let mut dslx = Dslx::new();

    match hostnames {
        [] => {},
        [hostname] if hostname.starts_with("*.") => dslx.push(DslxTerm::new(KEY_HOST, OP_ENDS_WITH, &[hostname.as_str()])),
        hostnames => {
            let hostnames: Vec<&str> = hostnames.iter().map(String::as_str).collect();
            dslx.push(DslxTerm::new(KEY_HOST, OP_IN, &hostnames));
        },
    }

    keyed_terms(&mut dslx, KEY_PARAM, route_match.query_params.as_ref());

    if let Some(path) = &route_match.path {
        dslx.push(DslxTerm::new(KEY_URL, path_op(path.r#type.as_ref()), &[path.value.as_deref().unwrap_or("/")]));
    }

    keyed_terms(&mut dslx, KEY_HEADER, route_match.headers.as_ref());

    if let Some(method) = &route_match.method {
        let method = method_name(method)?;
        dslx.push(DslxTerm::new(KEY_METHOD, OP_EQ, &[method.as_str()]));
    }
    Ok(dslx)
}

/// What a rule without matches means: everything under `/`.
pub fn effective_matches(rule: &HttpRouteRule) -> Vec<RouteMatch> {
    match rule.matches.as_deref() {
        Some(matches) if !matches.is_empty() => matches.to_vec(),
        _ => vec![RouteMatch {
            path: Some(PathMatch { r#type: Some(HttpRouteRulesMatchesPathType::PathPrefix), value: Some("/".to_owned()) }),
            ..Default::default()
        }],
    }
}

fn match_prefix(route_match: &RouteMatch) -> Option<String> {
    route_match
        .path
        .as_ref()
        .filter(|path| matches!(path.r#type, Some(HttpRouteRulesMatchesPathType::PathPrefix)))
        .and_then(|path| path.value.clone())
}

fn filters_of(rule: &HttpRouteRule, filter_type: HTTPFilterType) -> impl Iterator<Item = &HttpRouteFilter> {
    rule.filters.iter().flatten().filter(move |filter| filter.r#type == filter_type)
}

#[derive(Default)]
struct HeaderChanges {
    set: BTreeMap<String, String>,
    add: BTreeMap<String, Vec<String>>,
    remove: Vec<String>,
}

impl HeaderChanges {
    fn collect<'a>(filters: impl Iterator<Item = &'a HeaderModifier>) -> Option<Self> {
        let mut changes: Option<Self> = None;
        for filter in filters {
            let changes = changes.get_or_insert_with(Self::default);
            for header in filter.set.iter().flatten() {
                changes.set.insert(header.name.clone(), header.value.clone());
            }
            for header in filter.add.iter().flatten() {
                changes.add.entry(header.name.clone()).or_default().push(header.value.clone());
            }
            changes.remove.extend(filter.remove.iter().flatten().cloned());
        }
        changes
    }
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

/// Route filters as rule extensions. Prefix replacements pick up the prefix of the match they
/// belong to.
pub fn filter_extensions(rule: &HttpRouteRule, route_match: &RouteMatch, log_context: &str) -> ExtensionSet {
    let attachment = Attachment::rule();
    let mut extensions = ExtensionSet::default();
    let match_prefix = match_prefix(route_match);

    let request_headers = filters_of(rule, HTTPFilterType::RequestHeaderModifier).filter_map(|f| f.request_header_modifier.as_ref());
    if let Some(changes) = HeaderChanges::collect(request_headers) {
        extensions.attach(
            attachment,
            Extension::RewriteRequest(RewriteRequestConfig { headers: changes.set, headers_remove: changes.remove, headers_add: changes.add, ..Default::default() }),
        );
    }

    let response_headers = filters_of(rule, HTTPFilterType::ResponseHeaderModifier).filter_map(|f| f.response_header_modifier.as_ref());
    if let Some(changes) = HeaderChanges::collect(response_headers) {
        extensions.attach(
            attachment,
            Extension::RewriteResponse(RewriteResponseConfig { headers: changes.set, headers_remove: changes.remove, headers_add: changes.add }),
        );
    }

    let redirects: Vec<_> = filters_of(rule, HTTPFilterType::RequestRedirect).filter_map(|f| f.request_redirect.as_ref()).collect();
    match redirects.as_slice() {
        [] => {},
        [redirect] => {
            let path = redirect.path.as_ref();
            let replace_prefix = non_blank(path.and_then(|p| p.replace_prefix_match.as_ref()));
            let config = RedirectConfig {
                code: Some(redirect.status_code.and_then(|code| i32::try_from(code).ok()).unwrap_or_default()),
                url: non_blank(path.and_then(|p| p.replace_full_path.as_ref())),
                scheme: redirect.scheme.as_ref().map(|scheme| {
                    match scheme {
                        RequestRedirectScheme::Http => "http",
                        RequestRedirectScheme::Https => "https",
                    }
                    .to_owned()
                }),
                host: redirect.hostname.clone().filter(|h| !h.is_empty()),
                port: redirect.port.and_then(|port| i32::try_from(port).ok()).filter(|p| *p > 0),
                prefix_match: replace_prefix.as_ref().and(match_prefix.clone()),
                replace_prefix,
            };
            extensions.attach(attachment, Extension::Redirect(config));
        },
        _ => info!("{log_context} Only one request redirect filter is allowed, ignoring {}", redirects.len()),
    }

    let rewrites: Vec<_> = filters_of(rule, HTTPFilterType::UrlRewrite).filter_map(|f| f.url_rewrite.as_ref()).collect();
    match rewrites.as_slice() {
        [] => {},
        [rewrite] => {
            if let Some(hostname) = &rewrite.hostname {
                extensions.attach(attachment, Extension::Vhost(hostname.clone()));
            }
            if let Some(path) = &rewrite.path {
                let config = if let Some(full_path) = &path.replace_full_path {
                    Some(RewriteConfig { rewrite_base: Some(".*".to_owned()), rewrite_target: Some(full_path.clone()), ..Default::default() })
                } else {
                    path.replace_prefix_match.as_ref().filter(|p| !p.is_empty()).map(|replace_prefix| RewriteConfig {
                        replace_prefix: Some(replace_prefix.clone()),
                        prefix_match: match_prefix.clone(),
                        ..Default::default()
                    })
                };
                if let Some(config) = config {
                    extensions.attach(attachment, Extension::Rewrite(config));
                }
            }
        },
        _ => info!("{log_context} Only one url rewrite filter is allowed, ignoring {}", rewrites.len()),
    }
    extensions
}

fn route_kind(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Grpc => GRPC_ROUTE_KIND,
        Protocol::Tcp => TCP_ROUTE_KIND,
        Protocol::Udp => UDP_ROUTE_KIND,
        Protocol::Http | Protocol::Https => HTTP_ROUTE_KIND,
    }
}

/// Translates attached gateway listeners of one load balancer.
pub struct GatewayNormalizer<'a> {
    alb_name: &'a str,
    domain: &'a str,
    log_context: &'a str,
    timeout_policies: &'a [TimeoutPolicyCr],
}

impl<'a> GatewayNormalizer<'a> {
    pub fn new(alb_name: &'a str, domain: &'a str, log_context: &'a str) -> Self {
        Self { alb_name, domain, log_context, timeout_policies: &[] }
    }

    pub fn with_timeout_policies(mut self, timeout_policies: &'a [TimeoutPolicyCr]) -> Self {
        self.timeout_policies = timeout_policies;
        self
    }

    /// Listeners sharing a port and protocol end up in one frontend.
    pub fn frontends(&self, listeners: &[AttachedListener]) -> Vec<Frontend> {
        let log_context = self.log_context;
        let mut frontends: BTreeMap<FrontendKey, Frontend> = BTreeMap::new();
        for listener in listeners {
            let protocol = match listener.protocol() {
                Ok(protocol) => protocol,
                Err(e) => {
                    warn!("{log_context} Skipping listener {}/{} {e}", listener.gateway_key(), listener.name());
                    continue;
                },
            };
            let rules = if protocol.is_stream() { self.stream_rules(listener, protocol) } else { self.http_rules(listener, protocol) };
            if rules.is_empty() {
                debug!("{log_context} Listener {}/{} has no usable rules", listener.gateway_key(), listener.name());
                continue;
            }

            let port = listener.port();
            let key = FrontendKey { port, protocol };
            let frontend = frontends.entry(key).or_insert_with(|| {
                Frontend::builder().name(format!("{}-{port}-{protocol}", self.alb_name)).alb_name(self.alb_name).port(port).protocol(protocol).build()
            });
            if protocol.is_stream() && !frontend.rules.is_empty() {
                warn!("{log_context} Port {port} is already taken by another {protocol} listener, ignoring {}/{}", listener.gateway_key(), listener.name());
                continue;
            }
            frontend.rules.extend(rules);
        }
        frontends.into_values().collect()
    }

    /// Timeouts attached to the gateway act at frontend level, the ones attached to the route at
    /// rule level. Policies aimed at one listener or one rule of a route are ignored.
    fn timeout_extensions(&self, gateway: &ResourceKey, route: &ResourceKey, kind: &str) -> ExtensionSet {
        let mut extensions = ExtensionSet::default();
        for policy in self.timeout_policies {
            let target = &policy.spec.target_ref;
            let namespace = target.namespace.clone().or_else(|| policy.namespace()).unwrap_or_else(|| DEFAULT_NAMESPACE_NAME.to_owned());
            let target_key = ResourceKey::namespaced(&target.name, &namespace);
            let attachment = if target.kind == GATEWAY_KIND && target_key == *gateway {
                Attachment::frontend()
            } else if target.kind == kind && target_key == *route {
                Attachment::rule()
            } else {
                continue;
            };
            if target.has_section() {
                debug!("{} Ignoring timeout policy {} aimed at a section of {target_key}", self.log_context, policy.name_any());
                continue;
            }
            if let Some(timeout) = &policy.spec.default {
                extensions.attach(attachment, Extension::Timeout(timeout.clone()));
            }
            if let Some(timeout) = &policy.spec.overriding {
                extensions.attach(attachment.overriding(), Extension::Timeout(timeout.clone()));
            }
        }
        extensions
    }

    fn http_rules(&self, listener: &AttachedListener, protocol: Protocol) -> Vec<InternalRule> {
        let log_context = self.log_context;
        let (domain, certificate_name) = if protocol == Protocol::Https || (protocol == Protocol::Grpc && listener.has_tls()) {
            match listener.certificate() {
                Ok((key, hostname)) => (hostname.to_owned(), key.to_string()),
                Err(e) => {
                    warn!("{log_context} Skipping listener {}/{} {e}", listener.gateway_key(), listener.name());
                    return vec![];
                },
            }
        } else {
            (String::new(), String::new())
        };

        let mut rules = vec![];
        for route in &listener.http_routes {
            let hostnames: Vec<String> = match route.spec.hostnames.as_ref().filter(|hostnames| !hostnames.is_empty()) {
                Some(hostnames) => hostnames.clone(),
                None => listener.hostname().into_iter().cloned().collect(),
            };
            let timeouts = self.timeout_extensions(&listener.gateway_key(), &metadata_key(&route.metadata), route_kind(protocol));
            for (rule_index, route_rule) in route.spec.rules.iter().flatten().enumerate() {
                for (match_index, route_match) in effective_matches(route_rule).iter().enumerate() {
                    let rule_id = self.http_rule_id(listener, route, rule_index, match_index);
                    match self.http_rule(&rule_id, route, route_rule, route_match, &hostnames, (rule_index, match_index), protocol) {
                        Ok(mut rule) => {
                            rule.domain.clone_from(&domain);
                            rule.certificate_name.clone_from(&certificate_name);
                            rule.extensions.merge(&timeouts);
                            rules.push(rule);
                        },
                        Err(e) => warn!("{log_context} Skipping rule {rule_id} {e}"),
                    }
                }
            }
        }
        rules
    }

    fn http_rule_id(&self, listener: &AttachedListener, route: &HTTPRoute, rule_index: usize, match_index: usize) -> String {
        let route_key = metadata_key(&route.metadata);
        format!(
            "{}-{}-{}-{}-{}-{}-{rule_index}-{match_index}",
            listener.port(),
            listener.gateway_namespace,
            listener.gateway_name,
            listener.name(),
            route_key.namespace,
            route_key.name
        )
    }

    fn priority(&self, route: &HTTPRoute, rule_index: usize, match_index: usize) -> i32 {
        let key = format!("alb.{}/gateway-http-router-rule-priority-{rule_index}-{match_index}", self.domain);
        match route.annotations().get(&key).map(|priority| priority.parse::<i32>()) {
            Some(Ok(priority)) => priority,
            Some(Err(e)) => {
                info!("{} Invalid priority annotation {key} on {} {e}", self.log_context, metadata_key(&route.metadata));
                0
            },
            None => 0,
        }
    }

    fn http_rule(
        &self,
        rule_id: &str,
        route: &HTTPRoute,
        route_rule: &HttpRouteRule,
        route_match: &RouteMatch,
        hostnames: &[String],
        (rule_index, match_index): (usize, usize),
        protocol: Protocol,
    ) -> Result<InternalRule, NormalizeError> {
        let dslx = match_to_dslx(hostnames, route_match)?;
        let backend_refs: Vec<BackendRef> = route_rule.backend_refs.iter().flatten().map(BackendRef::from).collect();
        let services = backend_services(&backend_refs)?;
        let route_key = metadata_key(&route.metadata);
        let source_type = if protocol == Protocol::Grpc { SOURCE_TYPE_GRPC_ROUTE } else { SOURCE_TYPE_HTTP_ROUTE };

        Ok(InternalRule::builder()
            .rule_id(rule_id)
            .origin(RuleOrigin::Gateway)
            .source(Some(Source { name: route_key.name, namespace: route_key.namespace, source_type: source_type.to_owned() }))
            .priority(self.priority(route, rule_index, match_index))
            .dslx(Some(dslx))
            .backend_protocol(BACKEND_PROTOCOL_FROM_APP_PROTOCOL)
            .services(services)
            .extensions(filter_extensions(route_rule, route_match, self.log_context))
            .build())
    }

    /// A stream listener forwards everything to the single rule of its single route.
    fn stream_rules(&self, listener: &AttachedListener, protocol: Protocol) -> Vec<InternalRule> {
        let log_context = self.log_context;
        let [route] = listener.stream_routes.as_slice() else {
            warn!("{log_context} Listener {}/{} needs exactly one route but has {}", listener.gateway_key(), listener.name(), listener.stream_routes.len());
            return vec![];
        };
        let [route_rule] = route.spec.rules.as_slice() else {
            warn!("{log_context} Route {} needs exactly one rule but has {}", route.key(), route.spec.rules.len());
            return vec![];
        };
        let services = match backend_services(&route_rule.backend_refs) {
            Ok(services) => services,
            Err(e) => {
                warn!("{log_context} Skipping route {} {e}", route.key());
                return vec![];
            },
        };

        let route_key = route.key();
        let source_type = if protocol == Protocol::Udp { SOURCE_TYPE_UDP_ROUTE } else { SOURCE_TYPE_TCP_ROUTE };
        let extensions = self.timeout_extensions(&listener.gateway_key(), &route_key, route_kind(protocol));
        vec![InternalRule::builder()
            .rule_id(format!("{}-{}-{}", listener.port(), route_key.namespace, route_key.name))
            .origin(RuleOrigin::Gateway)
            .source(Some(Source { name: route_key.name, namespace: route_key.namespace, source_type: source_type.to_owned() }))
            .services(services)
            .extensions(extensions)
            .build()]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::common::{matcher, ExtensionKind, TimeoutConfig};

    fn dsl(dslx: &Dslx) -> Value {
        Value::Array(matcher::to_internal_dsl(dslx).unwrap())
    }

    #[test]
    pub fn test_wildcard_host_and_prefix() {
        let route_match: RouteMatch = serde_yaml::from_str("path: {type: PathPrefix, value: /v1}").unwrap();
        let dslx = match_to_dslx(&["*.com".to_owned()], &route_match).unwrap();
        assert_eq!(dsl(&dslx), json!(["AND", ["ENDS_WITH", "HOST", "*.com"], ["STARTS_WITH", "URL", "/v1"]]));
    }

    #[test]
    pub fn test_full_match() {
        let route_match = r"
path:
  type: PathPrefix
  value: /v1
headers:
- type: Exact
  name: version
  value: '1.1'
- type: RegularExpression
  name: name
  value: w*
queryParams:
- type: Exact
  name: page
  value: '1'
- type: RegularExpression
  name: location
  value: c*
method: PUT
";
        let route_match: RouteMatch = serde_yaml::from_str(route_match).unwrap();
        let dslx = match_to_dslx(&["a.com".to_owned(), "a.b.com".to_owned()], &route_match).unwrap();
        assert_eq!(
            dsl(&dslx),
            json!([
                "AND",
                ["IN", "HOST", "a.com", "a.b.com"],
                ["EQ", "PARAM", "page", "1"],
                ["REGEX", "PARAM", "location", "c*"],
                ["STARTS_WITH", "URL", "/v1"],
                ["EQ", "HEADER", "version", "1.1"],
                ["REGEX", "HEADER", "name", "w*"],
                ["EQ", "METHOD", "PUT"]
            ])
        );

        let exact: RouteMatch = serde_yaml::from_str("path: {value: /exact}").unwrap();
        assert_eq!(dsl(&match_to_dslx(&[], &exact).unwrap()), json!([["EQ", "URL", "/exact"]]));
        assert!(serde_yaml::from_str::<RouteMatch>("path: {type: ImplementationSpecific, value: /}").is_err());
    }

    #[test]
    pub fn test_filters() {
        let rule = r"
matches:
- path:
    type: PathPrefix
    value: /api
filters:
- type: RequestHeaderModifier
  requestHeaderModifier:
    set:
    - {name: x-a, value: a}
    add:
    - {name: x-b, value: b1}
- type: RequestHeaderModifier
  requestHeaderModifier:
    add:
    - {name: x-b, value: b2}
    remove: [x-c]
- type: RequestRedirect
  requestRedirect:
    scheme: https
    statusCode: 301
    path:
      type: ReplacePrefixMatch
      replacePrefixMatch: /v2
- type: URLRewrite
  urlRewrite:
    hostname: internal.svc
";
        let rule: HttpRouteRule = serde_yaml::from_str(rule).unwrap();
        let extensions = filter_extensions(&rule, &effective_matches(&rule)[0], "test");

        let Some(Extension::RewriteRequest(request)) = extensions.get(&ExtensionKind::RewriteRequest) else {
            panic!("missing request rewrite");
        };
        assert_eq!(request.headers.get("x-a").map(String::as_str), Some("a"));
        assert_eq!(request.headers_add.get("x-b"), Some(&vec!["b1".to_owned(), "b2".to_owned()]));
        assert_eq!(request.headers_remove, vec!["x-c".to_owned()]);

        let redirect = extensions.redirect().unwrap();
        assert_eq!(redirect.code, Some(301));
        assert_eq!(redirect.scheme.as_deref(), Some("https"));
        assert_eq!(redirect.replace_prefix.as_deref(), Some("/v2"));
        assert_eq!(redirect.prefix_match.as_deref(), Some("/api"));
        assert!(redirect.url.is_none());

        assert_eq!(extensions.get(&ExtensionKind::Vhost), Some(&Extension::Vhost("internal.svc".to_owned())));
        assert!(extensions.get(&ExtensionKind::Rewrite).is_none());
    }

    #[test]
    pub fn test_rule_without_matches() {
        let rule: HttpRouteRule = serde_yaml::from_str("backendRefs: []").unwrap();
        let matches = effective_matches(&rule);
        assert_eq!(matches.len(), 1);
        assert_eq!(dsl(&match_to_dslx(&[], &matches[0]).unwrap()), json!([["STARTS_WITH", "URL", "/"]]));
        assert_eq!(match_prefix(&matches[0]).as_deref(), Some("/"));
    }

    const LISTENERS: &str = r"
- gatewayNamespace: g-ns
  gatewayName: g1
  name: http
  port: 8080
  protocol: HTTP
  httpRoutes:
  - metadata:
      name: r1
      namespace: default
      annotations:
        alb.cpaas.io/gateway-http-router-rule-priority-0-1: '4'
    spec:
      hostnames: [a.com]
      rules:
      - matches:
        - path: {type: PathPrefix, value: /a}
        - path: {type: Exact, value: /b}
        backendRefs:
        - {name: svc-a, namespace: default, port: 80, weight: 1}
      - backendRefs:
        - {name: svc-b, port: 80, weight: 1}
- gatewayNamespace: g-ns
  gatewayName: g1
  name: https
  port: 8443
  protocol: HTTPS
  hostname: secure.com
  tls:
    certificateRefs:
    - {name: tls-a, namespace: g-ns}
  httpRoutes:
  - metadata: {name: r2, namespace: default}
    spec:
      rules:
      - backendRefs:
        - {name: svc-a, namespace: default, port: 80, weight: 1}
- gatewayNamespace: g-ns
  gatewayName: g1
  name: https-broken
  port: 9443
  protocol: HTTPS
  httpRoutes:
  - metadata: {name: r3, namespace: default}
    spec:
      rules:
      - {}
- gatewayNamespace: g-ns
  gatewayName: g1
  name: tcp
  port: 5432
  protocol: TCP
  streamRoutes:
  - metadata: {name: pg, namespace: db}
    spec:
      rules:
      - backendRefs:
        - {name: postgres, namespace: db, port: 5432, weight: 1}
- gatewayNamespace: g-ns
  gatewayName: g2
  name: tcp
  port: 5432
  protocol: TCP
  streamRoutes:
  - metadata: {name: pg-2, namespace: db}
    spec:
      rules:
      - backendRefs:
        - {name: postgres, namespace: db, port: 5432, weight: 1}
- gatewayNamespace: g-ns
  gatewayName: g1
  name: passthrough
  port: 6443
  protocol: TLS
";

    #[test]
    pub fn test_gateway_frontends() {
        let listeners: Vec<AttachedListener> = serde_yaml::from_str(LISTENERS).unwrap();
        let normalizer = GatewayNormalizer::new("alb", "cpaas.io", "test");
        let frontends = normalizer.frontends(&listeners);

        let keys: Vec<_> = frontends.iter().map(|f| (f.port, f.protocol)).collect();
        assert_eq!(keys, vec![(5432, Protocol::Tcp), (8080, Protocol::Http), (8443, Protocol::Https)]);

        let tcp = &frontends[0];
        assert_eq!(tcp.name, "alb-5432-tcp");
        assert_eq!(tcp.rules.len(), 1);
        assert_eq!(tcp.rules[0].rule_id, "5432-db-pg");
        assert_eq!(tcp.rules[0].source.as_ref().unwrap().source_type, SOURCE_TYPE_TCP_ROUTE);

        let http = &frontends[1];
        let ids: Vec<_> = http.rules.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["8080-g-ns-g1-http-default-r1-0-0", "8080-g-ns-g1-http-default-r1-0-1"]);
        assert_eq!(http.rules[0].priority, 0);
        assert_eq!(http.rules[1].priority, 4);
        assert_eq!(http.rules[0].backend_protocol, BACKEND_PROTOCOL_FROM_APP_PROTOCOL);
        assert_eq!(dsl(http.rules[1].dslx.as_ref().unwrap()), json!(["AND", ["IN", "HOST", "a.com"], ["EQ", "URL", "/b"]]));
        assert!(http.rules[0].extensions.get(&ExtensionKind::Timeout).is_none());

        let https = &frontends[2];
        assert_eq!(https.rules.len(), 1);
        let rule = &https.rules[0];
        assert_eq!(rule.domain, "secure.com");
        assert_eq!(rule.certificate_name, "g-ns/tls-a");
        assert_eq!(dsl(rule.dslx.as_ref().unwrap()), json!(["AND", ["IN", "HOST", "secure.com"], ["STARTS_WITH", "URL", "/"]]));
    }

    const TIMEOUT_POLICIES: &str = r"
- apiVersion: gateway.crd.alauda.io/v1alpha1
  kind: TimeoutPolicy
  metadata: {name: gateway-default, namespace: g-ns}
  spec:
    targetRef: {group: gateway.networking.k8s.io, kind: Gateway, name: g1}
    default: {proxy_read_timeout_ms: 1000}
- apiVersion: gateway.crd.alauda.io/v1alpha1
  kind: TimeoutPolicy
  metadata: {name: route-default, namespace: default}
  spec:
    targetRef: {group: gateway.networking.k8s.io, kind: HTTPRoute, name: r1}
    default: {proxy_read_timeout_ms: 2000}
- apiVersion: gateway.crd.alauda.io/v1alpha1
  kind: TimeoutPolicy
  metadata: {name: listener-only, namespace: g-ns}
  spec:
    targetRef: {group: gateway.networking.k8s.io, kind: Gateway, name: g1, sectionName: http}
    override: {proxy_read_timeout_ms: 1}
- apiVersion: gateway.crd.alauda.io/v1alpha1
  kind: TimeoutPolicy
  metadata: {name: stream-gateway, namespace: g-ns}
  spec:
    targetRef: {group: gateway.networking.k8s.io, kind: Gateway, name: g2}
    override: {proxy_connect_timeout_ms: 5}
- apiVersion: gateway.crd.alauda.io/v1alpha1
  kind: TimeoutPolicy
  metadata: {name: stream-route, namespace: policies}
  spec:
    targetRef: {group: gateway.networking.k8s.io, kind: TCPRoute, name: pg, namespace: db}
    default: {proxy_read_timeout_ms: 9}
- apiVersion: gateway.crd.alauda.io/v1alpha1
  kind: TimeoutPolicy
  metadata: {name: wrong-kind, namespace: default}
  spec:
    targetRef: {group: gateway.networking.k8s.io, kind: GRPCRoute, name: r1}
    override: {proxy_read_timeout_ms: 7}
";

    fn timeout_of(rule: &InternalRule) -> Option<&TimeoutConfig> {
        match rule.extensions.get(&ExtensionKind::Timeout) {
            Some(Extension::Timeout(timeout)) => Some(timeout),
            _ => None,
        }
    }

    #[test]
    pub fn test_timeout_policies() {
        let listeners = r"
- gatewayNamespace: g-ns
  gatewayName: g1
  name: http
  port: 8080
  protocol: HTTP
  httpRoutes:
  - metadata: {name: r1, namespace: default}
    spec:
      rules:
      - backendRefs:
        - {name: svc-a, namespace: default, port: 80, weight: 1}
  - metadata: {name: r2, namespace: default}
    spec:
      rules:
      - matches:
        - path: {type: PathPrefix, value: /r2}
        backendRefs:
        - {name: svc-a, namespace: default, port: 80, weight: 1}
- gatewayNamespace: g-ns
  gatewayName: g2
  name: tcp
  port: 5432
  protocol: TCP
  streamRoutes:
  - metadata: {name: pg, namespace: db}
    spec:
      rules:
      - backendRefs:
        - {name: postgres, namespace: db, port: 5432, weight: 1}
";
        let listeners: Vec<AttachedListener> = serde_yaml::from_str(listeners).unwrap();
        let policies: Vec<TimeoutPolicyCr> = serde_yaml::from_str(TIMEOUT_POLICIES).unwrap();
        let frontends = GatewayNormalizer::new("alb", "cpaas.io", "test").with_timeout_policies(&policies).frontends(&listeners);

        let stream = &frontends[0];
        assert_eq!(timeout_of(&stream.rules[0]), Some(&TimeoutConfig { proxy_connect_timeout_ms: Some(5), ..Default::default() }));

        let http = &frontends[1];
        let read: Vec<_> = http.rules.iter().map(|rule| (rule.rule_id.as_str(), timeout_of(rule).and_then(|t| t.proxy_read_timeout_ms))).collect();
        assert_eq!(read, vec![("8080-g-ns-g1-http-default-r1-0-0", Some(2000)), ("8080-g-ns-g1-http-default-r2-0-0", Some(1000))]);
    }
}
