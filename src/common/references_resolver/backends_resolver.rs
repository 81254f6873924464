use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, warn};

use crate::common::{Backend, BackendGroup, BackendMode, BackendService, Endpoint, LoadBalancer, Protocol, BACKEND_PROTOCOL_FROM_APP_PROTOCOL};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("service {0} not found")]
    ServiceNotFound(String),
    #[error("service {service} has no {protocol} port {port}")]
    PortNotFound { service: String, protocol: String, port: i32 },
    #[error("endpoints of {service} have no port named {port_name}")]
    TargetPortNotFound { service: String, port_name: String },
    #[error("unsupported backend kind {0}")]
    UnsupportedBackendKind(String),
    #[error("backend reference {reference} has no {field}")]
    MissingField { reference: String, field: &'static str },
}

/// Source of the live endpoints behind a service port.
pub trait ServiceLookup {
    fn endpoints(&self, service: &BackendService, protocol: Protocol) -> Result<Vec<Endpoint>, ReferenceError>;
}

/// Remembers the endpoints of every service key looked up during one compile pass.
pub struct EndpointCache<'a> {
    lookup: &'a dyn ServiceLookup,
    entries: BTreeMap<String, Vec<Endpoint>>,
    log_context: &'a str,
}

impl<'a> EndpointCache<'a> {
    pub fn new(lookup: &'a dyn ServiceLookup, log_context: &'a str) -> Self {
        Self { lookup, entries: BTreeMap::new(), log_context }
    }

    pub fn endpoints(&mut self, service: &BackendService, protocol: Protocol) -> &[Endpoint] {
        let lookup = self.lookup;
        let log_context = self.log_context;
        self.entries.entry(service.service_key(protocol)).or_insert_with_key(|key| match lookup.endpoints(service, protocol) {
            Ok(endpoints) => endpoints,
            Err(e) => {
                warn!("{log_context} Can't resolve service {key} {e}");
                vec![]
            },
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn endpoint_weight(weight: i64, total: i64, endpoints: i64) -> i32 {
    // floor(w * 100 / (total * n) + 0.5) in integer arithmetic
    let rounded = (2 * weight * 100 + total * endpoints) / (2 * total * endpoints);
    let rounded = i32::try_from(rounded).unwrap_or(i32::MAX);
    if rounded == 0 && weight != 0 {
        1
    } else {
        rounded
    }
}

/// Spreads the weight of every service over its endpoints and returns the backends ordered by
/// `address-port-weight`.
pub fn resolve_backends(services: &[BackendService], protocol: Protocol, cache: &mut EndpointCache) -> Vec<Backend> {
    let log_context = cache.log_context;
    let weights: Vec<i64> = services.iter().map(|s| i64::from(s.weight.clamp(0, 100))).collect();
    let total = match weights.iter().sum::<i64>() {
        0 => 100,
        total => total,
    };

    let mut backends = vec![];
    for (service, weight) in services.iter().zip(weights) {
        let endpoints = cache.endpoints(service, protocol);
        if endpoints.is_empty() {
            debug!("{log_context} Service {}/{} has no endpoints", service.namespace, service.name);
            continue;
        }
        let count = i64::try_from(endpoints.len()).unwrap_or(i64::MAX);
        let weight = endpoint_weight(weight, total, count);
        for endpoint in endpoints {
            if endpoint.port == 0 {
                warn!("{log_context} Endpoint {} of {}/{} has no port", endpoint.address, service.namespace, service.name);
                continue;
            }
            backends.push(Backend {
                address: endpoint.address.clone(),
                from_other_clusters: endpoint.from_other_clusters,
                port: endpoint.port,
                svc: service.name.clone(),
                ns: service.namespace.clone(),
                weight,
                protocol: endpoint.protocol.clone(),
                app_protocol: endpoint.app_protocol.clone(),
            });
        }
    }
    backends.sort_by_cached_key(ToString::to_string);
    backends
}

/// `$http_backend_protocol` becomes https as soon as one backend speaks https.
pub fn resolve_backend_protocol(backend_protocol: &str, backends: &[Backend]) -> String {
    if !backend_protocol.eq_ignore_ascii_case(BACKEND_PROTOCOL_FROM_APP_PROTOCOL) {
        return backend_protocol.to_owned();
    }
    if backends.iter().any(Backend::is_https) {
        "https".to_owned()
    } else {
        "http".to_owned()
    }
}

/// Resolves the backend group of every rule and the default group of every active frontend.
/// Returns the number of distinct services looked up.
pub fn fill_backends(load_balancer: &mut LoadBalancer, lookup: &dyn ServiceLookup, log_context: &str) -> usize {
    let mut cache = EndpointCache::new(lookup, log_context);
    for frontend in load_balancer.frontends.iter_mut().filter(|f| !f.conflict) {
        let protocol = frontend.protocol;
        let mode = BackendMode::from(protocol);

        if !frontend.services.is_empty() || frontend.backend_group.is_some() {
            let name = frontend.default_group_name();
            let backends = resolve_backends(&frontend.services, protocol, &mut cache);
            frontend.backend_protocol = resolve_backend_protocol(&frontend.backend_protocol, &backends);
            let group = frontend.backend_group.get_or_insert_with(BackendGroup::default);
            group.name = name;
            group.mode = mode;
            group.backends = backends;
        }

        for rule in &mut frontend.rules {
            let backends = if rule.allow_no_address() { vec![] } else { resolve_backends(&rule.services, protocol, &mut cache) };
            rule.backend_protocol = resolve_backend_protocol(&rule.backend_protocol, &backends);
            rule.backend_group = BackendGroup {
                name: rule.rule_id.clone(),
                session_affinity_policy: rule.session_affinity_policy.clone(),
                session_affinity_attribute: rule.session_affinity_attribute.clone(),
                mode,
                backends,
            };
        }
    }
    debug!("{log_context} Resolved {} services", cache.len());
    cache.len()
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::common::{Frontend, InternalRule, RuleOrigin};

    #[derive(Default)]
    struct FakeServices {
        services: BTreeMap<String, Vec<Endpoint>>,
        calls: Cell<usize>,
    }

    impl FakeServices {
        fn with(mut self, namespace: &str, name: &str, protocol: Protocol, port: i32, addresses: &[(&str, i32)]) -> Self {
            let endpoints = addresses
                .iter()
                .map(|(address, port)| Endpoint {
                    address: (*address).to_owned(),
                    port: *port,
                    protocol: protocol.service_protocol().to_owned(),
                    app_protocol: None,
                    from_other_clusters: false,
                })
                .collect();
            self.services.insert(crate::common::create_service_key(namespace, name, protocol.service_protocol(), port), endpoints);
            self
        }
    }

    impl ServiceLookup for FakeServices {
        fn endpoints(&self, service: &BackendService, protocol: Protocol) -> Result<Vec<Endpoint>, ReferenceError> {
            self.calls.set(self.calls.get() + 1);
            self.services.get(&service.service_key(protocol)).cloned().ok_or_else(|| ReferenceError::ServiceNotFound(service.name.clone()))
        }
    }

    fn service(name: &str, weight: i32) -> BackendService {
        BackendService { namespace: "default".to_owned(), name: name.to_owned(), port: 80, weight }
    }

    #[test]
    pub fn test_weights_are_spread_over_endpoints() {
        let lookup = FakeServices::default()
            .with("default", "a", Protocol::Http, 80, &[("10.0.0.2", 8080), ("10.0.0.1", 8080)])
            .with("default", "b", Protocol::Http, 80, &[("10.0.0.3", 8080)]);
        let mut cache = EndpointCache::new(&lookup, "test");

        let backends = resolve_backends(&[service("a", 50), service("b", 50)], Protocol::Http, &mut cache);
        let weights: Vec<_> = backends.iter().map(ToString::to_string).collect();
        assert_eq!(weights, vec!["10.0.0.1-8080-25", "10.0.0.2-8080-25", "10.0.0.3-8080-50"]);
        assert_eq!(backends.iter().map(|b| b.weight).sum::<i32>(), 100);
        assert_eq!(backends[2].svc, "b");
        assert_eq!(backends[2].ns, "default");
    }

    #[test]
    pub fn test_equal_weights_over_uneven_endpoints() {
        let lookup = FakeServices::default()
            .with("default", "a", Protocol::Http, 80, &[("10.0.1.1", 80)])
            .with("default", "b", Protocol::Http, 80, &[("10.0.2.1", 80), ("10.0.2.2", 80)])
            .with("default", "c", Protocol::Http, 80, &[("10.0.3.1", 80), ("10.0.3.2", 80), ("10.0.3.3", 80)]);
        let mut cache = EndpointCache::new(&lookup, "test");

        let backends = resolve_backends(&[service("a", 1), service("b", 1), service("c", 1)], Protocol::Http, &mut cache);
        let weights: Vec<_> = backends.iter().map(|b| (b.svc.as_str(), b.weight)).collect();
        assert_eq!(weights, vec![("a", 33), ("b", 17), ("b", 17), ("c", 11), ("c", 11), ("c", 11)]);
        assert_eq!(endpoint_weight(1, 3, 1), 33);
        assert_eq!(endpoint_weight(1, 3, 2), 17);
        assert_eq!(endpoint_weight(1, 3, 3), 11);
    }

    #[test]
    pub fn test_weights_are_clamped_and_never_vanish() {
        let addresses: Vec<(String, i32)> = (0..300).map(|i| (format!("10.1.{}.{}", i / 256, i % 256), 80)).collect();
        let addresses: Vec<(&str, i32)> = addresses.iter().map(|(a, p)| (a.as_str(), *p)).collect();
        let lookup = FakeServices::default().with("default", "wide", Protocol::Tcp, 80, &addresses).with("default", "narrow", Protocol::Tcp, 80, &[("10.0.0.1", 80)]);
        let mut cache = EndpointCache::new(&lookup, "test");

        let backends = resolve_backends(&[service("wide", 1), service("narrow", 250)], Protocol::Tcp, &mut cache);
        let narrow = backends.iter().find(|b| b.svc == "narrow").unwrap();
        assert_eq!(narrow.weight, 99);
        assert!(backends.iter().filter(|b| b.svc == "wide").all(|b| b.weight == 1));
    }

    #[test]
    pub fn test_all_zero_weights_stay_zero() {
        let lookup = FakeServices::default().with("default", "a", Protocol::Http, 80, &[("10.0.0.1", 80), ("10.0.0.2", 80)]);
        let mut cache = EndpointCache::new(&lookup, "test");
        let backends = resolve_backends(&[service("a", 0)], Protocol::Http, &mut cache);
        assert_eq!(backends.len(), 2);
        assert!(backends.iter().all(|b| b.weight == 0));
    }

    #[test]
    pub fn test_missing_services_and_zero_ports_are_skipped() {
        let lookup = FakeServices::default().with("default", "a", Protocol::Http, 80, &[("10.0.0.1", 0), ("10.0.0.2", 80)]);
        let mut cache = EndpointCache::new(&lookup, "test");
        let backends = resolve_backends(&[service("a", 50), service("missing", 50)], Protocol::Http, &mut cache);
        assert_eq!(backends.len(), 1);
        assert_eq!(backends[0].address, "10.0.0.2");
        assert_eq!(backends[0].weight, 25);
    }

    #[test]
    pub fn test_services_are_looked_up_once() {
        let lookup = FakeServices::default().with("default", "a", Protocol::Http, 80, &[("10.0.0.1", 80)]);
        let rule = |id: &str| InternalRule::builder().rule_id(id).origin(RuleOrigin::RuleCr).services(vec![service("a", 100)]).build();
        let frontend = Frontend::builder().name("alb-80").alb_name("alb").port(80).protocol(Protocol::Http).rules(vec![rule("r1"), rule("r2"), rule("r3")]).build();
        let mut load_balancer = LoadBalancer::new("alb", vec![frontend]);

        let resolved = fill_backends(&mut load_balancer, &lookup, "test");
        assert_eq!(resolved, 1);
        assert_eq!(lookup.calls.get(), 1);
        let groups: Vec<_> = load_balancer.frontends[0].rules.iter().map(|r| (r.backend_group.name.as_str(), r.backend_group.backends.len())).collect();
        assert_eq!(groups, vec![("r1", 1), ("r2", 1), ("r3", 1)]);
    }

    #[test]
    pub fn test_backend_protocol_follows_app_protocol() {
        let mut backend = Backend {
            address: "10.0.0.1".to_owned(),
            from_other_clusters: false,
            port: 443,
            svc: "a".to_owned(),
            ns: "default".to_owned(),
            weight: 100,
            protocol: "TCP".to_owned(),
            app_protocol: None,
        };
        assert_eq!(resolve_backend_protocol(BACKEND_PROTOCOL_FROM_APP_PROTOCOL, &[backend.clone()]), "http");
        backend.app_protocol = Some("HTTPS".to_owned());
        assert_eq!(resolve_backend_protocol(BACKEND_PROTOCOL_FROM_APP_PROTOCOL, &[backend.clone()]), "https");
        assert_eq!(resolve_backend_protocol("grpc", &[backend]), "grpc");
    }
}
