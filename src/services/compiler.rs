use std::time::{Duration, Instant};

use itertools::Itertools;
use tracing::{debug, info, warn};

use super::merger::{merge_frontends, MergeError};
use crate::{
    backends::nginx::{backend_groups, PolicyGenerator},
    common::{
        matcher::{DefaultSpecificity, Specificity},
        references_resolver::{fill_backends, CertificateResolver},
        LoadBalancer, NgxPolicy,
    },
    normalizer::{load_balancer_extensions, GatewayNormalizer, LegacyNormalizer},
    state::Snapshot,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseTiming {
    pub phase: &'static str,
    pub elapsed: Duration,
}

/// How long each phase of one compile pass took.
#[derive(Clone, Debug, Default)]
pub struct CompileReport {
    pub phases: Vec<PhaseTiming>,
}

impl CompileReport {
    fn record(&mut self, phase: &'static str, started: Instant) -> Instant {
        let now = Instant::now();
        self.phases.push(PhaseTiming { phase, elapsed: now.duration_since(started) });
        now
    }

    pub fn total(&self) -> Duration {
        self.phases.iter().map(|timing| timing.elapsed).sum()
    }
}

static DEFAULT_SPECIFICITY: DefaultSpecificity = DefaultSpecificity;

pub struct PolicyCompiler<'a> {
    alb_name: &'a str,
    domain: &'a str,
    specificity: &'a dyn Specificity,
}

impl<'a> PolicyCompiler<'a> {
    pub fn new(alb_name: &'a str, domain: &'a str) -> Self {
        Self { alb_name, domain, specificity: &DEFAULT_SPECIFICITY }
    }

    pub fn with_specificity(mut self, specificity: &'a dyn Specificity) -> Self {
        self.specificity = specificity;
        self
    }

    /// Compiles one snapshot into the data plane document. Only a snapshot without any frontend
    /// source fails, everything else degrades by dropping the offending rule or reference.
    pub fn compile(&self, snapshot: &Snapshot) -> Result<(NgxPolicy, CompileReport), MergeError> {
        let log_context = format!("[{}]", self.alb_name);
        let log_context = log_context.as_str();
        let mut report = CompileReport::default();
        let started = Instant::now();

        let legacy = snapshot.frontends.as_ref().map(|frontends| LegacyNormalizer::new(self.alb_name, self.domain, log_context).frontends(frontends, &snapshot.rules));
        let gateway = snapshot.listeners.as_ref().map(|listeners| {
            GatewayNormalizer::new(self.alb_name, self.domain, log_context).with_timeout_policies(&snapshot.timeout_policies).frontends(listeners)
        });
        let phase = report.record("normalize", started);

        let mut load_balancer = LoadBalancer::new(self.alb_name, merge_frontends(legacy, gateway, log_context)?);
        if let Some(alb) = &snapshot.alb {
            let inherited = load_balancer_extensions(alb);
            for frontend in &mut load_balancer.frontends {
                frontend.extensions.merge(&inherited);
            }
        }
        let phase = report.record("merge", phase);

        fill_backends(&mut load_balancer, snapshot, log_context);
        let phase = report.record("backends", phase);

        let mut certificates = CertificateResolver::new(snapshot, log_context);
        let certificate_map = certificates.resolve(&load_balancer);
        let phase = report.record("certificates", phase);

        let mut policy = PolicyGenerator::new(&load_balancer, self.specificity, log_context).generate();
        policy.certificate_map = certificate_map;
        let phase = report.record("policies", phase);

        policy.backend_group = backend_groups(&load_balancer, log_context);
        report.record("backend groups", phase);

        for frontend in load_balancer.active_frontends() {
            if frontend.rules.is_empty() && frontend.backend_group.is_some() && frontend.default_backend_group().is_none() {
                warn!("{log_context} Frontend {} has no rules and its default backend group resolved to nothing", frontend.name);
            }
        }
        debug!("{log_context} Phases {}", report.phases.iter().map(|timing| format!("{}={:?}", timing.phase, timing.elapsed)).join(" "));
        info!(
            "{log_context} Compiled {} frontends, {} backend groups and {} certificates in {:?}",
            load_balancer.frontends.len(),
            policy.backend_group.len(),
            policy.certificate_map.len(),
            report.total()
        );
        Ok((policy, report))
    }
}
