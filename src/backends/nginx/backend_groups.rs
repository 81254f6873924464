use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::common::{BackendGroup, LoadBalancer};

/// Collects the distinct backend groups referenced by the active frontends.
pub struct BackendGroupCatalogue<'a> {
    log_context: &'a str,
    registry: BTreeMap<String, usize>,
    groups: Vec<BackendGroup>,
}

impl<'a> BackendGroupCatalogue<'a> {
    pub fn new(log_context: &'a str) -> Self {
        Self { log_context, registry: BTreeMap::new(), groups: vec![] }
    }

    pub fn add(&mut self, group: &BackendGroup) {
        let log_context = self.log_context;
        if !group.has_backends() {
            return;
        }
        match self.registry.get(&group.name) {
            Some(index) => {
                if !self.groups[*index].same_as(group) {
                    warn!("{log_context} Backend group {} is defined twice with different backends, keeping the first one", group.name);
                }
            },
            None => {
                self.registry.insert(group.name.clone(), self.groups.len());
                self.groups.push(group.clone());
            },
        }
    }

    /// Groups ordered by name, descending.
    pub fn into_groups(self) -> Vec<BackendGroup> {
        let mut groups = self.groups;
        groups.sort_by(|this, other| other.name.cmp(&this.name));
        groups
    }
}

pub fn backend_groups(load_balancer: &LoadBalancer, log_context: &str) -> Vec<BackendGroup> {
    let mut catalogue = BackendGroupCatalogue::new(log_context);
    for frontend in load_balancer.active_frontends() {
        for rule in &frontend.rules {
            catalogue.add(&rule.backend_group);
        }
        if let Some(group) = &frontend.backend_group {
            catalogue.add(group);
        }
    }
    let groups = catalogue.into_groups();
    debug!("{log_context} Collected {} backend groups", groups.len());
    groups
}
