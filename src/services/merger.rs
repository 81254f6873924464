use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, warn};

use crate::common::{Frontend, FrontendKey};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MergeError {
    #[error("neither frontend resources nor gateway listeners are available")]
    NoSource,
}

/// Two frontends may share a port only when both speak http or they listen on different transports.
fn shares_port(existing: FrontendKey, candidate: FrontendKey) -> bool {
    existing.port == candidate.port
        && existing.protocol.service_protocol() == candidate.protocol.service_protocol()
        && !(existing.protocol.is_http() && candidate.protocol.is_http())
}

/// Merges the frontends of both sources into one list ordered by port and protocol. Frontends
/// sharing a key pool their rules when they speak http, otherwise the first one is kept. Any
/// other protocol owns its port, later frontends on it are dropped whatever their protocol.
pub fn merge_frontends(legacy: Option<Vec<Frontend>>, gateway: Option<Vec<Frontend>>, log_context: &str) -> Result<Vec<Frontend>, MergeError> {
    let frontends = match (legacy, gateway) {
        (None, None) => return Err(MergeError::NoSource),
        (Some(frontends), None) | (None, Some(frontends)) => frontends,
        (Some(mut legacy), Some(gateway)) => {
            legacy.extend(gateway);
            legacy
        },
    };

    let mut merged: BTreeMap<FrontendKey, Frontend> = BTreeMap::new();
    for frontend in frontends {
        let key = frontend.key();
        if let Some(existing) = merged.get_mut(&key) {
            if key.protocol.is_http() {
                debug!("{log_context} Merging {} rules of {} into {}", frontend.rules.len(), frontend.name, existing.name);
                existing.rules.extend(frontend.rules);
            } else {
                warn!("{log_context} Frontend {} is already served by {}, dropping it", frontend.name, existing.name);
            }
        } else if let Some(owner) = merged.values().find(|existing| shares_port(existing.key(), key)) {
            warn!("{log_context} Port {} of frontend {} is already owned by {} ({}), dropping it", key.port, frontend.name, owner.name, owner.protocol);
        } else {
            merged.insert(key, frontend);
        }
    }
    Ok(merged.into_values().collect())
}
