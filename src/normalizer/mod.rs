mod gateway;
mod legacy;

pub use gateway::GatewayNormalizer;
pub use legacy::{load_balancer_extensions, LegacyNormalizer};
use thiserror::Error;

use crate::common::{matcher::MatchError, references_resolver::ReferenceError, ListenerCertificateError};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NormalizeError {
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error(transparent)]
    Certificate(#[from] ListenerCertificateError),
    #[error("{0}")]
    Unsupported(String),
}
