use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use typed_builder::TypedBuilder;

use crate::Result;

const DEFAULT_COMPILE_TIMEOUT_SECS: u64 = 30;

fn default_compile_timeout_secs() -> u64 {
    DEFAULT_COMPILE_TIMEOUT_SECS
}

#[derive(Debug, TypedBuilder, Deserialize)]
pub struct Configuration {
    #[builder(setter(into))]
    pub alb_name: String,
    #[builder(setter(into))]
    pub domain: String,
    #[builder(setter(into))]
    pub policy_path: PathBuf,
    #[builder(default)]
    #[serde(default)]
    pub policy_zip: bool,
    #[builder(default = DEFAULT_COMPILE_TIMEOUT_SECS)]
    #[serde(default = "default_compile_timeout_secs")]
    pub compile_timeout_secs: u64,
    #[builder(default)]
    #[serde(default)]
    pub snapshot_files: Vec<PathBuf>,
    #[builder(default, setter(strip_option, into))]
    #[serde(default)]
    pub cluster_namespace: Option<String>,
}

#[derive(Error, Debug)]
enum ConfigurationError {
    #[error("alb name must be not empty")]
    AlbName,
    #[error("domain must be not empty")]
    Domain,
    #[error("policy path must be not empty")]
    PolicyPath,
    #[error("compile timeout must be positive")]
    CompileTimeout,
    #[error("exactly one of snapshot files or cluster namespace must be configured")]
    SnapshotSource,
}

impl Configuration {
    pub fn validate(&self) -> Result<()> {
        if self.alb_name.is_empty() {
            return Err(ConfigurationError::AlbName.into());
        }
        if self.domain.is_empty() {
            return Err(ConfigurationError::Domain.into());
        }
        if self.policy_path.as_os_str().is_empty() {
            return Err(ConfigurationError::PolicyPath.into());
        }
        if self.compile_timeout_secs == 0 {
            return Err(ConfigurationError::CompileTimeout.into());
        }
        match (self.snapshot_files.is_empty(), &self.cluster_namespace) {
            (false, None) | (true, Some(_)) => Ok(()),
            _ => Err(ConfigurationError::SnapshotSource.into()),
        }
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    pub fn log_context(&self) -> String {
        format!("[{}]", self.alb_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn test_configuration() {
        let configuration = r"
alb_name: alb-dev
domain: cpaas.io
policy_path: /etc/alb2/nginx/policy.new
snapshot_files:
- snapshot.yaml
";
        let configuration: Configuration = serde_yaml::from_str(configuration).unwrap();
        assert!(configuration.validate().is_ok());
        assert!(!configuration.policy_zip);
        assert_eq!(configuration.compile_timeout(), Duration::from_secs(DEFAULT_COMPILE_TIMEOUT_SECS));
    }

    #[test]
    pub fn test_invalid_configuration() {
        let both = Configuration::builder()
            .alb_name("alb")
            .domain("cpaas.io")
            .policy_path("policy.new")
            .snapshot_files(vec![PathBuf::from("snapshot.yaml")])
            .cluster_namespace("cpaas-system")
            .build();
        assert!(both.validate().is_err());

        let neither = Configuration::builder().alb_name("alb").domain("cpaas.io").policy_path("policy.new").build();
        assert!(neither.validate().is_err());

        let unnamed = Configuration::builder().alb_name("").domain("cpaas.io").policy_path("policy.new").cluster_namespace("cpaas-system").build();
        assert_eq!(unnamed.validate().unwrap_err().to_string(), "alb name must be not empty");
    }
}
