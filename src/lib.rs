use std::{sync::Arc, time::Duration};

use kube::Client;
use thiserror::Error;
use tokio::time::{timeout, Instant};
use tracing::{info, warn};

pub mod backends;
pub mod common;
pub mod configuration;
pub mod crds;
mod normalizer;
pub mod services;
pub mod state;

use backends::nginx::persist;
use common::{
    matcher::{DefaultSpecificity, Specificity},
    NgxPolicy,
};
use configuration::Configuration;
use services::{ClusterSnapshotLoader, CompileReport, FileSnapshotLoader, PolicyCompiler, SnapshotLoader};
use state::Snapshot;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
enum CompileError {
    #[error("compile pass did not finish within {0:?}")]
    Timeout(Duration),
}

static DEFAULT_SPECIFICITY: DefaultSpecificity = DefaultSpecificity;

/// Compiles on the blocking pool so a slow pass cannot stall the runtime and the deadline is
/// observed while it runs. A pass that misses the deadline is abandoned, its result is dropped.
async fn compile_with_deadline(
    snapshot: Snapshot,
    alb_name: String,
    domain: String,
    specificity: &'static dyn Specificity,
    limit: Duration,
) -> Result<(NgxPolicy, CompileReport)> {
    let handle = tokio::task::spawn_blocking(move || PolicyCompiler::new(&alb_name, &domain).with_specificity(specificity).compile(&snapshot));
    let compiled = timeout(limit, handle).await.map_err(|_| CompileError::Timeout(limit))??;
    Ok(compiled?)
}

async fn snapshot_loader(configuration: &Configuration) -> Result<Arc<dyn SnapshotLoader>> {
    if let Some(namespace) = &configuration.cluster_namespace {
        let client = Client::try_default().await?;
        return Ok(Arc::new(
            ClusterSnapshotLoader::builder()
                .client(client)
                .namespace(namespace.clone())
                .alb_name(configuration.alb_name.clone())
                .domain(configuration.domain.clone())
                .build(),
        ));
    }
    Ok(Arc::new(FileSnapshotLoader::builder().files(configuration.snapshot_files.clone()).build()))
}

/// Runs one compile pass: load the snapshot, compile it and persist the result. A pass that
/// exceeds the configured timeout fails without touching the policy file.
pub async fn start(configuration: Configuration) -> Result<()> {
    let log_context = configuration.log_context();
    info!("{log_context} Policy compiler started");
    let loader = snapshot_loader(&configuration).await?;

    let compile_timeout = configuration.compile_timeout();
    let started = Instant::now();
    let snapshot = timeout(compile_timeout, loader.load()).await.map_err(|_| CompileError::Timeout(compile_timeout))??;
    let remaining = compile_timeout.saturating_sub(started.elapsed());
    let compiled = compile_with_deadline(snapshot, configuration.alb_name.clone(), configuration.domain.clone(), &DEFAULT_SPECIFICITY, remaining).await;
    let (policy, report) = compiled.inspect_err(|e| warn!("{log_context} Compile pass failed {e}"))?;

    let written = persist(&policy, &configuration.policy_path, configuration.policy_zip)?;
    info!("{log_context} Policy written to {} after {:?}", written.display(), report.total());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::common::matcher::DslxTerm;

    struct SlowSpecificity;

    impl Specificity for SlowSpecificity {
        fn score(&self, dslx: &[DslxTerm]) -> i32 {
            std::thread::sleep(Duration::from_millis(300));
            DEFAULT_SPECIFICITY.score(dslx)
        }
    }

    static SLOW_SPECIFICITY: SlowSpecificity = SlowSpecificity;

    const SNAPSHOT_WITH_RULE: &str = r"
frontends:
- metadata: {name: alb-00080, namespace: cpaas-system}
  spec:
    port: 80
    protocol: http
rules:
- metadata:
    name: alb-00080-a
    namespace: cpaas-system
    labels: {alb2.cpaas.io/frontend: alb-00080}
  spec:
    dslx:
    - type: URL
      values: [[STARTS_WITH, /a]]
";

    #[tokio::test]
    pub async fn test_start_with_snapshot_files() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("snapshot.yaml");
        fs::write(
            &snapshot,
            r"
frontends:
- metadata: {name: alb-00080, namespace: cpaas-system}
  spec:
    port: 80
    protocol: http
",
        )
        .unwrap();
        let policy_path = dir.path().join("policy.new");
        let configuration = Configuration::builder().alb_name("alb").domain("cpaas.io").policy_path(policy_path.clone()).snapshot_files(vec![snapshot]).build();
        configuration.validate().unwrap();

        start(configuration).await.unwrap();
        let written: serde_json::Value = serde_json::from_slice(&fs::read(policy_path).unwrap()).unwrap();
        assert!(written["backend_group"].as_array().unwrap().is_empty());
        assert!(written["certificate_map"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    pub async fn test_start_without_sources() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("snapshot.yaml");
        fs::write(&snapshot, "services: []\n").unwrap();
        let policy_path = dir.path().join("policy.new");
        let configuration = Configuration::builder().alb_name("alb").domain("cpaas.io").policy_path(policy_path.clone()).snapshot_files(vec![snapshot]).build();

        assert!(start(configuration).await.is_err());
        assert!(!policy_path.exists());
    }

    #[tokio::test]
    pub async fn test_slow_compile_misses_deadline() {
        let snapshot: Snapshot = serde_yaml::from_str(SNAPSHOT_WITH_RULE).unwrap();
        let started = Instant::now();
        let result = compile_with_deadline(snapshot, "alb".to_owned(), "cpaas.io".to_owned(), &SLOW_SPECIFICITY, Duration::from_millis(20)).await;
        let error = result.err().unwrap();
        assert!(matches!(error.downcast_ref::<CompileError>(), Some(CompileError::Timeout(limit)) if *limit == Duration::from_millis(20)));
        assert!(started.elapsed() < Duration::from_millis(300));

        let snapshot: Snapshot = serde_yaml::from_str(SNAPSHOT_WITH_RULE).unwrap();
        let (policy, _) = compile_with_deadline(snapshot, "alb".to_owned(), "cpaas.io".to_owned(), &DEFAULT_SPECIFICITY, Duration::from_secs(10)).await.unwrap();
        assert_eq!(policy.http_policies(80).len(), 1);
    }
}
