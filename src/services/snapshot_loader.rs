use std::path::PathBuf;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Secret, Service};
use kube::{api::ListParams, Api, Client};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::{
    crds::{alb_name_label, AlbCr, FrontendCr, RuleCr, TimeoutPolicyCr},
    state::Snapshot,
};

#[async_trait]
pub trait SnapshotLoader: Send + Sync {
    async fn load(&self) -> crate::Result<Snapshot>;
}

/// Reads snapshots from YAML files. Later files add to earlier ones.
#[derive(TypedBuilder)]
pub struct FileSnapshotLoader {
    files: Vec<PathBuf>,
}

#[async_trait]
impl SnapshotLoader for FileSnapshotLoader {
    async fn load(&self) -> crate::Result<Snapshot> {
        let mut snapshot = Snapshot::default();
        for file in &self.files {
            debug!("Loading snapshot {}", file.display());
            let content = tokio::fs::read_to_string(file).await?;
            snapshot.extend(serde_yaml::from_str(&content)?);
        }
        Ok(snapshot)
    }
}

/// Lists the load balancer resources from the cluster. The load balancer itself, its frontend and
/// rule resources and the timeout policies are read, gateway listeners are attached by the
/// gateway controller.
#[derive(TypedBuilder)]
pub struct ClusterSnapshotLoader {
    client: Client,
    #[builder(setter(into))]
    namespace: String,
    #[builder(setter(into))]
    alb_name: String,
    #[builder(setter(into))]
    domain: String,
}

#[async_trait]
impl SnapshotLoader for ClusterSnapshotLoader {
    async fn load(&self) -> crate::Result<Snapshot> {
        let selector = format!("{}={}", alb_name_label(&self.domain), self.alb_name);
        let owned = ListParams::default().labels(&selector);
        let everything = ListParams::default();

        let frontends: Api<FrontendCr> = Api::namespaced(self.client.clone(), &self.namespace);
        let rules: Api<RuleCr> = Api::namespaced(self.client.clone(), &self.namespace);
        let services: Api<Service> = Api::all(self.client.clone());
        let endpoints: Api<Endpoints> = Api::all(self.client.clone());
        let secrets: Api<Secret> = Api::all(self.client.clone());
        let albs: Api<AlbCr> = Api::namespaced(self.client.clone(), &self.namespace);
        let timeout_policies: Api<TimeoutPolicyCr> = Api::all(self.client.clone());

        let (alb, frontends, rules, services, endpoints, secrets, timeout_policies) = futures::try_join!(
            albs.get_opt(&self.alb_name),
            frontends.list(&owned),
            rules.list(&owned),
            services.list(&everything),
            endpoints.list(&everything),
            secrets.list(&everything),
            timeout_policies.list(&everything)
        )?;
        if alb.is_none() {
            warn!("Load balancer {}/{} not found, frontends inherit no configuration", self.namespace, self.alb_name);
        }
        info!(
            "Loaded {} frontends and {} rules of {} from {}",
            frontends.items.len(),
            rules.items.len(),
            self.alb_name,
            self.namespace
        );

        Ok(Snapshot {
            frontends: Some(frontends.items),
            rules: rules.items,
            listeners: None,
            services: services.items,
            endpoints: endpoints.items,
            secrets: secrets.items,
            timeout_policies: timeout_policies.items,
            alb,
        })
    }
}
