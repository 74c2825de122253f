// Copyright (c) 2025 - Cowboy AI, Inc.
//! Plane routing

use async_trait::async_trait;
use std::sync::Arc;

use super::{
    OperationStatus, OperationToken, ProviderError, RemoteHandle, RemoteState, ResourceProvider,
};
use crate::domain::{MaterializedSpec, Plane, ResourceKey, ResourceKind};

/// Dispatches each call to the provider serving the resource kind's plane
#[derive(Clone)]
pub struct RoutingProvider {
    cloud: Arc<dyn ResourceProvider>,
    workload: Arc<dyn ResourceProvider>,
}

impl RoutingProvider {
    pub fn new(cloud: Arc<dyn ResourceProvider>, workload: Arc<dyn ResourceProvider>) -> Self {
        Self { cloud, workload }
    }

    fn route(&self, kind: ResourceKind) -> &dyn ResourceProvider {
        match kind.plane() {
            Plane::Cloud => self.cloud.as_ref(),
            Plane::Workload => self.workload.as_ref(),
        }
    }
}

impl std::fmt::Debug for RoutingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingProvider")
            .field("cloud", &self.cloud.name())
            .field("workload", &self.workload.name())
            .finish()
    }
}

#[async_trait]
impl ResourceProvider for RoutingProvider {
    fn name(&self) -> &str {
        "routing"
    }

    async fn create(
        &self,
        key: &ResourceKey,
        spec: &MaterializedSpec,
    ) -> Result<(RemoteHandle, OperationToken), ProviderError> {
        self.route(key.kind()).create(key, spec).await
    }

    async fn poll(&self, token: &OperationToken) -> Result<OperationStatus, ProviderError> {
        self.route(token.kind).poll(token).await
    }

    async fn update(
        &self,
        handle: &RemoteHandle,
        spec: &MaterializedSpec,
    ) -> Result<OperationToken, ProviderError> {
        self.route(handle.kind).update(handle, spec).await
    }

    async fn delete(&self, handle: &RemoteHandle) -> Result<OperationToken, ProviderError> {
        self.route(handle.kind).delete(handle).await
    }

    async fn read(&self, handle: &RemoteHandle) -> Result<RemoteState, ProviderError> {
        self.route(handle.kind).read(handle).await
    }

    async fn lookup(
        &self,
        key: &ResourceKey,
        spec: &MaterializedSpec,
    ) -> Result<RemoteState, ProviderError> {
        self.route(key.kind()).lookup(key, spec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SimulatedProvider;
    use serde_json::json;

    #[tokio::test]
    async fn test_calls_reach_the_plane_provider() {
        let cloud = Arc::new(SimulatedProvider::new("cloud"));
        let workload = Arc::new(SimulatedProvider::new("orchestrator"));
        let routing = RoutingProvider::new(cloud.clone(), workload.clone());

        let vpc = ResourceKey::parse_name(ResourceKind::Network, "vpc").unwrap();
        let ns = ResourceKey::parse_name(ResourceKind::Namespace, "app").unwrap();
        routing
            .create(
                &vpc,
                &MaterializedSpec::from_values(
                    ResourceKind::Network,
                    [("auto_create_subnetworks".to_string(), json!(false))].into(),
                ),
            )
            .await
            .unwrap();
        routing
            .create(
                &ns,
                &MaterializedSpec::from_values(
                    ResourceKind::Namespace,
                    [("cluster_access".to_string(), json!({"endpoint": "34.1.1.1"}))].into(),
                ),
            )
            .await
            .unwrap();

        assert_eq!(cloud.calls_for(&vpc).await.len(), 1);
        assert!(cloud.calls_for(&ns).await.is_empty());
        assert_eq!(workload.calls_for(&ns).await.len(), 1);
    }

    #[tokio::test]
    async fn test_lookups_reach_the_cloud_provider() {
        let cloud = Arc::new(SimulatedProvider::new("cloud"));
        let workload = Arc::new(SimulatedProvider::new("orchestrator"));
        let routing = RoutingProvider::new(cloud.clone(), workload.clone());

        let versions = ResourceKey::parse_name(ResourceKind::EngineVersions, "versions").unwrap();
        let state = routing
            .lookup(
                &versions,
                &MaterializedSpec::from_values(
                    ResourceKind::EngineVersions,
                    [
                        ("location".to_string(), json!("europe-west1")),
                        ("release_channel".to_string(), json!("REGULAR")),
                    ]
                    .into(),
                ),
            )
            .await
            .unwrap();

        assert!(state.attributes.contains_key("latest_version"));
        assert_eq!(cloud.calls_for(&versions).await.len(), 1);
        assert!(workload.calls().await.is_empty());
    }
}
