// Copyright (c) 2025 - Cowboy AI, Inc.
//! Remote operation of one node
//!
//! Runs inside a spawned task holding a concurrency permit. The task issues
//! one request, polls its long-running operation to completion and hands the
//! outcome back to the coordinator. It never touches the node-state table.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, info, warn};

use crate::domain::{MaterializedSpec, ResourceKey};
use crate::provider::{
    await_operation, with_retry, PollConfig, ProviderError, RemoteHandle, ResourceProvider,
    RetryConfig,
};

/// Remote work for one node
#[derive(Debug, Clone)]
pub(crate) enum NodeOperation {
    Create { spec: MaterializedSpec },
    Update { handle: RemoteHandle, spec: MaterializedSpec },
    Delete { handle: RemoteHandle },
    /// Read-only query; no remote state changes
    Lookup { spec: MaterializedSpec },
}

impl NodeOperation {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Lookup { .. } => "lookup",
        }
    }
}

/// Settled remote operation
#[derive(Debug, Clone)]
pub(crate) struct Completed {
    pub handle: RemoteHandle,
    pub attributes: BTreeMap<String, Value>,
}

pub(crate) struct OperationTask {
    pub provider: Arc<dyn ResourceProvider>,
    pub key: ResourceKey,
    pub operation: NodeOperation,
    pub poll: PollConfig,
    pub retry: RetryConfig,
}

impl OperationTask {
    /// Carry out the operation, releasing `permit` when it settles
    pub(crate) async fn run(
        self,
        permit: OwnedSemaphorePermit,
    ) -> (ResourceKey, Result<Completed, ProviderError>) {
        let result = self.execute().await;
        drop(permit);
        (self.key, result)
    }

    async fn execute(&self) -> Result<Completed, ProviderError> {
        let provider = self.provider.as_ref();
        let key = &self.key;

        match &self.operation {
            NodeOperation::Create { spec } => {
                debug!(resource = %key, fields = ?spec.redacted(), "Requesting create");
                let (handle, token) =
                    with_retry(&self.retry, "create", || provider.create(key, spec)).await?;
                let attributes = await_operation(provider, &token, &self.poll, &self.retry).await?;
                info!(resource = %key, %handle, "Created");
                Ok(Completed { handle, attributes })
            }
            NodeOperation::Update { handle, spec } => {
                debug!(resource = %key, fields = ?spec.redacted(), "Requesting update");
                let token =
                    with_retry(&self.retry, "update", || provider.update(handle, spec)).await?;
                let attributes = await_operation(provider, &token, &self.poll, &self.retry).await?;
                info!(resource = %key, %handle, "Updated");
                Ok(Completed {
                    handle: handle.clone(),
                    attributes,
                })
            }
            NodeOperation::Delete { handle } => {
                let requested = with_retry(&self.retry, "delete", || provider.delete(handle)).await;
                let token = match requested {
                    Ok(token) => token,
                    Err(ProviderError::NotFound(reason)) => {
                        warn!(resource = %key, %reason, "Already gone");
                        return Ok(Completed {
                            handle: handle.clone(),
                            attributes: BTreeMap::new(),
                        });
                    }
                    Err(error) => return Err(error),
                };
                await_operation(provider, &token, &self.poll, &self.retry).await?;
                info!(resource = %key, %handle, "Deleted");
                Ok(Completed {
                    handle: handle.clone(),
                    attributes: BTreeMap::new(),
                })
            }
            NodeOperation::Lookup { spec } => {
                debug!(resource = %key, fields = ?spec.redacted(), "Querying lookup");
                let remote =
                    with_retry(&self.retry, "lookup", || provider.lookup(key, spec)).await?;
                info!(resource = %key, "Lookup answered");
                Ok(Completed {
                    handle: RemoteHandle {
                        kind: key.kind(),
                        id: key.to_string(),
                    },
                    attributes: remote.attributes,
                })
            }
        }
    }
}
