// Copyright (c) 2025 - Cowboy AI, Inc.
//! State refresh
//!
//! Reads every recorded resource back from its provider before planning.
//! A resource that no longer exists is dropped from state so the next plan
//! recreates it; remote field drift overwrites the record so the plan
//! compares desired values against what is really there.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use super::state::{RecordedField, StateSnapshot};
use crate::domain::{fingerprint, schema_for, ResourceKey};
use crate::provider::{with_retry, ProviderError, ResourceProvider, RetryConfig};

/// What a refresh found
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Recorded resources that no longer exist remotely
    pub vanished: Vec<ResourceKey>,
    /// Resources whose remote fields differ from the record
    pub drifted: Vec<ResourceKey>,
    /// Resources that could not be read; their records are kept
    pub unreachable: Vec<ResourceKey>,
}

/// Refresh a snapshot in place, reading up to `concurrency` resources at once
pub async fn refresh(
    snapshot: &mut StateSnapshot,
    provider: &dyn ResourceProvider,
    retry: &RetryConfig,
    concurrency: usize,
) -> RefreshReport {
    let handles: Vec<_> = snapshot
        .resources
        .values()
        .map(|r| (r.key.clone(), r.handle.clone()))
        .collect();

    let reads: Vec<_> = stream::iter(handles)
        .map(|(key, handle)| async move {
            let result = with_retry(retry, "read", || provider.read(&handle)).await;
            (key, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut report = RefreshReport::default();
    for (key, result) in reads {
        match result {
            Ok(remote) => {
                let Some(record) = snapshot.resources.get_mut(&key) else {
                    continue;
                };

                let mut drifted = false;
                for (name, recorded) in record.fields.iter_mut() {
                    let Some(value) = remote.fields.get(name) else {
                        continue;
                    };
                    if recorded.matches(value) {
                        continue;
                    }
                    drifted = true;
                    let replacement = match recorded {
                        RecordedField::Plain(_) => RecordedField::Plain(value.clone()),
                        RecordedField::Sensitive { .. } => RecordedField::Sensitive {
                            fingerprint: fingerprint(value),
                        },
                    };
                    *recorded = replacement;
                }

                let schema = schema_for(key.kind());
                record.attributes.extend(
                    remote
                        .attributes
                        .into_iter()
                        .filter(|(name, _)| schema.attribute(name).is_some_and(|a| !a.sensitive)),
                );

                if drifted {
                    info!(resource = %key, "Remote drift detected");
                    report.drifted.push(key);
                }
            }
            Err(ProviderError::NotFound(_)) => {
                info!(resource = %key, "Recorded resource no longer exists");
                snapshot.remove(&key);
                report.vanished.push(key);
            }
            Err(error) => {
                warn!(resource = %key, %error, "Could not refresh resource");
                report.unreachable.push(key);
            }
        }
    }

    report.vanished.sort();
    report.drifted.sort();
    report.unreachable.sort();
    report
}
