// Copyright (c) 2025 - Cowboy AI, Inc.
//! Run-Scoped Resolution
//!
//! A [`ResolutionTable`] holds everything the executor has learned during one
//! run: the attributes each created resource published and the resources
//! that failed. Outputs are evaluated against it.
//!
//! Publication happens exactly once per owner. Derived outputs are memoised by
//! [`OutputId`] the first time they reach a terminal resolution, so a
//! transformation chain runs at most once per run and every consumer observes
//! the same value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::Notify;

use super::{Expr, OutputId, UntypedOutput, SENSITIVE_TRANSFORMATION_FAILED};
use crate::domain::ResourceKey;
use crate::secrets::SecretStore;

/// Resolution state of an output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Resolution {
    Pending,
    Resolved(Value),
    Failed(String),
}

impl Resolution {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Resolved(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Outputs of {0} were already resolved in this run")]
    AlreadyResolved(ResourceKey),
}

#[derive(Default)]
struct TableState {
    attributes: HashMap<ResourceKey, BTreeMap<String, Value>>,
    failures: HashMap<ResourceKey, String>,
    memo: HashMap<OutputId, Resolution>,
}

impl TableState {
    fn is_settled(&self, owner: &ResourceKey) -> bool {
        self.attributes.contains_key(owner) || self.failures.contains_key(owner)
    }
}

/// Resolved attributes and failures for one run
pub struct ResolutionTable {
    secrets: Arc<dyn SecretStore>,
    state: Mutex<TableState>,
    settled: Notify,
}

impl ResolutionTable {
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            secrets,
            state: Mutex::new(TableState::default()),
            settled: Notify::new(),
        }
    }

    /// Publish the provider-assigned attributes of a resource
    pub fn publish(
        &self,
        owner: &ResourceKey,
        attributes: BTreeMap<String, Value>,
    ) -> Result<(), ResolutionError> {
        {
            let mut state = self.lock();
            if state.is_settled(owner) {
                return Err(ResolutionError::AlreadyResolved(owner.clone()));
            }
            state.attributes.insert(owner.clone(), attributes);
        }
        self.settled.notify_waiters();
        Ok(())
    }

    /// Record that a resource will never publish in this run
    pub fn fail(&self, owner: &ResourceKey, reason: impl Into<String>) -> Result<(), ResolutionError> {
        {
            let mut state = self.lock();
            if state.is_settled(owner) {
                return Err(ResolutionError::AlreadyResolved(owner.clone()));
            }
            state.failures.insert(owner.clone(), reason.into());
        }
        self.settled.notify_waiters();
        Ok(())
    }

    pub fn is_published(&self, owner: &ResourceKey) -> bool {
        self.lock().attributes.contains_key(owner)
    }

    /// Attributes published for a resource, if any
    pub fn attributes_of(&self, owner: &ResourceKey) -> Option<BTreeMap<String, Value>> {
        self.lock().attributes.get(owner).cloned()
    }

    /// Evaluate an output without blocking
    pub fn evaluate(&self, output: &UntypedOutput) -> Resolution {
        let mut state = self.lock();
        self.eval(&mut state, output)
    }

    /// Suspend until an output is no longer pending
    pub async fn wait(&self, output: &UntypedOutput) -> Resolution {
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.evaluate(output) {
                Resolution::Pending => notified.await,
                settled => return settled,
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn eval(&self, state: &mut TableState, output: &UntypedOutput) -> Resolution {
        if let Some(known) = state.memo.get(&output.id()) {
            return known.clone();
        }

        let resolution = match output.expr() {
            Expr::Constant(v) => Resolution::Resolved(v.clone()),
            Expr::Invalid(reason) => Resolution::Failed(reason.clone()),
            Expr::Secret(name) => match self.secrets.get(name) {
                Some(secret) => Resolution::Resolved(Value::String(secret.expose().to_string())),
                None => Resolution::Failed(format!("secret {name} is not available")),
            },
            Expr::Attribute(r) => {
                if let Some(reason) = state.failures.get(&r.owner) {
                    Resolution::Failed(format!("{} did not complete: {reason}", r.owner))
                } else if let Some(attributes) = state.attributes.get(&r.owner) {
                    match attributes.get(&r.attribute) {
                        Some(v) => Resolution::Resolved(v.clone()),
                        None => Resolution::Failed(format!("{r} was not published")),
                    }
                } else {
                    Resolution::Pending
                }
            }
            Expr::Map { input, f } => match self.eval(state, input) {
                Resolution::Resolved(v) => match (**f)(v) {
                    Ok(mapped) => Resolution::Resolved(mapped),
                    Err(reason) => transformation_failed(output, reason),
                },
                other => other,
            },
            Expr::Combine { inputs, f } => {
                let mut values = Vec::with_capacity(inputs.len());
                let mut pending = false;
                let mut failed = None;
                for input in inputs {
                    match self.eval(state, input) {
                        Resolution::Resolved(v) => values.push(v),
                        Resolution::Pending => pending = true,
                        Resolution::Failed(reason) => {
                            failed = Some(reason);
                            break;
                        }
                    }
                }
                match (failed, pending) {
                    (Some(reason), _) => Resolution::Failed(reason),
                    (None, true) => Resolution::Pending,
                    (None, false) => match (**f)(values) {
                        Ok(v) => Resolution::Resolved(v),
                        Err(reason) => transformation_failed(output, reason),
                    },
                }
            }
        };

        if !resolution.is_pending() {
            state.memo.insert(output.id(), resolution.clone());
        }
        resolution
    }
}

/// Failed transformation of `output`
///
/// Decode errors and `try_map` errors may quote the input value, so a
/// sensitive chain keeps only a fixed reason.
fn transformation_failed(output: &UntypedOutput, reason: String) -> Resolution {
    if output.is_sensitive() {
        Resolution::Failed(SENSITIVE_TRANSFORMATION_FAILED.to_string())
    } else {
        Resolution::Failed(reason)
    }
}

impl std::fmt::Debug for ResolutionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ResolutionTable")
            .field("published", &state.attributes.len())
            .field("failed", &state.failures.len())
            .field("memoised", &state.memo.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResourceKind;
    use crate::output::{combine2, Output};
    use crate::secrets::StaticSecrets;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn table() -> ResolutionTable {
        ResolutionTable::new(Arc::new(StaticSecrets::new().with("db-password", "pw")))
    }

    fn key(kind: ResourceKind, name: &str) -> ResourceKey {
        ResourceKey::parse_name(kind, name).unwrap()
    }

    fn attrs(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_pending_until_published() {
        let table = table();
        let vpc = key(ResourceKind::Network, "vpc");
        let id: Output<String> = Output::reference(vpc.clone(), "id");

        assert_eq!(table.evaluate(id.untyped()), Resolution::Pending);

        table.publish(&vpc, attrs(&[("id", json!("net-1"))])).unwrap();
        assert_eq!(table.evaluate(id.untyped()), Resolution::Resolved(json!("net-1")));
    }

    #[test]
    fn test_publish_exactly_once() {
        let table = table();
        let vpc = key(ResourceKind::Network, "vpc");
        table.publish(&vpc, attrs(&[("id", json!("a"))])).unwrap();

        assert_eq!(
            table.publish(&vpc, attrs(&[("id", json!("b"))])),
            Err(ResolutionError::AlreadyResolved(vpc.clone()))
        );
        assert!(table.fail(&vpc, "late").is_err());
    }

    #[test]
    fn test_failure_short_circuits_transformations() {
        let table = table();
        let cluster = key(ResourceKind::Cluster, "gke");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let endpoint: Output<String> = Output::reference(cluster.clone(), "endpoint");
        let url = endpoint.map(move |e| {
            counter.fetch_add(1, Ordering::SeqCst);
            format!("https://{e}")
        });

        table.fail(&cluster, "quota exceeded").unwrap();

        assert!(matches!(table.evaluate(url.untyped()), Resolution::Failed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_transformation_runs_once_and_value_is_stable() {
        let table = table();
        let redis = key(ResourceKind::RedisInstance, "cache");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let host: Output<String> = Output::reference(redis.clone(), "host");
        let port: Output<u16> = Output::reference(redis.clone(), "port");
        let url = combine2(&host, &port, move |h, p| {
            counter.fetch_add(1, Ordering::SeqCst);
            format!("redis://{h}:{p}")
        });

        table
            .publish(&redis, attrs(&[("host", json!("10.1.0.3")), ("port", json!(6379))]))
            .unwrap();

        let first = table.evaluate(url.untyped());
        let second = table.evaluate(url.untyped());
        assert_eq!(first, Resolution::Resolved(json!("redis://10.1.0.3:6379")));
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_try_map_error_fails_output() {
        let table = table();
        let port: Output<u16> = Output::constant(0);
        let checked = port.try_map(|p| if p == 0 { Err("port 0".to_string()) } else { Ok(p) });

        assert_eq!(
            table.evaluate(checked.untyped()),
            Resolution::Failed("port 0".to_string())
        );
    }

    #[test]
    fn test_sensitive_transformation_failure_hides_value() {
        let table = ResolutionTable::new(Arc::new(
            StaticSecrets::new().with("db-pin", "hunter2-cleartext"),
        ));
        let undecodable = Output::<u32>::secret("db-pin").map(|pin| format!("pin-{pin}"));
        let rejected =
            Output::<String>::secret("db-pin").try_map(|pin| Err::<String, _>(format!("bad pin {pin}")));
        let joined = combine2(
            &Output::constant("db".to_string()),
            &Output::<u32>::secret("db-pin"),
            |host, pin| format!("{host}:{pin}"),
        );

        for output in [undecodable.untyped(), rejected.untyped(), joined.untyped()] {
            assert_eq!(
                table.evaluate(output),
                Resolution::Failed(SENSITIVE_TRANSFORMATION_FAILED.to_string())
            );
        }
    }

    #[test]
    fn test_plain_transformation_failure_keeps_reason() {
        let table = table();
        let redis = key(ResourceKind::RedisInstance, "cache");
        let next_port = Output::<u16>::reference(redis.clone(), "port").map(|p| p + 1);
        table.publish(&redis, attrs(&[("port", json!("http"))])).unwrap();

        match table.evaluate(next_port.untyped()) {
            Resolution::Failed(reason) => assert!(reason.contains("http"), "{reason}"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_secrets_resolve_from_store() {
        let table = table();
        let present: Output<String> = Output::secret("db-password");
        let absent: Output<String> = Output::secret("db-user");

        assert_eq!(table.evaluate(present.untyped()), Resolution::Resolved(json!("pw")));
        assert!(matches!(table.evaluate(absent.untyped()), Resolution::Failed(_)));
    }

    #[tokio::test]
    async fn test_wait_wakes_on_publish() {
        let table = Arc::new(table());
        let vpc = key(ResourceKind::Network, "vpc");
        let id: Output<String> = Output::reference(vpc.clone(), "id");

        let waiter = {
            let table = table.clone();
            let id = id.clone();
            tokio::spawn(async move { table.wait(id.untyped()).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        table.publish(&vpc, attrs(&[("id", json!("net-9"))])).unwrap();

        let resolved = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved, Resolution::Resolved(json!("net-9")));
    }

    #[test]
    fn test_combined_wait_settles_on_last_input() {
        use tokio_test::{assert_pending, assert_ready, task};

        let table = table();
        let cluster = key(ResourceKind::Cluster, "gke");
        let cache = key(ResourceKind::RedisInstance, "cache");
        let endpoint: Output<String> = Output::reference(cluster.clone(), "endpoint");
        let host: Output<String> = Output::reference(cache.clone(), "host");
        let joined = combine2(&endpoint, &host, |e, h| format!("{e}|{h}"));

        let mut waiting = task::spawn(table.wait(joined.untyped()));
        assert_pending!(waiting.poll());

        table.publish(&cluster, attrs(&[("endpoint", json!("34.1.1.1"))])).unwrap();
        assert!(waiting.is_woken());
        assert_pending!(waiting.poll());

        table.fail(&cache, "quota exceeded").unwrap();
        assert!(waiting.is_woken());
        assert!(matches!(assert_ready!(waiting.poll()), Resolution::Failed(_)));
    }
}
