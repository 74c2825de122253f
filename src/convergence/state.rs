// Copyright (c) 2025 - Cowboy AI, Inc.
//! Persisted Remote State
//!
//! The last known remote state of every resource a run has touched. A
//! snapshot is saved after each node settles so an interrupted run resumes
//! from what actually happened.
//!
//! Sensitive field values are stored as fingerprints and sensitive
//! attributes are not stored at all; neither ever reaches disk.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{fingerprint, schema_for, MaterializedSpec, ResourceKey};
use crate::provider::RemoteHandle;

const STATE_VERSION: u32 = 1;

/// State persistence errors
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("State file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("State file version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// One recorded input field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordedField {
    Plain(Value),
    /// Only the SHA-256 fingerprint of a sensitive value is kept
    Sensitive { fingerprint: String },
}

impl RecordedField {
    /// Whether a desired value equals the recorded one
    pub fn matches(&self, desired: &Value) -> bool {
        match self {
            Self::Plain(value) => value == desired,
            Self::Sensitive { fingerprint: recorded } => *recorded == fingerprint(desired),
        }
    }
}

/// Last known state of one remote resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedResource {
    pub key: ResourceKey,
    pub handle: RemoteHandle,
    pub fields: BTreeMap<String, RecordedField>,
    /// Non-sensitive provider-assigned attributes
    pub attributes: BTreeMap<String, Value>,
    /// Dependencies at the time of the last apply, used to order deletion
    pub dependencies: Vec<ResourceKey>,
    pub layer: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl RecordedResource {
    pub fn new(
        key: ResourceKey,
        handle: RemoteHandle,
        spec: &MaterializedSpec,
        attributes: &BTreeMap<String, Value>,
    ) -> Self {
        let fields = spec
            .fields()
            .iter()
            .map(|(name, value)| {
                let recorded = if spec.is_sensitive(name) {
                    RecordedField::Sensitive {
                        fingerprint: fingerprint(value),
                    }
                } else {
                    RecordedField::Plain(value.clone())
                };
                (name.clone(), recorded)
            })
            .collect();

        let schema = schema_for(key.kind());
        let attributes = attributes
            .iter()
            .filter(|(name, _)| schema.attribute(name).is_some_and(|a| !a.sensitive))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Self {
            key,
            handle,
            fields,
            attributes,
            dependencies: Vec::new(),
            layer: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<ResourceKey>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_layer(mut self, layer: Option<&str>) -> Self {
        self.layer = layer.map(str::to_string);
        self
    }

    /// Whether the record is missing an attribute the kind publishes
    ///
    /// True for every kind with sensitive attributes, which are never stored.
    pub fn has_unrecorded_attributes(&self) -> bool {
        schema_for(self.key.kind())
            .attribute_names()
            .any(|name| !self.attributes.contains_key(name))
    }
}

/// Snapshot of every recorded resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub resources: BTreeMap<ResourceKey, RecordedResource>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&RecordedResource> {
        self.resources.get(key)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.resources.contains_key(key)
    }

    /// Add or replace a record
    pub fn record(&mut self, resource: RecordedResource) {
        self.resources.insert(resource.key.clone(), resource);
        self.updated_at = Utc::now();
    }

    pub fn remove(&mut self, key: &ResourceKey) -> Option<RecordedResource> {
        let removed = self.resources.remove(key);
        if removed.is_some() {
            self.updated_at = Utc::now();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        self.resources.keys()
    }

    /// Recorded keys in deletion order: dependents before their dependencies
    ///
    /// Dependencies that are no longer recorded are ignored.
    pub fn deletion_order(&self) -> Vec<ResourceKey> {
        let mut remaining: BTreeMap<&ResourceKey, usize> = self
            .resources
            .keys()
            .map(|k| (k, self.dependents_of(k).count()))
            .collect();

        let mut order = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            let ready: Vec<&ResourceKey> = remaining
                .iter()
                .filter(|(_, &waiting)| waiting == 0)
                .map(|(&k, _)| k)
                .collect();
            if ready.is_empty() {
                // Recorded dependencies come from acyclic graphs; a hand-edited
                // cycle is deleted in key order.
                order.extend(remaining.keys().map(|k| (*k).clone()));
                break;
            }
            for key in ready {
                remaining.remove(key);
                if let Some(resource) = self.resources.get(key) {
                    for dependency in &resource.dependencies {
                        if let Some(waiting) = remaining.get_mut(dependency) {
                            *waiting = waiting.saturating_sub(1);
                        }
                    }
                }
                order.push(key.clone());
            }
        }
        order
    }

    fn dependents_of<'a>(&'a self, key: &'a ResourceKey) -> impl Iterator<Item = &'a ResourceKey> {
        self.resources
            .values()
            .filter(move |r| r.dependencies.contains(key))
            .map(|r| &r.key)
    }
}

/// Storage for state snapshots
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<StateSnapshot, StateStoreError>;

    async fn save(&self, snapshot: &StateSnapshot) -> Result<(), StateStoreError>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    snapshot: RwLock<StateSnapshot>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: StateSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
        }
    }

    /// Current snapshot, for inspection
    pub async fn snapshot(&self) -> StateSnapshot {
        self.snapshot.read().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<StateSnapshot, StateStoreError> {
        Ok(self.snapshot.read().await.clone())
    }

    async fn save(&self, snapshot: &StateSnapshot) -> Result<(), StateStoreError> {
        *self.snapshot.write().await = snapshot.clone();
        Ok(())
    }
}

/// JSON file store with atomic replacement
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<StateSnapshot, StateStoreError> {
        if !fs::try_exists(&self.path).await? {
            debug!(path = %self.path.display(), "State file not found, starting empty");
            return Ok(StateSnapshot::new());
        }

        let content = fs::read_to_string(&self.path).await?;
        let snapshot: StateSnapshot = serde_json::from_str(&content)?;
        if snapshot.version > STATE_VERSION {
            return Err(StateStoreError::UnsupportedVersion {
                found: snapshot.version,
                supported: STATE_VERSION,
            });
        }

        debug!(resources = snapshot.len(), "Loaded state");
        Ok(snapshot)
    }

    async fn save(&self, snapshot: &StateSnapshot) -> Result<(), StateStoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }

        let temp = self.temp_path();
        fs::write(&temp, serde_json::to_vec_pretty(snapshot)?).await?;
        fs::rename(&temp, &self.path).await?;

        debug!(resources = snapshot.len(), "Saved state");
        Ok(())
    }
}
