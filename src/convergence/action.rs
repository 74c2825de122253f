// Copyright (c) 2025 - Cowboy AI, Inc.
//! Per-node convergence decision

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::state::RecordedResource;
use crate::domain::{schema_for, MaterializedSpec, ResourceKey};

/// Action needed to bring one resource to its desired state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// No prior record
    Create,
    /// Mutable fields changed; applied in place
    Update { changed: Vec<String> },
    /// An immutable field changed, or a dependency is being replaced
    ReplaceRequired {
        changed: Vec<String>,
        cascaded_from: Option<ResourceKey>,
    },
    /// Recorded but no longer declared
    Delete,
    NoOp,
    /// Read-only lookup, queried on every run and never recorded
    Read,
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update { .. } => "update",
            Self::ReplaceRequired { .. } => "replace",
            Self::Delete => "delete",
            Self::NoOp => "no-op",
            Self::Read => "read",
        }
    }

    /// Whether carrying out the action mutates remote state
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::NoOp | Self::Read)
    }

    /// Whether the existing remote resource goes away first
    pub fn deletes_existing(&self) -> bool {
        matches!(self, Self::ReplaceRequired { .. } | Self::Delete)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update { changed } => write!(f, "update ({})", changed.join(", ")),
            Self::ReplaceRequired {
                cascaded_from: Some(cause),
                ..
            } => write!(f, "replace (dependency {cause} is replaced)"),
            Self::ReplaceRequired { changed, .. } => write!(f, "replace ({})", changed.join(", ")),
            other => f.write_str(other.label()),
        }
    }
}

/// Decide the action for one resource
///
/// Sensitive fields are compared by fingerprint, so a changed secret is
/// detected without the old value ever being stored.
pub fn converge(
    key: &ResourceKey,
    desired: &MaterializedSpec,
    recorded: Option<&RecordedResource>,
) -> Action {
    match recorded {
        None => Action::Create,
        Some(recorded) => classify(key, changed_fields(recorded, desired.fields(), &BTreeSet::new())),
    }
}

/// Fields whose desired value differs from the record
///
/// `unknown` fields cannot be compared yet (their values depend on a
/// resource that is still to be created) and count as changed.
pub(crate) fn changed_fields(
    recorded: &RecordedResource,
    known: &BTreeMap<String, Value>,
    unknown: &BTreeSet<String>,
) -> BTreeSet<String> {
    let mut changed: BTreeSet<String> = unknown.clone();
    for (name, value) in known {
        match recorded.fields.get(name) {
            Some(field) if field.matches(value) => {}
            _ => {
                changed.insert(name.clone());
            }
        }
    }
    for name in recorded.fields.keys() {
        if !known.contains_key(name) && !unknown.contains(name) {
            changed.insert(name.clone());
        }
    }
    changed
}

/// Map a set of changed fields to an action using the kind's mutability
pub(crate) fn classify(key: &ResourceKey, changed: BTreeSet<String>) -> Action {
    if changed.is_empty() {
        return Action::NoOp;
    }

    let schema = schema_for(key.kind());
    let immutable = changed
        .iter()
        .any(|name| schema.field(name).map_or(true, |f| !f.mutable));
    let changed = changed.into_iter().collect();

    if immutable {
        Action::ReplaceRequired {
            changed,
            cascaded_from: None,
        }
    } else {
        Action::Update { changed }
    }
}
