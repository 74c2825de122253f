// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::resource_kind::ResourceKind;
use super::resource_name::{ResourceName, ResourceNameError};

/// Stable identity of a resource: unique name within its kind
///
/// Serialized as `kind/name`, e.g. `subnetwork/demo-private-subnet`, so keys
/// can be used directly as JSON object keys in persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceKey {
    kind: ResourceKind,
    name: ResourceName,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, name: ResourceName) -> Self {
        Self { kind, name }
    }

    /// Build a key from a raw name, validating it
    pub fn parse_name(kind: ResourceKind, name: &str) -> Result<Self, ResourceNameError> {
        Ok(Self::new(kind, ResourceName::new(name)?))
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn name(&self) -> &ResourceName {
        &self.name
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

impl FromStr for ResourceKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s
            .split_once('/')
            .ok_or_else(|| format!("Resource key must be kind/name: {s}"))?;
        let kind = kind.parse::<ResourceKind>()?;
        Self::parse_name(kind, name).map_err(|e| e.to_string())
    }
}

impl TryFrom<String> for ResourceKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceKey> for String {
    fn from(value: ResourceKey) -> Self {
        value.to_string()
    }
}
