// Copyright (c) 2025 - Cowboy AI, Inc.
//! Published Export Map
//!
//! After a run, the outputs a graph exports are evaluated into a flat,
//! name-keyed map. Sensitive outputs keep their key but their value is
//! replaced by [`REDACTED`]; nothing derived from a secret or a sensitive
//! attribute ever reaches this map in cleartext.

use serde::ser::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

use super::{Resolution, ResolutionTable, UntypedOutput, REDACTED};

/// One exported value
#[derive(Debug, Clone, PartialEq)]
pub enum ExportValue {
    Value(Value),
    Redacted,
    /// The output did not resolve (owner failed, blocked or not attempted)
    Unavailable(String),
}

impl ExportValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn is_redacted(&self) -> bool {
        matches!(self, Self::Redacted)
    }
}

impl Serialize for ExportValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => v.serialize(serializer),
            Self::Redacted => serializer.serialize_str(REDACTED),
            Self::Unavailable(_) => serializer.serialize_none(),
        }
    }
}

/// Flat map of named exports
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct ExportMap {
    entries: BTreeMap<String, ExportValue>,
}

impl ExportMap {
    /// Evaluate exports against a run's resolution table
    pub fn collect<'a, I>(exports: I, table: &ResolutionTable) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a UntypedOutput)>,
    {
        let entries = exports
            .into_iter()
            .map(|(name, output)| {
                let value = match table.evaluate(output) {
                    Resolution::Resolved(_) if output.is_sensitive() => ExportValue::Redacted,
                    Resolution::Resolved(v) => ExportValue::Value(v),
                    Resolution::Pending => ExportValue::Unavailable("not resolved".to_string()),
                    Resolution::Failed(reason) => ExportValue::Unavailable(reason),
                };
                (name.clone(), value)
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&ExportValue> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ExportValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as a JSON object
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
