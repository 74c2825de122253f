// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Specs
//!
//! A [`ResourceSpec`] is the desired state of one resource: its kind and a map
//! of input fields, each either a literal or an [`Output`] of another resource.
//! Specs are validated against the kind's schema when they are built, so an
//! unknown field, a missing required field or a mistyped literal is a
//! declaration error rather than a provider rejection later on.
//!
//! Before a provider call the executor materializes the spec against the run's
//! [`ResolutionTable`], producing a [`MaterializedSpec`] of concrete values.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use super::network::Cidr;
use super::resource_key::ResourceKey;
use super::resource_kind::ResourceKind;
use super::schema::{schema_for, KindSchema};
use crate::output::{AttributeRef, Output, Resolution, ResolutionTable, UntypedOutput, REDACTED};

/// Spec validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("Invalid {kind} spec: {}", .problems.join("; "))]
    Invalid {
        kind: ResourceKind,
        problems: Vec<String>,
    },
}

/// Materialization failure for one field
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MaterializeError {
    #[error("Field {field} is not resolved yet")]
    Pending { field: String },

    #[error("Field {field} could not be resolved: {reason}")]
    Failed { field: String, reason: String },

    #[error("Field {field} resolved to the wrong type: {reason}")]
    TypeMismatch { field: String, reason: String },
}

/// One input field value
#[derive(Clone)]
pub enum Input {
    Literal(Value),
    Output(UntypedOutput),
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => write!(f, "Literal({v})"),
            Self::Output(o) => write!(f, "{o:?}"),
        }
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Self::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Self::Literal(Value::String(value))
    }
}

impl From<bool> for Input {
    fn from(value: bool) -> Self {
        Self::Literal(Value::Bool(value))
    }
}

impl From<i64> for Input {
    fn from(value: i64) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<u32> for Input {
    fn from(value: u32) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<Cidr> for Input {
    fn from(value: Cidr) -> Self {
        Self::Literal(Value::String(value.as_cidr()))
    }
}

impl From<Vec<String>> for Input {
    fn from(value: Vec<String>) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<Vec<&str>> for Input {
    fn from(value: Vec<&str>) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl<T> From<Output<T>> for Input {
    fn from(value: Output<T>) -> Self {
        Self::Output(value.into_untyped())
    }
}

impl<T> From<&Output<T>> for Input {
    fn from(value: &Output<T>) -> Self {
        Self::Output(value.untyped().clone())
    }
}

/// Desired state of one resource
#[derive(Clone)]
pub struct ResourceSpec {
    kind: ResourceKind,
    fields: BTreeMap<&'static str, Input>,
}

impl ResourceSpec {
    /// Start building a spec for a kind
    pub fn builder(kind: ResourceKind) -> SpecBuilder {
        SpecBuilder {
            schema: schema_for(kind),
            fields: BTreeMap::new(),
            problems: Vec::new(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn schema(&self) -> KindSchema {
        schema_for(self.kind)
    }

    pub fn get(&self, field: &str) -> Option<&Input> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &Input)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    /// Outputs embedded in this spec
    pub fn outputs(&self) -> impl Iterator<Item = &UntypedOutput> {
        self.fields.values().filter_map(|input| match input {
            Input::Output(o) => Some(o),
            Input::Literal(_) => None,
        })
    }

    /// Resources whose attributes this spec reads
    pub fn referenced_owners(&self) -> BTreeSet<ResourceKey> {
        self.outputs().flat_map(UntypedOutput::owners).collect()
    }

    pub fn attribute_refs(&self) -> BTreeSet<AttributeRef> {
        self.outputs().flat_map(UntypedOutput::attribute_refs).collect()
    }

    /// Secrets this spec reads
    pub fn secret_names(&self) -> BTreeSet<String> {
        self.outputs().flat_map(UntypedOutput::secret_names).collect()
    }

    /// Whether a field carries a sensitive value
    pub fn is_sensitive(&self, field: &str) -> bool {
        let declared = self.schema().field(field).is_some_and(|f| f.sensitive);
        let tainted = matches!(self.fields.get(field), Some(Input::Output(o)) if o.is_sensitive());
        declared || tainted
    }

    /// Resolve every field to a concrete value
    pub fn materialize(&self, table: &ResolutionTable) -> Result<MaterializedSpec, MaterializeError> {
        let schema = self.schema();
        let mut fields = BTreeMap::new();
        let mut sensitive = BTreeSet::new();

        for (name, input) in &self.fields {
            let value = match input {
                Input::Literal(v) => v.clone(),
                Input::Output(o) => match table.evaluate(o) {
                    Resolution::Resolved(v) => v,
                    Resolution::Pending => {
                        return Err(MaterializeError::Pending {
                            field: name.to_string(),
                        })
                    }
                    Resolution::Failed(reason) => {
                        return Err(MaterializeError::Failed {
                            field: name.to_string(),
                            reason,
                        })
                    }
                },
            };

            if let Some(field) = schema.field(name) {
                field
                    .ty
                    .check(&value)
                    .map_err(|reason| MaterializeError::TypeMismatch {
                        field: name.to_string(),
                        // CIDR parse errors quote the value.
                        reason: if self.is_sensitive(name) {
                            REDACTED.to_string()
                        } else {
                            reason
                        },
                    })?;
            }

            if self.is_sensitive(name) {
                sensitive.insert(name.to_string());
            }
            fields.insert(name.to_string(), value);
        }

        Ok(MaterializedSpec {
            kind: self.kind,
            fields,
            sensitive,
        })
    }
}

impl fmt::Debug for ResourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, input) in &self.fields {
            match input {
                Input::Literal(_) if self.is_sensitive(name) => map.entry(name, &REDACTED),
                other => map.entry(name, other),
            };
        }
        map.finish()
    }
}

/// Builder validating fields against the kind's schema
#[derive(Debug)]
pub struct SpecBuilder {
    schema: KindSchema,
    fields: BTreeMap<&'static str, Input>,
    problems: Vec<String>,
}

impl SpecBuilder {
    /// Set a field
    pub fn set(mut self, name: &str, value: impl Into<Input>) -> Self {
        let Some(field) = self.schema.field(name) else {
            self.problems.push(format!("unknown field {name}"));
            return self;
        };

        let input = value.into();
        if let Input::Literal(v) = &input {
            if let Err(reason) = field.ty.check(v) {
                self.problems.push(format!("field {name}: {reason}"));
            }
        }

        if self.fields.insert(field.name, input).is_some() {
            self.problems.push(format!("field {name} set twice"));
        }
        self
    }

    /// Set a field when a value is present
    pub fn set_opt<V: Into<Input>>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(name, v),
            None => self,
        }
    }

    pub fn build(mut self) -> Result<ResourceSpec, SpecError> {
        for field in self.schema.fields.iter().filter(|f| f.required) {
            if !self.fields.contains_key(field.name) {
                self.problems.push(format!("missing required field {}", field.name));
            }
        }

        if !self.problems.is_empty() {
            return Err(SpecError::Invalid {
                kind: self.schema.kind,
                problems: self.problems,
            });
        }

        Ok(ResourceSpec {
            kind: self.schema.kind,
            fields: self.fields,
        })
    }
}

/// SHA-256 fingerprint of a value, used to compare sensitive fields without
/// retaining them
pub fn fingerprint(value: &Value) -> String {
    let digest = Sha256::digest(value.to_string().as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Fully resolved spec handed to a provider
#[derive(Clone, PartialEq)]
pub struct MaterializedSpec {
    kind: ResourceKind,
    fields: BTreeMap<String, Value>,
    sensitive: BTreeSet<String>,
}

impl MaterializedSpec {
    /// Assemble a spec from concrete values, marking schema-sensitive fields
    pub fn from_values(kind: ResourceKind, fields: BTreeMap<String, Value>) -> Self {
        let schema = schema_for(kind);
        let sensitive = fields
            .keys()
            .filter(|name| schema.field(name).is_some_and(|f| f.sensitive))
            .cloned()
            .collect();
        Self {
            kind,
            fields,
            sensitive,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn is_sensitive(&self, field: &str) -> bool {
        self.sensitive.contains(field)
    }

    /// Field values with sensitive ones replaced by the redaction marker
    pub fn redacted(&self) -> BTreeMap<String, Value> {
        self.fields
            .iter()
            .map(|(name, value)| {
                let shown = if self.is_sensitive(name) {
                    Value::String(REDACTED.to_string())
                } else {
                    value.clone()
                };
                (name.clone(), shown)
            })
            .collect()
    }

    pub fn fingerprint(&self, field: &str) -> Option<String> {
        self.fields.get(field).map(fingerprint)
    }
}

impl fmt::Debug for MaterializedSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaterializedSpec")
            .field("kind", &self.kind)
            .field("fields", &self.redacted())
            .finish()
    }
}
