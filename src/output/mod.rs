// Copyright (c) 2025 - Cowboy AI, Inc.
//! Attribute Futures
//!
//! An [`Output<T>`] stands for a value that is not known while the graph is
//! being declared: a network id, a control-plane endpoint, a database
//! connection name. It is a description of *how* to obtain the value once the
//! owning resource has been created, never the value itself.
//!
//! # Model
//!
//! ```text
//! Output<T> ≅ ResolutionTable → Resolution<T>
//! ```
//!
//! An output is a small expression tree:
//!
//! - `Attribute` - a provider-assigned attribute of one resource
//! - `Constant` - a literal known at declaration time
//! - `Secret` - a named sensitive input supplied at run start
//! - `Map` - a pure transformation of one output
//! - `Combine` - a pure transformation of several outputs at once
//!
//! Evaluating an output against a run's [`ResolutionTable`] never blocks and
//! yields `Pending`, `Resolved(value)` or `Failed(reason)`. Failure of any leaf
//! short-circuits the whole chain: transformations downstream of a failed
//! resource are never invoked.
//!
//! # Sensitivity
//!
//! Secret leaves and sensitive provider attributes taint every output built on
//! top of them. `map` keeps the taint, `combine` and `all` take the union.
//! Tainted outputs are redacted from exports, reports and logs.
//!
//! # Example
//!
//! ```rust,ignore
//! let endpoint: Output<String> = cluster.output("endpoint");
//! let url = endpoint.map(|ip| format!("https://{ip}"));
//!
//! let access = combine2(&url, &cluster.output::<String>("ca_certificate"), |url, ca| {
//!     ClusterAccess { url, ca }
//! });
//! assert!(access.is_sensitive());
//! ```

pub mod export;
pub mod resolution;

pub use export::{ExportMap, ExportValue};
pub use resolution::{Resolution, ResolutionError, ResolutionTable};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{schema_for, ResourceKey};

/// Marker written in place of sensitive values
pub const REDACTED: &str = "[REDACTED]";

/// Failure reason of a transformation over a sensitive value
pub const SENSITIVE_TRANSFORMATION_FAILED: &str = "[REDACTED] transformation of a sensitive value failed";

/// Identity of one output node, used for per-run memoisation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(Uuid);

impl OutputId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to one published attribute of one resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeRef {
    pub owner: ResourceKey,
    pub attribute: String,
}

impl fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.attribute)
    }
}

type MapFn = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;
type CombineFn = Arc<dyn Fn(Vec<Value>) -> Result<Value, String> + Send + Sync>;

pub(crate) enum Expr {
    Attribute(AttributeRef),
    Constant(Value),
    Invalid(String),
    Secret(String),
    Map { input: UntypedOutput, f: MapFn },
    Combine { inputs: Vec<UntypedOutput>, f: CombineFn },
}

/// Output with its value type erased
///
/// This is what resource specs embed; [`Output<T>`] is the typed facade used
/// while declaring.
#[derive(Clone)]
pub struct UntypedOutput {
    id: OutputId,
    expr: Arc<Expr>,
    sensitive: bool,
}

impl UntypedOutput {
    fn new(expr: Expr, sensitive: bool) -> Self {
        Self {
            id: OutputId::new(),
            expr: Arc::new(expr),
            sensitive,
        }
    }

    pub fn id(&self) -> OutputId {
        self.id
    }

    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    pub(crate) fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Every resource attribute this output ultimately reads
    pub fn attribute_refs(&self) -> BTreeSet<AttributeRef> {
        let mut refs = BTreeSet::new();
        self.walk(&mut |expr| {
            if let Expr::Attribute(r) = expr {
                refs.insert(r.clone());
            }
        });
        refs
    }

    /// Every resource this output depends on
    pub fn owners(&self) -> BTreeSet<ResourceKey> {
        self.attribute_refs().into_iter().map(|r| r.owner).collect()
    }

    /// Names of the secrets this output reads
    pub fn secret_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.walk(&mut |expr| {
            if let Expr::Secret(name) = expr {
                names.insert(name.clone());
            }
        });
        names
    }

    /// Reattach a value type
    pub fn typed<T>(self) -> Output<T> {
        Output {
            raw: self,
            _marker: PhantomData,
        }
    }

    fn walk(&self, visit: &mut dyn FnMut(&Expr)) {
        visit(&self.expr);
        match &*self.expr {
            Expr::Map { input, .. } => input.walk(visit),
            Expr::Combine { inputs, .. } => {
                for input in inputs {
                    input.walk(visit);
                }
            }
            Expr::Attribute(_) | Expr::Constant(_) | Expr::Invalid(_) | Expr::Secret(_) => {}
        }
    }
}

impl fmt::Debug for UntypedOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match &*self.expr {
            Expr::Attribute(r) => format!("attribute {r}"),
            Expr::Constant(_) if self.sensitive => "constant".to_string(),
            Expr::Constant(v) => format!("constant {v}"),
            Expr::Invalid(reason) => format!("invalid ({reason})"),
            Expr::Secret(name) => format!("secret {name}"),
            Expr::Map { .. } => "map".to_string(),
            Expr::Combine { inputs, .. } => format!("combine/{}", inputs.len()),
        };
        f.debug_struct("Output")
            .field("id", &self.id)
            .field("expr", &shape)
            .field("sensitive", &self.sensitive)
            .finish()
    }
}

/// Typed attribute future
pub struct Output<T> {
    raw: UntypedOutput,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Output<T> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Output<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Output<{}>({:?})", std::any::type_name::<T>(), self.raw)
    }
}

impl<T> Output<T> {
    pub fn untyped(&self) -> &UntypedOutput {
        &self.raw
    }

    pub fn into_untyped(self) -> UntypedOutput {
        self.raw
    }

    pub fn is_sensitive(&self) -> bool {
        self.raw.sensitive
    }

    /// Taint this output as sensitive
    pub fn mark_sensitive(mut self) -> Self {
        self.raw.sensitive = true;
        self
    }

    /// Attribute of a resource referenced by key
    ///
    /// The owning resource may be declared later; an owner that is never
    /// declared is rejected when the graph is frozen.
    pub fn reference(owner: ResourceKey, attribute: impl Into<String>) -> Self {
        let attribute = attribute.into();
        let sensitive = schema_for(owner.kind())
            .attribute(&attribute)
            .is_some_and(|a| a.sensitive);
        UntypedOutput::new(Expr::Attribute(AttributeRef { owner, attribute }), sensitive).typed()
    }

    /// Named secret supplied at run start
    pub fn secret(name: impl Into<String>) -> Self {
        UntypedOutput::new(Expr::Secret(name.into()), true).typed()
    }
}

impl<T: Serialize + DeserializeOwned + 'static> Output<T> {
    /// Output that is already known
    pub fn constant(value: T) -> Self {
        let expr = match serde_json::to_value(value) {
            Ok(v) => Expr::Constant(v),
            Err(e) => Expr::Invalid(e.to_string()),
        };
        UntypedOutput::new(expr, false).typed()
    }

    /// Transform the eventual value
    pub fn map<U, F>(&self, f: F) -> Output<U>
    where
        U: Serialize + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.try_map(move |value| Ok(f(value)))
    }

    /// Transform the eventual value with a fallible function
    ///
    /// An `Err` resolves the derived output to `Failed`.
    pub fn try_map<U, F>(&self, f: F) -> Output<U>
    where
        U: Serialize + 'static,
        F: Fn(T) -> Result<U, String> + Send + Sync + 'static,
    {
        let f: MapFn = Arc::new(move |value| {
            let input = decode::<T>(value)?;
            encode(f(input)?)
        });
        UntypedOutput::new(
            Expr::Map {
                input: self.raw.clone(),
                f,
            },
            self.raw.sensitive,
        )
        .typed()
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, String> {
    serde_json::from_value(value)
        .map_err(|e| format!("cannot decode {}: {e}", std::any::type_name::<T>()))
}

fn encode<T: Serialize>(value: T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

fn combine_raw(inputs: Vec<UntypedOutput>, f: CombineFn) -> UntypedOutput {
    let sensitive = inputs.iter().any(UntypedOutput::is_sensitive);
    UntypedOutput::new(Expr::Combine { inputs, f }, sensitive)
}

fn take_two(values: Vec<Value>) -> Result<(Value, Value), String> {
    let mut it = values.into_iter();
    match (it.next(), it.next()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err("combine arity mismatch".to_string()),
    }
}

/// Combine two outputs; resolves once both resolve
pub fn combine2<A, B, R, F>(a: &Output<A>, b: &Output<B>, f: F) -> Output<R>
where
    A: DeserializeOwned + 'static,
    B: DeserializeOwned + 'static,
    R: Serialize + 'static,
    F: Fn(A, B) -> R + Send + Sync + 'static,
{
    let f: CombineFn = Arc::new(move |values| {
        let (a, b) = take_two(values)?;
        encode(f(decode(a)?, decode(b)?))
    });
    combine_raw(vec![a.raw.clone(), b.raw.clone()], f).typed()
}

/// Combine three outputs; resolves once all three resolve
pub fn combine3<A, B, C, R, F>(a: &Output<A>, b: &Output<B>, c: &Output<C>, f: F) -> Output<R>
where
    A: DeserializeOwned + 'static,
    B: DeserializeOwned + 'static,
    C: DeserializeOwned + 'static,
    R: Serialize + 'static,
    F: Fn(A, B, C) -> R + Send + Sync + 'static,
{
    let f: CombineFn = Arc::new(move |values| {
        let mut it = values.into_iter();
        match (it.next(), it.next(), it.next()) {
            (Some(a), Some(b), Some(c)) => encode(f(decode(a)?, decode(b)?, decode(c)?)),
            _ => Err("combine arity mismatch".to_string()),
        }
    });
    combine_raw(vec![a.raw.clone(), b.raw.clone(), c.raw.clone()], f).typed()
}

/// Collect many outputs of one type into a list
pub fn all<T>(outputs: &[Output<T>]) -> Output<Vec<T>>
where
    T: Serialize + DeserializeOwned + 'static,
{
    let f: CombineFn = Arc::new(|values| Ok(Value::Array(values)));
    combine_raw(outputs.iter().map(|o| o.raw.clone()).collect(), f).typed()
}

/// Combine heterogeneous outputs into a JSON object keyed by name
///
/// Used to synthesize composite documents (environment blocks, access
/// configurations) from several provider-assigned values at once.
pub fn record<I, K>(fields: I) -> Output<Value>
where
    I: IntoIterator<Item = (K, UntypedOutput)>,
    K: Into<String>,
{
    let (names, inputs): (Vec<String>, Vec<UntypedOutput>) =
        fields.into_iter().map(|(k, o)| (k.into(), o)).unzip();
    let f: CombineFn = Arc::new(move |values| {
        Ok(Value::Object(names.iter().cloned().zip(values).collect()))
    });
    combine_raw(inputs, f).typed()
}
