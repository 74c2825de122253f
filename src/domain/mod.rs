// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Domain Models
//!
//! Core domain concepts for declaring provisioned resources: the kind
//! taxonomy, per-kind field schemas, and value objects with validation
//! invariants.
//!
//! # Value Objects with Invariants
//!
//! - [`ResourceName`] - provider-facing names (RFC 1035 labels)
//! - [`ResourceKey`] - resource identity, unique name within a kind
//! - [`Cidr`] - IPv4/IPv6 ranges without host bits
//! - [`ResourceKind`] - resource taxonomy and serving [`Plane`]
//!
//! # Desired State
//!
//! - [`ResourceSpec`] - validated input fields, literal or [`Output`](crate::output::Output)
//! - [`MaterializedSpec`] - fully resolved fields with sensitivity marks

pub mod network;
pub mod resource_key;
pub mod resource_kind;
pub mod resource_name;
pub mod schema;
pub mod spec;

pub use network::{Cidr, NetworkError};
pub use resource_key::ResourceKey;
pub use resource_kind::{Plane, ResourceKind};
pub use resource_name::{ResourceName, ResourceNameError};
pub use schema::{schema_for, AttributeSchema, FieldSchema, FieldType, KindSchema};
pub use spec::{
    fingerprint, Input, MaterializeError, MaterializedSpec, ResourceSpec, SpecBuilder, SpecError,
};
