// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Name Value Object with RFC 1035 Label Invariants

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Resource name validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResourceNameError {
    #[error("Resource name is empty")]
    Empty,

    #[error("Resource name exceeds maximum length of 63 characters: {0}")]
    TooLong(String),

    #[error("Invalid character {1:?} in resource name: {0}")]
    InvalidCharacter(String, char),

    #[error("Resource name must start with a lowercase letter: {0}")]
    InvalidStart(String),

    #[error("Resource name cannot end with a hyphen: {0}")]
    TrailingHyphen(String),
}

/// Provider-facing resource name
///
/// Cloud resource names follow RFC 1035 label rules:
/// - 1 to 63 characters
/// - Lowercase ASCII letters, digits and hyphens only
/// - Starts with a letter
/// - Does not end with a hyphen
///
/// # Examples
///
/// ```rust
/// use cim_provisioning::domain::ResourceName;
///
/// let name = ResourceName::new("demo-private-subnet").unwrap();
/// assert_eq!(name.as_str(), "demo-private-subnet");
///
/// assert!(ResourceName::new("").is_err());
/// assert!(ResourceName::new("1-starts-with-digit").is_err());
/// assert!(ResourceName::new("Upper").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceName(String);

impl ResourceName {
    /// Maximum length of a single RFC 1035 label
    pub const MAX_LENGTH: usize = 63;

    /// Create a new resource name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, ResourceNameError> {
        let name = name.into();

        if name.is_empty() {
            return Err(ResourceNameError::Empty);
        }

        if name.len() > Self::MAX_LENGTH {
            return Err(ResourceNameError::TooLong(name));
        }

        if let Some(ch) = name
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
        {
            return Err(ResourceNameError::InvalidCharacter(name, ch));
        }

        if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(ResourceNameError::InvalidStart(name));
        }

        if name.ends_with('-') {
            return Err(ResourceNameError::TrailingHyphen(name));
        }

        Ok(Self(name))
    }

    /// Build a name from a prefix and a suffix, e.g. `demo` + `vpc` → `demo-vpc`
    pub fn prefixed(prefix: &str, suffix: &str) -> Result<Self, ResourceNameError> {
        Self::new(format!("{prefix}-{suffix}"))
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ResourceName {
    type Error = ResourceNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ResourceName {
    type Error = ResourceNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceName> for String {
    fn from(value: ResourceName) -> Self {
        value.0
    }
}
