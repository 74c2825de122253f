// Copyright (c) 2025 - Cowboy AI, Inc.
//! Secret Inputs
//!
//! Sensitive inputs (database credentials, tokens) are referenced by name when
//! a graph is declared and looked up from a [`SecretStore`] when specs are
//! materialized. Values are wrapped in [`SecretValue`], whose `Debug` and
//! `Display` never print the content.

use std::collections::HashMap;
use std::fmt;

use crate::output::REDACTED;

/// A secret value that refuses to print itself
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the cleartext
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretValue({REDACTED})")
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// Source of named secrets supplied at run start
pub trait SecretStore: Send + Sync {
    fn get(&self, name: &str) -> Option<SecretValue>;

    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// In-memory secrets, mostly for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    values: HashMap<String, SecretValue>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), SecretValue::new(value));
    }
}

impl SecretStore for StaticSecrets {
    fn get(&self, name: &str) -> Option<SecretValue> {
        self.values.get(name).cloned()
    }
}

/// Secrets read from `PROVISION_SECRET_<NAME>` environment variables
///
/// `db-password` is looked up as `PROVISION_SECRET_DB_PASSWORD`.
#[derive(Debug, Clone)]
pub struct EnvSecrets {
    prefix: String,
}

impl EnvSecrets {
    pub const DEFAULT_PREFIX: &'static str = "PROVISION_SECRET_";

    pub fn new() -> Self {
        Self::with_prefix(Self::DEFAULT_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Environment variable consulted for a secret name
    pub fn variable_for(&self, name: &str) -> String {
        let suffix: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{suffix}", self.prefix)
    }
}

impl Default for EnvSecrets {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for EnvSecrets {
    fn get(&self, name: &str) -> Option<SecretValue> {
        std::env::var(self.variable_for(name))
            .ok()
            .filter(|v| !v.is_empty())
            .map(SecretValue::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_value_never_prints() {
        let secret = SecretValue::new("hunter2");
        assert!(!format!("{secret:?}").contains("hunter2"));
        assert!(!format!("{secret}").contains("hunter2"));
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn test_static_secrets() {
        let store = StaticSecrets::new().with("db-password", "pw");
        assert!(store.contains("db-password"));
        assert!(!store.contains("db-user"));
    }

    #[test]
    fn test_env_variable_names() {
        let store = EnvSecrets::new();
        assert_eq!(store.variable_for("db-password"), "PROVISION_SECRET_DB_PASSWORD");
        assert_eq!(store.variable_for("api.token"), "PROVISION_SECRET_API_TOKEN");
    }

    #[test]
    fn test_env_lookup() {
        let store = EnvSecrets::with_prefix("CIM_PROVISIONING_TEST_SECRET_");
        std::env::set_var("CIM_PROVISIONING_TEST_SECRET_TOKEN", "abc");
        assert_eq!(store.get("token").map(|s| s.expose().to_string()), Some("abc".into()));
        assert!(store.get("absent").is_none());
    }
}
