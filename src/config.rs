// Copyright (c) 2025 - Cowboy AI, Inc.
//! Run Configuration
//!
//! [`PlatformParams`] is the explicit parameter struct threaded into every
//! composition layer. Nothing reads ambient configuration during declaration;
//! the entry point loads parameters once (defaults, then a JSON file, then
//! `PROVISION_*` environment variables) and passes them down.
//!
//! [`ExecutorConfig`] holds the apply-phase knobs.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::{Cidr, ResourceName};
use crate::provider::{PollConfig, RetryConfig};

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {variable}: {reason}")]
    InvalidValue {
        variable: String,
        value: String,
        reason: String,
    },

    #[error("Invalid platform parameters: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("Cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parameters of the platform topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformParams {
    /// Cloud project hosting every resource
    pub project: String,
    pub region: String,
    pub zone: String,
    /// Platform name, used as the naming prefix of every resource
    pub name: String,

    /// Control-plane version line, e.g. `1.29`; empty follows the newest
    /// release of the channel
    pub control_plane_version: String,
    /// Release channel the control-plane version is looked up in
    pub release_channel: String,
    pub master_cidr: Cidr,
    pub public_subnet_cidr: Cidr,
    pub private_subnet_cidr: Cidr,

    pub node_machine_type: String,
    pub preemptible: bool,
    pub initial_node_count: u32,
    pub max_node_count: u32,

    pub bastion_machine_type: String,
    pub bastion_image: String,

    pub database_tier: String,
    pub database_version: String,
    pub cache_tier: String,
    pub cache_memory_gb: u32,
    pub cache_version: String,
    pub file_share_tier: String,
    pub file_share_capacity_gb: u32,
    pub file_share_cidr: Cidr,

    pub app_name: String,
    pub app_image: String,
    pub app_replicas: u32,

    /// Repository allowed to impersonate the CI service account
    pub ci_repository: String,
    pub ci_roles: Vec<String>,

    /// Secret names of the database credentials
    pub db_user_secret: String,
    pub db_password_secret: String,
}

fn cidr(s: &str) -> Cidr {
    // Literal defaults below are valid ranges.
    Cidr::new(s).unwrap_or_else(|_| unreachable!("invalid default CIDR {s}"))
}

impl Default for PlatformParams {
    fn default() -> Self {
        Self {
            project: "demo-project".to_string(),
            region: "europe-west1".to_string(),
            zone: "europe-west1-a".to_string(),
            name: "demo".to_string(),
            control_plane_version: "1.29".to_string(),
            release_channel: "REGULAR".to_string(),
            master_cidr: cidr("10.0.0.0/28"),
            public_subnet_cidr: cidr("10.0.64.0/19"),
            private_subnet_cidr: cidr("10.0.32.0/19"),
            node_machine_type: "n1-standard-1".to_string(),
            preemptible: true,
            initial_node_count: 1,
            max_node_count: 1,
            bastion_machine_type: "e2-micro".to_string(),
            bastion_image: "debian-cloud/debian-11".to_string(),
            database_tier: "db-n1-standard-1".to_string(),
            database_version: "MYSQL_8_0".to_string(),
            cache_tier: "STANDARD_HA".to_string(),
            cache_memory_gb: 1,
            cache_version: "REDIS_7_2".to_string(),
            file_share_tier: "BASIC_HDD".to_string(),
            file_share_capacity_gb: 1024,
            file_share_cidr: cidr("10.2.0.0/29"),
            app_name: "moodle".to_string(),
            app_image: "bitnami/moodle:latest".to_string(),
            app_replicas: 2,
            ci_repository: "example/platform".to_string(),
            ci_roles: [
                "roles/container.admin",
                "roles/compute.networkAdmin",
                "roles/storage.admin",
                "roles/iam.serviceAccountUser",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            db_user_secret: "db-user".to_string(),
            db_password_secret: "db-password".to_string(),
        }
    }
}

impl PlatformParams {
    /// Defaults overlaid with `PROVISION_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay(|name| std::env::var(name).ok())
    }

    /// Parameters from a JSON file; absent keys take their default
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Overlay values from a variable lookup (`PROVISION_REGION`, ...)
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |target: &mut String, variable: &str| {
            if let Some(value) = lookup(variable) {
                *target = value;
            }
        };
        text(&mut self.project, "PROVISION_PROJECT");
        text(&mut self.region, "PROVISION_REGION");
        text(&mut self.zone, "PROVISION_ZONE");
        text(&mut self.name, "PROVISION_NAME");
        text(&mut self.control_plane_version, "PROVISION_CONTROL_PLANE_VERSION");
        text(&mut self.release_channel, "PROVISION_RELEASE_CHANNEL");
        text(&mut self.node_machine_type, "PROVISION_NODE_MACHINE_TYPE");
        text(&mut self.bastion_machine_type, "PROVISION_BASTION_MACHINE_TYPE");
        text(&mut self.app_image, "PROVISION_APP_IMAGE");
        text(&mut self.ci_repository, "PROVISION_CI_REPOSITORY");

        parse_into(&lookup, "PROVISION_PREEMPTIBLE", &mut self.preemptible)?;
        parse_into(&lookup, "PROVISION_INITIAL_NODE_COUNT", &mut self.initial_node_count)?;
        parse_into(&lookup, "PROVISION_MAX_NODE_COUNT", &mut self.max_node_count)?;
        parse_into(&lookup, "PROVISION_APP_REPLICAS", &mut self.app_replicas)?;
        parse_into(&lookup, "PROVISION_MASTER_CIDR", &mut self.master_cidr)?;
        Ok(self)
    }

    /// Check names, ranges and sizes; every problem is reported
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        for field in [&self.project, &self.region, &self.zone] {
            if field.trim().is_empty() {
                problems.push("project, region and zone must be set".to_string());
                break;
            }
        }
        if self.release_channel.trim().is_empty() {
            problems.push("release channel must be set".to_string());
        }
        if !self.zone.starts_with(&self.region) {
            problems.push(format!("zone {} is not in region {}", self.zone, self.region));
        }

        // The longest derived names must still be valid labels.
        for suffix in ["bastion-allow-ingress-from-iap", "private-services-range"] {
            if let Err(e) = ResourceName::prefixed(&self.name, suffix) {
                problems.push(format!("platform name {:?}: {e}", self.name));
                break;
            }
        }

        let ranges = [
            ("master", self.master_cidr),
            ("public subnet", self.public_subnet_cidr),
            ("private subnet", self.private_subnet_cidr),
            ("file share", self.file_share_cidr),
        ];
        for (i, (a_name, a)) in ranges.iter().enumerate() {
            for (b_name, b) in &ranges[i + 1..] {
                if a.overlaps(b) {
                    problems.push(format!("{a_name} range {a} overlaps {b_name} range {b}"));
                }
            }
        }
        if self.master_cidr.prefix_length() != 28 {
            problems.push(format!("master range {} must be a /28", self.master_cidr));
        }

        if self.initial_node_count == 0 || self.initial_node_count > self.max_node_count {
            problems.push(format!(
                "node pool sizes must satisfy 1 <= initial ({}) <= max ({})",
                self.initial_node_count, self.max_node_count
            ));
        }
        if self.app_replicas == 0 {
            problems.push("application needs at least one replica".to_string());
        }
        if self.db_user_secret == self.db_password_secret {
            problems.push("database user and password must use different secrets".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

fn parse_into<T, F>(lookup: &F, variable: &str, target: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(variable) {
        *target = value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            variable: variable.to_string(),
            value: value.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

/// Apply-phase configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Maximum number of node operations in flight
    pub concurrency: usize,
    pub poll: PollConfig,
    pub retry: RetryConfig,
    /// Read recorded resources back before planning
    pub refresh: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            poll: PollConfig::default(),
            retry: RetryConfig::default(),
            refresh: false,
        }
    }
}

impl ExecutorConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Overlay `PROVISION_CONCURRENCY` and `PROVISION_REFRESH`
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        parse_into(&lookup, "PROVISION_CONCURRENCY", &mut self.concurrency)?;
        parse_into(&lookup, "PROVISION_REFRESH", &mut self.refresh)?;
        self.concurrency = self.concurrency.max(1);
        Ok(self)
    }
}
