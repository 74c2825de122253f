// Copyright (c) 2025 - Cowboy AI, Inc.
//! CI identity layer: keyless federation for the CI pipeline
//!
//! A workload identity pool trusts the CI system's OIDC issuer, restricted
//! to one repository. Tokens from that repository may impersonate a
//! dedicated service account holding the deployment roles.

use serde_json::json;

use crate::config::PlatformParams;
use crate::domain::{ResourceKind, ResourceSpec};
use crate::graph::{GraphBuilder, GraphError};
use crate::output::{combine2, Output};

use super::resource_name;

pub const LAYER: &str = "ci-identity";

pub const OIDC_ISSUER: &str = "https://token.actions.githubusercontent.com";
const IMPERSONATION_ROLE: &str = "roles/iam.workloadIdentityUser";

#[derive(Debug, Clone)]
pub struct CiIdentityOutputs {
    pub workload_pool_id: Output<String>,
    pub oidc_provider_id: Output<String>,
    pub ci_service_account_email: Output<String>,
}

pub fn declare_ci_identity(
    builder: &mut GraphBuilder,
    params: &PlatformParams,
) -> Result<CiIdentityOutputs, GraphError> {
    builder.enter_layer(LAYER);
    let repository = params.ci_repository.clone();

    let pool = builder.declare(
        &resource_name(params, "ci-pool"),
        ResourceSpec::builder(ResourceKind::WorkloadIdentityPool)
            .set("project", params.project.as_str())
            .set("location", "global")
            .set("display_name", "CI pipeline pool")
            .build()?,
    )?;

    let provider = builder.declare(
        &resource_name(params, "ci-oidc"),
        ResourceSpec::builder(ResourceKind::WorkloadIdentityPoolProvider)
            .set("project", params.project.as_str())
            .set("location", "global")
            .set(
                "workload_identity_pool_id",
                &pool.output::<String>("workload_identity_pool_id"),
            )
            .set("display_name", "CI OIDC provider")
            .set("issuer_uri", OIDC_ISSUER)
            .set(
                "attribute_mapping",
                json!({
                    "google.subject": "assertion.sub",
                    "attribute.repository": "assertion.repository",
                    "attribute.actor": "assertion.actor",
                    "attribute.aud": "assertion.aud",
                }),
            )
            .set(
                "attribute_condition",
                format!("assertion.repository == '{repository}'"),
            )
            .build()?,
    )?;

    let account = builder.declare(
        &resource_name(params, "ci"),
        ResourceSpec::builder(ResourceKind::ServiceAccount)
            .set("account_id", resource_name(params, "ci"))
            .set("display_name", "CI deployer")
            .set("project", params.project.as_str())
            .build()?,
    )?;
    let email: Output<String> = account.output("email");
    let member = email.map(|email| format!("serviceAccount:{email}"));

    for role in &params.ci_roles {
        builder.declare(
            &resource_name(params, &format!("ci-{}", role_slug(role))),
            ResourceSpec::builder(ResourceKind::IamMember)
                .set("project", params.project.as_str())
                .set("role", role.as_str())
                .set("member", &member)
                .build()?,
        )?;
    }

    // Waits for the provider as well as the pool.
    let principal = combine2(&pool.id(), &provider.id(), move |pool, _provider: String| {
        format!("principalSet://iam.googleapis.com/{pool}/attribute.repository/{repository}")
    });
    builder.declare(
        &resource_name(params, "ci-wif-binding"),
        ResourceSpec::builder(ResourceKind::IamMember)
            .set("project", params.project.as_str())
            .set("role", IMPERSONATION_ROLE)
            .set("member", principal)
            .build()?,
    )?;

    Ok(CiIdentityOutputs {
        workload_pool_id: pool.output("workload_identity_pool_id"),
        oidc_provider_id: provider.output("workload_identity_pool_provider_id"),
        ci_service_account_email: email,
    })
}

/// Resource-name fragment for a role, e.g. `roles/storage.admin` -> `storage-admin`
pub fn role_slug(role: &str) -> String {
    role.trim_start_matches("roles/")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case("roles/container.admin", "container-admin")]
    #[test_case("roles/compute.networkAdmin", "compute-networkadmin")]
    #[test_case("roles/iam.serviceAccountUser", "iam-serviceaccountuser")]
    fn test_role_slug(role: &str, expected: &str) {
        assert_eq!(role_slug(role), expected);
    }

    #[test]
    fn test_one_member_per_role_plus_binding() {
        let params = PlatformParams::default();
        let mut builder = GraphBuilder::new();
        declare_ci_identity(&mut builder, &params).unwrap();
        let graph = builder.freeze().unwrap();

        let members = graph
            .nodes_in_layer(LAYER)
            .into_iter()
            .filter(|n| n.key().kind() == ResourceKind::IamMember)
            .count();
        assert_eq!(members, params.ci_roles.len() + 1);
        assert_eq!(graph.len(), params.ci_roles.len() + 4);
    }
}
