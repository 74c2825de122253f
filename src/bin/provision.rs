// Copyright (c) 2025 - Cowboy AI, Inc.
//! Platform Provisioner
//!
//! Plans, applies or destroys the platform graph against the simulated
//! provider, recording state in a JSON file.
//!
//! Run with: cargo run --bin provision -- <plan|apply|destroy>
//!
//! Configuration comes from environment variables:
//! - `PROVISION_CONFIG`: optional JSON file of platform parameters
//! - `PROVISION_*`: parameter overrides (`PROVISION_REGION`, `PROVISION_NAME`, ...)
//! - `PROVISION_STATE`: state file (default `provision-state.json`)
//! - `PROVISION_CONCURRENCY`, `PROVISION_REFRESH`: executor settings
//! - `PROVISION_SECRET_DB_USER`, `PROVISION_SECRET_DB_PASSWORD`: database credentials
//!
//! The simulated provider keeps no state between invocations; set
//! `PROVISION_REFRESH=true` to let a later run notice that recorded
//! resources are gone.

use anyhow::{bail, Context, Result};
use cim_provisioning::{
    build_platform, EnvSecrets, Executor, ExecutorConfig, FileStateStore, PlatformParams,
    ProvisionError, RoutingProvider, SimulatedProvider,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
enum Command {
    Plan,
    Apply,
    Destroy,
}

impl Command {
    fn parse(arg: Option<&str>) -> Result<Self> {
        match arg {
            Some("plan") | None => Ok(Self::Plan),
            Some("apply") => Ok(Self::Apply),
            Some("destroy") => Ok(Self::Destroy),
            Some(other) => bail!("unknown command {other:?}; expected plan, apply or destroy"),
        }
    }
}

fn load_params() -> Result<PlatformParams> {
    let base = match std::env::var("PROVISION_CONFIG") {
        Ok(path) => PlatformParams::from_json_file(&path)
            .with_context(|| format!("Failed to read platform parameters from {path}"))?,
        Err(_) => PlatformParams::default(),
    };
    let params = base.overlay(|name| std::env::var(name).ok())?;
    params.validate().context("Invalid platform parameters")?;
    Ok(params)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = Command::parse(args.get(1).map(String::as_str))?;

    let params = load_params()?;
    let config = ExecutorConfig::default().overlay(|name| std::env::var(name).ok())?;
    let state_path =
        std::env::var("PROVISION_STATE").unwrap_or_else(|_| "provision-state.json".to_string());
    info!(
        platform = %params.name,
        project = %params.project,
        region = %params.region,
        state = %state_path,
        concurrency = config.concurrency,
        "Loaded configuration"
    );

    let graph = build_platform(&params).context("Failed to declare platform")?;

    let cloud = SimulatedProvider::new("simulated-cloud").with_project(params.project.clone());
    let workload = SimulatedProvider::new("simulated-workload").with_project(params.project.clone());
    let provider = Arc::new(RoutingProvider::new(Arc::new(cloud), Arc::new(workload)));
    let executor = Executor::new(
        provider,
        Arc::new(FileStateStore::new(&state_path)),
        Arc::new(EnvSecrets::new()),
        config,
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current layer");
            on_signal.cancel();
        }
    });

    let report = match command {
        Command::Plan => {
            let plan = executor.plan(&graph).await?;
            for change in plan.changes.iter().filter(|c| c.action.is_mutation()) {
                println!("{:>16}  {}", change.action.label(), change.key);
            }
            println!("{}", plan.summary());
            return Ok(());
        }
        Command::Apply => executor.apply(&graph, &cancel).await,
        Command::Destroy => executor.destroy(&cancel).await,
    };

    let report = match report {
        Ok(report) => report,
        Err(ProvisionError::SecretMissing(name)) => {
            bail!("Secret {name} is not set; export it as {}", EnvSecrets::new().variable_for(&name))
        }
        Err(e) => return Err(e.into()),
    };

    println!("{report}");
    if !report.exports.is_empty() {
        println!(
            "{}",
            serde_json::to_string_pretty(&report.exports.to_json())
                .context("Failed to render exports")?
        );
    }
    if !report.is_success() {
        bail!("{} resources did not converge", report.nodes.len() - success_count(&report));
    }
    Ok(())
}

fn success_count(report: &cim_provisioning::RunReport) -> usize {
    report.nodes.values().filter(|n| n.outcome.is_success()).count()
}
