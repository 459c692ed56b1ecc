//! User operator - per-user namespaces and resources on Kubernetes

use clap::Parser;

use user_operator::config::{Cli, Commands};
use user_operator::controller_runner::build_user_controllers;
use user_operator::startup::{crds_yaml, ensure_crds};
use user_operator_common::kube_utils::create_client;
use user_operator_common::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        println!("{}", crds_yaml()?);
        return Ok(());
    }

    init_telemetry(cli.telemetry_config())?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller(&cli).await,
    }
}

async fn run_controller(cli: &Cli) -> anyhow::Result<()> {
    let client = create_client(cli.kubeconfig.as_deref()).await?;

    if cli.skip_crd_install {
        tracing::info!("Skipping CRD installation");
    } else {
        ensure_crds(&client).await?;
    }

    tracing::info!("Starting user operator controllers:");
    let controllers = build_user_controllers(client, cli.controller_config());
    futures::future::join_all(controllers).await;

    tracing::info!("User operator shutting down");
    Ok(())
}
