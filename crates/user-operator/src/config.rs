//! Command line configuration

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use user_operator_common::telemetry::TelemetryConfig;
use user_operator_controller::ControllerConfig;

/// Provisions a namespace and policy-defined resources for every User
#[derive(Parser, Debug)]
#[command(name = "user-operator", version, about, long_about = None)]
pub struct Cli {
    /// Print the CRD manifests and exit
    #[arg(long)]
    pub crd: bool,

    /// Path to a kubeconfig; defaults to KUBECONFIG or the in-cluster config
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Seconds before retrying a reconcile that failed with a retryable error
    #[arg(long, default_value_t = 30, global = true)]
    pub error_requeue_secs: u64,

    /// Seconds before re-running a reconcile where some resources failed
    #[arg(long, default_value_t = 60, global = true)]
    pub partial_failure_requeue_secs: u64,

    /// Do not install or update the CRDs on startup
    #[arg(long, global = true)]
    pub skip_crd_install: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json, env = "USER_OPERATOR_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// What to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the User controller (default)
    Controller,
}

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human-readable text
    Text,
}

impl Cli {
    /// Requeue timing for the controller
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            error_requeue: Duration::from_secs(self.error_requeue_secs),
            partial_failure_requeue: Duration::from_secs(self.partial_failure_requeue_secs),
        }
    }

    /// Logging setup
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            json: self.log_format == LogFormat::Json,
            ..Default::default()
        }
    }
}
