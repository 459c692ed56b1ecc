//! CRD installation on startup
//!
//! The operator installs its own CRDs with server-side apply so the stored
//! schema always matches the running binary. The API server may still be
//! coming up when the pod starts, so each CRD is retried with a jittered
//! exponential backoff before startup gives up.

use std::future::Future;
use std::time::Duration;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};
use rand::Rng;
use tracing::{error, info, warn};

use user_operator_common::crd::{User, UserCreationConfig};
use user_operator_common::{Error, FIELD_MANAGER};

/// CRD definition with name and resource
pub struct CrdDef {
    /// `<plural>.<group>`
    pub name: &'static str,
    /// Generated definition
    pub crd: CustomResourceDefinition,
}

/// Every CRD the operator owns
pub fn crd_definitions() -> Vec<CrdDef> {
    vec![
        CrdDef {
            name: "users.user-operator.lcpu.dev",
            crd: User::crd(),
        },
        CrdDef {
            name: "usercreationconfigs.user-operator.lcpu.dev",
            crd: UserCreationConfig::crd(),
        },
    ]
}

/// All CRDs as one multi-document YAML stream
pub fn crds_yaml() -> anyhow::Result<String> {
    let docs = crd_definitions()
        .iter()
        .map(|def| {
            serde_yaml::to_string(&def.crd)
                .map_err(|e| anyhow::anyhow!("failed to serialize {} CRD: {}", def.name, e))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(docs.join("---\n"))
}

/// Retry schedule for a single CRD apply
#[derive(Clone, Debug)]
struct InstallBackoff {
    /// Attempts per CRD, including the first
    attempts: u32,
    /// Delay after the first failure
    initial_delay: Duration,
    /// Cap on the doubled delay
    max_delay: Duration,
}

impl Default for InstallBackoff {
    fn default() -> Self {
        Self {
            attempts: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl InstallBackoff {
    /// Un-jittered delay after failed attempt number `attempt` (1-based)
    fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay after failed attempt `attempt`, jittered to 0.5x..1.5x
    fn delay(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        self.base_delay(attempt).mul_f64(jitter)
    }
}

/// Run `apply` for one CRD until it succeeds, fails with a non-retryable
/// error, or the attempts are used up.
async fn apply_with_backoff<F, Fut>(
    crd: &str,
    backoff: &InstallBackoff,
    mut apply: F,
) -> Result<(), Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), Error>>,
{
    let mut attempt = 1;
    loop {
        match apply().await {
            Ok(()) => {
                info!(crd, attempt, "CRD installed/updated");
                return Ok(());
            }
            Err(e) if e.is_retryable() && attempt < backoff.attempts => {
                let delay = backoff.delay(attempt);
                warn!(
                    crd,
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "CRD install failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!(crd, attempt, error = %e, "CRD install failed");
                return Err(e);
            }
        }
    }
}

async fn install_crds(client: &Client, backoff: &InstallBackoff) -> Result<(), Error> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for def in crd_definitions() {
        let (crds, params, def) = (&crds, &params, &def);
        apply_with_backoff(def.name, backoff, move || async move {
            crds.patch(def.name, params, &Patch::Apply(&def.crd))
                .await
                .map(|_| ())
                .map_err(Error::from)
        })
        .await?;
    }

    Ok(())
}

/// Install or update the CRDs, retrying while the API server is unreachable
pub async fn ensure_crds(client: &Client) -> anyhow::Result<()> {
    install_crds(client, &InstallBackoff::default())
        .await
        .map_err(|e| anyhow::anyhow!("failed to install CRDs: {}", e))
}
