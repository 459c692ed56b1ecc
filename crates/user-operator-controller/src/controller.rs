//! User controller: reconcile entry points and shared context

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{error, info, instrument, warn};

use user_operator_common::crd::User;
use user_operator_common::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use user_operator_common::template::TemplateEngine;
use user_operator_common::{Error, CONTROLLER_NAME, USER_FINALIZER};

use crate::apply::{apply_rendered, render_templates, ProvisionReport};
use crate::client::{UserKubeClient, UserKubeClientImpl};
use crate::lifecycle::LifecycleState;
use crate::namespace::{ensure_namespace, teardown_namespace, NamespaceOutcome, TeardownOutcome};
use crate::policy::EffectivePolicy;

/// Requeue timing for the user controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Delay before retrying a pass that failed with a retryable error
    pub error_requeue: Duration,
    /// Delay before re-running a pass where some resources failed to apply
    pub partial_failure_requeue: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            error_requeue: Duration::from_secs(30),
            partial_failure_requeue: Duration::from_secs(60),
        }
    }
}

/// Controller context shared by every reconcile
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn UserKubeClient>,
    /// Event publisher for the User objects
    pub events: Arc<dyn EventPublisher>,
    /// Template engine for policy resources
    pub engine: TemplateEngine,
    /// Requeue timing
    pub config: ControllerConfig,
}

impl Context {
    /// Create a context backed by a real cluster
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        Self {
            kube: Arc::new(UserKubeClientImpl::new(client.clone())),
            events: Arc::new(KubeEventPublisher::new(client, CONTROLLER_NAME)),
            engine: TemplateEngine::new(),
            config,
        }
    }

    /// Create a context for testing with a mock client
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn UserKubeClient>) -> Self {
        Self {
            kube,
            events: Arc::new(user_operator_common::events::NoopEventPublisher),
            engine: TemplateEngine::new(),
            config: ControllerConfig::default(),
        }
    }
}

/// Why a pass did nothing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The User no longer exists
    NotFound,
    /// The User has no username yet
    NotReady,
    /// Deletion requested on a User with no username while the finalizer is
    /// held; the namespace cannot be derived, so the User stays until the
    /// username is restored or the finalizer is removed by hand
    DeletionBlocked,
    /// Deletion in progress and our finalizer is already gone
    AlreadyFinalized,
}

/// What one reconcile pass did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing to do; a later change will trigger the next pass
    Skipped(SkipReason),
    /// Finalizer persisted; the resulting update triggers provisioning
    FinalizerAdded,
    /// Workspace provisioned, possibly with per-resource failures
    Provisioned(ProvisionReport),
    /// Workspace torn down and finalizer removed
    Finalized {
        /// Namespace that was torn down
        namespace: String,
        /// Whether a deletion was issued
        teardown: TeardownOutcome,
    },
}

impl ReconcileOutcome {
    /// Next scheduling decision for this outcome
    pub fn action(&self, config: &ControllerConfig) -> Action {
        match self {
            Self::Provisioned(report) if report.has_failures() => {
                Action::requeue(config.partial_failure_requeue)
            }
            _ => Action::await_change(),
        }
    }
}

/// Reconcile one User by name.
///
/// Reads the User and the current policy set, then advances the User one
/// lifecycle step. Every step is idempotent, so a pass cut short by an error
/// or a restart is simply run again.
pub async fn reconcile_user(name: &str, ctx: &Context) -> Result<ReconcileOutcome, Error> {
    let Some(user) = ctx.kube.get_user(name).await? else {
        info!("user not found, nothing to do");
        return Ok(ReconcileOutcome::Skipped(SkipReason::NotFound));
    };

    let state = LifecycleState::observe(&user);
    info!(%state, "reconciling user");

    match state {
        LifecycleState::Unready if user.is_deleting() && user.has_finalizer() => {
            warn!(
                finalizer = USER_FINALIZER,
                "user is being deleted without a username, cannot tear down its namespace; \
                 restore the username or remove the finalizer by hand"
            );
            Ok(ReconcileOutcome::Skipped(SkipReason::DeletionBlocked))
        }
        LifecycleState::Unready => {
            info!("user is not ready, waiting for a username");
            Ok(ReconcileOutcome::Skipped(SkipReason::NotReady))
        }
        LifecycleState::Gone => Ok(ReconcileOutcome::Skipped(SkipReason::AlreadyFinalized)),
        LifecycleState::PendingFinalizer => {
            ctx.kube.add_user_finalizer(&user, USER_FINALIZER).await?;
            info!("added finalizer");
            publish(ctx, &user, EventType::Normal, reasons::FINALIZER_ADDED, actions::PROVISION, None)
                .await;
            Ok(ReconcileOutcome::FinalizerAdded)
        }
        LifecycleState::Terminating => finalize(&user, ctx).await,
        LifecycleState::Active => provision(&user, ctx).await,
    }
}

async fn effective_policy(ctx: &Context) -> Result<EffectivePolicy, Error> {
    let configs = ctx.kube.list_user_creation_configs().await?;
    Ok(EffectivePolicy::aggregate(&configs))
}

async fn provision(user: &User, ctx: &Context) -> Result<ReconcileOutcome, Error> {
    let policy = effective_policy(ctx).await?;
    let namespace = policy.namespace_for(&user.spec.username);

    if ensure_namespace(ctx.kube.as_ref(), &namespace).await? == NamespaceOutcome::Created {
        publish(
            ctx,
            user,
            EventType::Normal,
            reasons::NAMESPACE_CREATED,
            actions::PROVISION,
            Some(format!("created namespace {}", namespace)),
        )
        .await;
    }

    let rendered = match render_templates(&ctx.engine, &policy.resource_templates, user, &namespace)
    {
        Ok(rendered) => rendered,
        Err(e) => {
            publish(
                ctx,
                user,
                EventType::Warning,
                reasons::TEMPLATE_INVALID,
                actions::PROVISION,
                Some(e.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    let report = apply_rendered(ctx.kube.as_ref(), user, &namespace, rendered).await?;
    for (index, failure) in report.failures() {
        publish(
            ctx,
            user,
            EventType::Warning,
            reasons::RESOURCE_FAILED,
            actions::PROVISION,
            Some(format!("resource {}: {}", index, failure)),
        )
        .await;
    }

    info!(
        namespace = %namespace,
        applied = report.applied(),
        total = report.resources.len(),
        "provisioned workspace"
    );
    Ok(ReconcileOutcome::Provisioned(report))
}

/// Tear the workspace down, then release the User.
///
/// The finalizer is removed only after the namespace deletion was accepted;
/// if teardown fails the finalizer stays and the pass is retried.
async fn finalize(user: &User, ctx: &Context) -> Result<ReconcileOutcome, Error> {
    let policy = effective_policy(ctx).await?;
    let namespace = policy.namespace_for(&user.spec.username);

    let teardown = teardown_namespace(ctx.kube.as_ref(), &namespace).await?;
    if teardown == TeardownOutcome::Deleted {
        publish(
            ctx,
            user,
            EventType::Normal,
            reasons::NAMESPACE_DELETED,
            actions::TEARDOWN,
            Some(format!("deleted namespace {}", namespace)),
        )
        .await;
    }

    ctx.kube.remove_user_finalizer(user, USER_FINALIZER).await?;
    info!(namespace = %namespace, "removed finalizer");

    Ok(ReconcileOutcome::Finalized {
        namespace,
        teardown,
    })
}

async fn publish(
    ctx: &Context,
    user: &User,
    type_: EventType,
    reason: &str,
    action: &str,
    note: Option<String>,
) {
    ctx.events
        .publish(&user.object_ref(&()), type_, reason, action, note)
        .await;
}

/// Reconcile a User for the kube-runtime controller
#[instrument(skip(user, ctx), fields(user = %user.name_any()))]
pub async fn reconcile(user: Arc<User>, ctx: Arc<Context>) -> Result<Action, Error> {
    let outcome = reconcile_user(&user.name_any(), &ctx).await?;
    if let ReconcileOutcome::Provisioned(report) = &outcome {
        if report.has_failures() {
            warn!(
                failed = report.failures().count(),
                "some resources failed, requeueing"
            );
        }
    }
    Ok(outcome.action(&ctx.config))
}

/// Error policy for the User controller
///
/// Retryable errors are requeued after the configured delay; anything else
/// (a broken template) waits for the next change.
pub fn error_policy(user: Arc<User>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        user = %user.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(ctx.config.error_requeue)
    } else {
        Action::await_change()
    }
}
