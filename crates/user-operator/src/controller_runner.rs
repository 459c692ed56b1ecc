//! Builds the User controller future
//!
//! Users are the primary watch. UserCreationConfig changes fan out to every
//! cached User through the controller's own reflector store.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use user_operator_common::crd::{User, UserCreationConfig};
use user_operator_controller::{
    error_policy, reconcile, users_to_requeue, Context, ControllerConfig,
};

/// Watcher timeout (seconds), kept below the client read timeout (30s) so
/// the API server closes idle watches before the client gives up on them.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the User controller futures
pub fn build_user_controllers(
    client: Client,
    config: ControllerConfig,
) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
    let ctx = Arc::new(Context::new(client.clone(), config));
    let users: Api<User> = Api::all(client.clone());
    let policies: Api<UserCreationConfig> = Api::all(client);

    let controller = Controller::new(users, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS));
    let store = controller.store();

    tracing::info!("- User controller");

    vec![Box::pin(
        controller
            .watches(
                policies,
                WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
                move |policy| users_to_requeue(&policy, &store.state()),
            )
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("User")),
    )]
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
