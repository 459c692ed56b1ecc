//! Policy change fanout
//!
//! Any UserCreationConfig change can alter every user's effective policy,
//! so it re-triggers all known Users. The known set comes from the User
//! controller's reflector cache; before the cache has synced nothing is
//! re-triggered, and those Users pick the change up on their next event or
//! the controller's initial listing.

use std::sync::Arc;

use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use tracing::debug;

use user_operator_common::crd::{User, UserCreationConfig};

/// Users to re-reconcile after `config` changed
pub fn users_to_requeue(config: &UserCreationConfig, users: &[Arc<User>]) -> Vec<ObjectRef<User>> {
    if users.is_empty() {
        debug!(policy = %config.name_any(), "policy changed but no users are cached yet");
    } else {
        debug!(policy = %config.name_any(), users = users.len(), "policy changed, requeueing users");
    }
    users.iter().map(|u| ObjectRef::from_obj(u.as_ref())).collect()
}
