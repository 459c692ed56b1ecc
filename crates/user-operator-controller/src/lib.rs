//! User controller: provisions a namespace and policy-defined resources for
//! every User, and tears them down when the User is deleted.
//!
//! - [`policy`]: folds enabled UserCreationConfigs into one effective policy
//! - [`lifecycle`]: classifies a User into its lifecycle state
//! - [`namespace`]: ensures and tears down the workspace namespace
//! - [`apply`]: renders policy templates and server-side applies them
//! - [`fanout`]: maps policy changes to User re-reconciles
//! - [`controller`]: reconcile entry points and shared context

#![deny(missing_docs)]

pub mod apply;
pub mod client;
pub mod controller;
pub mod fanout;
pub mod lifecycle;
pub mod namespace;
pub mod policy;

pub use client::{UserKubeClient, UserKubeClientImpl};
pub use controller::{
    error_policy, reconcile, reconcile_user, Context, ControllerConfig, ReconcileOutcome,
    SkipReason,
};
pub use fanout::users_to_requeue;

#[cfg(test)]
pub(crate) mod test_support {
    use k8s_openapi::api::core::v1::Namespace;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use k8s_openapi::chrono::{TimeZone, Utc};
    use kube::core::ErrorResponse;

    use user_operator_common::crd::{User, UserCreationConfig, UserCreationConfigSpec, UserSpec};
    use user_operator_common::USER_FINALIZER;

    pub fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} ({})", reason, code),
            reason: reason.to_string(),
            code,
        })
    }

    pub fn namespace(name: &str) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// A ready User that already carries the finalizer
    pub fn active_user(name: &str) -> User {
        User {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                uid: Some(format!("uid-{}", name)),
                resource_version: Some("1".to_string()),
                finalizers: Some(vec![USER_FINALIZER.to_string()]),
                ..Default::default()
            },
            spec: UserSpec {
                username: name.to_string(),
                uid: "1001".to_string(),
                groups: vec!["students".to_string()],
                ..Default::default()
            },
        }
    }

    pub fn policy(name: &str, minute: u32, prefix: &str, resources: &[&str]) -> UserCreationConfig {
        UserCreationConfig {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                creation_timestamp: Some(Time(
                    Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0)
                        .single()
                        .expect("valid timestamp"),
                )),
                ..Default::default()
            },
            spec: UserCreationConfigSpec {
                enabled: true,
                namespace_prefix: prefix.to_string(),
                resources: resources.iter().map(|r| r.to_string()).collect(),
            },
        }
    }
}
