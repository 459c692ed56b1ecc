//! Kubernetes Event recording for the user controller.
//!
//! Events land on the User object so `kubectl describe user alice` shows what
//! the operator did for that user. Publishing is fire-and-forget: failures
//! are logged and never fail a reconcile.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Publishes Kubernetes Events about an object
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event on `resource_ref`.
    ///
    /// * `reason` - machine-readable reason, see [`reasons`]
    /// * `action` - what the controller was doing, see [`actions`]
    /// * `note` - optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Publisher that drops every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons, shown in the REASON column of `kubectl get events`
pub mod reasons {
    /// Finalizer added, the User is now tracked
    pub const FINALIZER_ADDED: &str = "FinalizerAdded";
    /// Workspace namespace created
    pub const NAMESPACE_CREATED: &str = "NamespaceCreated";
    /// One policy resource could not be decoded or applied
    pub const RESOURCE_FAILED: &str = "ResourceFailed";
    /// A policy template does not parse or render
    pub const TEMPLATE_INVALID: &str = "TemplateInvalid";
    /// Workspace namespace deleted
    pub const NAMESPACE_DELETED: &str = "NamespaceDeleted";
}

/// Event actions, shown in the ACTION column of `kubectl get events`
pub mod actions {
    /// Provisioning the workspace
    pub const PROVISION: &str = "Provision";
    /// Tearing the workspace down
    pub const TEARDOWN: &str = "Teardown";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_publisher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
        assert_send_sync::<KubeEventPublisher>();
    }

    #[test]
    fn reasons_are_pascal_case() {
        for reason in [
            reasons::FINALIZER_ADDED,
            reasons::NAMESPACE_CREATED,
            reasons::RESOURCE_FAILED,
            reasons::TEMPLATE_INVALID,
            reasons::NAMESPACE_DELETED,
        ] {
            assert!(reason.starts_with(|c: char| c.is_ascii_uppercase()));
            assert!(!reason.contains(['-', '_', ' ']));
        }
    }

    #[tokio::test]
    async fn noop_publisher_does_not_panic() {
        NoopEventPublisher
            .publish(
                &ObjectReference::default(),
                EventType::Warning,
                reasons::TEMPLATE_INVALID,
                actions::PROVISION,
                Some("resource 0 does not parse".to_string()),
            )
            .await;
    }
}
