//! Rendering and applying policy templates
//!
//! Two phases. [`render_templates`] renders every template up front and
//! fails the whole pass on the first template error, so a broken policy
//! never leaves a half-applied workspace behind. [`apply_rendered`] then
//! decodes and applies each document in order; a document that fails to
//! decode or apply is recorded and the rest still go out.

use std::fmt;

use tracing::{debug, warn};

use user_operator_common::crd::User;
use user_operator_common::manifest::Manifest;
use user_operator_common::template::{TemplateContext, TemplateEngine};
use user_operator_common::Error;

use crate::client::UserKubeClient;

/// Why a single policy resource did not get applied
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceFailure {
    /// Rendered text is not a usable manifest
    Decode(String),
    /// The API server rejected the apply
    Apply {
        /// Manifest kind
        kind: String,
        /// Manifest name
        name: String,
        /// Error reported by the API server
        error: String,
    },
}

impl fmt::Display for ResourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(msg) => write!(f, "decode failed: {}", msg),
            Self::Apply { kind, name, error } => {
                write!(f, "apply of {}/{} failed: {}", kind, name, error)
            }
        }
    }
}

/// Result for one template
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceStatus {
    /// Server-side applied
    Applied {
        /// Manifest kind
        kind: String,
        /// Manifest name
        name: String,
    },
    /// Template rendered to an empty document
    Skipped,
    /// Decode or apply failed
    Failed(ResourceFailure),
}

/// Outcome of one template, by position in the effective policy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceOutcome {
    /// Index into the effective policy's template list
    pub index: usize,
    /// What happened
    pub status: ResourceStatus,
}

/// Per-template results of a provisioning pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Namespace the resources were applied into
    pub namespace: String,
    /// One entry per template, in policy order
    pub resources: Vec<ResourceOutcome>,
}

impl ProvisionReport {
    /// Number of resources applied
    pub fn applied(&self) -> usize {
        self.resources
            .iter()
            .filter(|r| matches!(r.status, ResourceStatus::Applied { .. }))
            .count()
    }

    /// Failed resources with their failure
    pub fn failures(&self) -> impl Iterator<Item = (usize, &ResourceFailure)> {
        self.resources.iter().filter_map(|r| match &r.status {
            ResourceStatus::Failed(f) => Some((r.index, f)),
            _ => None,
        })
    }

    /// Whether any resource failed
    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

/// Render every template for `user`, stopping at the first error
pub fn render_templates(
    engine: &TemplateEngine,
    templates: &[String],
    user: &User,
    namespace: &str,
) -> Result<Vec<String>, Error> {
    let ctx = TemplateContext::for_user(user, namespace);
    templates
        .iter()
        .enumerate()
        .map(|(index, template)| {
            engine
                .render(template, &ctx)
                .map_err(|e| Error::template(&user.spec.username, index, e))
        })
        .collect()
}

/// Decode, stamp and apply each rendered document in order.
///
/// Every manifest is forced into `namespace` and gets exactly one owner
/// reference, to `user`. Only a User without a UID fails the call; per
/// resource failures are logged and recorded in the report.
pub async fn apply_rendered(
    kube: &dyn UserKubeClient,
    user: &User,
    namespace: &str,
    rendered: Vec<String>,
) -> Result<ProvisionReport, Error> {
    let owner = user.owner_reference().ok_or_else(|| {
        Error::internal_with_context("apply", "user has no uid, cannot own resources")
    })?;

    let mut report = ProvisionReport {
        namespace: namespace.to_string(),
        resources: Vec::with_capacity(rendered.len()),
    };

    for (index, text) in rendered.into_iter().enumerate() {
        let status = match Manifest::decode(&text) {
            Ok(None) => {
                debug!(index, "template rendered nothing, skipping");
                ResourceStatus::Skipped
            }
            Ok(Some(mut manifest)) => {
                manifest.set_namespace(namespace);
                manifest.set_owner(&owner)?;
                let kind = manifest.kind().to_string();
                let name = manifest.name().to_string();

                match kube.apply_manifest(manifest).await {
                    Ok(()) => {
                        debug!(index, %kind, %name, "applied resource");
                        ResourceStatus::Applied { kind, name }
                    }
                    Err(e) => {
                        warn!(index, %kind, %name, error = %e, "unable to apply resource");
                        ResourceStatus::Failed(ResourceFailure::Apply {
                            kind,
                            name,
                            error: e.to_string(),
                        })
                    }
                }
            }
            Err(e) => {
                warn!(index, error = %e, "unable to decode rendered resource");
                ResourceStatus::Failed(ResourceFailure::Decode(e.to_string()))
            }
        };
        report.resources.push(ResourceOutcome { index, status });
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::client::MockUserKubeClient;
    use crate::test_support::{active_user, api_error};

    const CONFIGMAP: &str = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: profile-{{ Username }}\ndata:\n  ns: \"{{ Namespace }}\"\n";
    const ROLEBINDING: &str = "apiVersion: rbac.authorization.k8s.io/v1\nkind: RoleBinding\nmetadata:\n  name: admin\n  namespace: kube-system\nroleRef:\n  apiGroup: rbac.authorization.k8s.io\n  kind: ClusterRole\n  name: admin\nsubjects:\n  - kind: User\n    name: \"{{ .Username }}\"\n";

    fn capture_applies(mock: &mut MockUserKubeClient) -> Arc<Mutex<Vec<Manifest>>> {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let sink = applied.clone();
        mock.expect_apply_manifest().returning(move |m| {
            sink.lock().expect("lock").push(m);
            Ok(())
        });
        applied
    }

    #[test]
    fn render_uses_user_identity() {
        let user = active_user("alice");
        let rendered = render_templates(
            &TemplateEngine::new(),
            &[CONFIGMAP.to_string(), ROLEBINDING.to_string()],
            &user,
            "team-alice",
        )
        .expect("templates render");
        assert!(rendered[0].contains("profile-alice"));
        assert!(rendered[0].contains("ns: \"team-alice\""));
        assert!(rendered[1].contains("name: \"alice\""));
    }

    #[test]
    fn first_broken_template_fails_the_render() {
        let user = active_user("alice");
        let err = render_templates(
            &TemplateEngine::new(),
            &[CONFIGMAP.to_string(), "{{ Username ".to_string()],
            &user,
            "team-alice",
        )
        .expect_err("broken template should fail");
        match err {
            Error::Template { index, user, .. } => {
                assert_eq!(index, 1);
                assert_eq!(user, "alice");
            }
            other => panic!("expected template error, got {other:?}"),
        }
    }

    /// Story: every manifest lands in the workspace and is owned by the User
    #[tokio::test]
    async fn story_manifests_are_namespaced_and_owned() {
        let user = active_user("alice");
        let mut mock = MockUserKubeClient::new();
        let applied = capture_applies(&mut mock);

        let rendered = render_templates(
            &TemplateEngine::new(),
            &[CONFIGMAP.to_string(), ROLEBINDING.to_string()],
            &user,
            "team-alice",
        )
        .expect("templates render");
        let report = apply_rendered(&mock, &user, "team-alice", rendered)
            .await
            .expect("apply pass completes");

        assert_eq!(report.applied(), 2);
        assert!(!report.has_failures());

        let applied = applied.lock().expect("lock");
        assert_eq!(applied[0].name(), "profile-alice");
        assert_eq!(applied[1].kind(), "RoleBinding");
        for manifest in applied.iter() {
            assert_eq!(manifest.namespace(), Some("team-alice"));
            let refs = manifest.value()["metadata"]["ownerReferences"]
                .as_array()
                .expect("owner references");
            assert_eq!(refs.len(), 1);
            assert_eq!(refs[0]["kind"], "User");
            assert_eq!(refs[0]["name"], "alice");
            assert_eq!(refs[0]["uid"], "uid-alice");
        }
    }

    /// Story: one bad document does not block the others
    #[tokio::test]
    async fn story_decode_failure_is_isolated() {
        let user = active_user("alice");
        let mut mock = MockUserKubeClient::new();
        let applied = capture_applies(&mut mock);

        let rendered = vec![
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: one\n".to_string(),
            "this is: not: a manifest: [".to_string(),
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: three\n".to_string(),
        ];
        let report = apply_rendered(&mock, &user, "team-alice", rendered)
            .await
            .expect("apply pass completes");

        assert_eq!(report.applied(), 2);
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 1);
        assert!(matches!(failures[0].1, ResourceFailure::Decode(_)));

        let names: Vec<String> = applied
            .lock()
            .expect("lock")
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(names, vec!["one", "three"]);
    }

    #[tokio::test]
    async fn apply_failure_is_recorded_and_loop_continues() {
        let user = active_user("alice");
        let mut mock = MockUserKubeClient::new();
        let mut calls = 0;
        mock.expect_apply_manifest().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(api_error(422, "Invalid").into())
            } else {
                Ok(())
            }
        });

        let rendered = vec![
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: rejected\n".to_string(),
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: accepted\n".to_string(),
        ];
        let report = apply_rendered(&mock, &user, "team-alice", rendered)
            .await
            .expect("apply pass completes");

        assert_eq!(
            report.resources[0].status,
            ResourceStatus::Failed(ResourceFailure::Apply {
                kind: "ConfigMap".to_string(),
                name: "rejected".to_string(),
                error: Error::from(api_error(422, "Invalid")).to_string(),
            })
        );
        assert_eq!(
            report.resources[1].status,
            ResourceStatus::Applied {
                kind: "ConfigMap".to_string(),
                name: "accepted".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn object_after_an_empty_first_document_is_a_failure() {
        let user = active_user("alice");
        let mut mock = MockUserKubeClient::new();
        mock.expect_apply_manifest().never();

        let rendered =
            vec!["---\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n".to_string()];
        let report = apply_rendered(&mock, &user, "team-alice", rendered)
            .await
            .expect("apply pass completes");
        assert!(matches!(
            report.resources[0].status,
            ResourceStatus::Failed(ResourceFailure::Decode(_))
        ));
        assert!(report.has_failures());
    }

    #[tokio::test]
    async fn empty_render_is_skipped() {
        let user = active_user("alice");
        let mut mock = MockUserKubeClient::new();
        mock.expect_apply_manifest().never();

        let report = apply_rendered(&mock, &user, "team-alice", vec!["\n  \n".to_string()])
            .await
            .expect("apply pass completes");
        assert_eq!(report.resources[0].status, ResourceStatus::Skipped);
        assert!(!report.has_failures());
    }

    #[tokio::test]
    async fn user_without_uid_cannot_own_resources() {
        let mut user = active_user("alice");
        user.metadata.uid = None;
        let mut mock = MockUserKubeClient::new();
        mock.expect_apply_manifest().never();

        let rendered = vec!["apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: x\n".to_string()];
        assert!(apply_rendered(&mock, &user, "team-alice", rendered).await.is_err());
    }

    #[test]
    fn failure_display_names_the_resource() {
        let failure = ResourceFailure::Apply {
            kind: "ConfigMap".to_string(),
            name: "profile".to_string(),
            error: "forbidden".to_string(),
        };
        assert_eq!(failure.to_string(), "apply of ConfigMap/profile failed: forbidden");
    }
}
