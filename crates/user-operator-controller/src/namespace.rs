//! Workspace namespace management
//!
//! Namespaces are found by name only; they carry no owner reference, so the
//! controller deletes them explicitly during teardown.

use tracing::{debug, info};

use user_operator_common::Error;

use crate::client::UserKubeClient;

/// What [`ensure_namespace`] had to do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamespaceOutcome {
    /// Namespace was already there
    Existing,
    /// Namespace was created by this call
    Created,
}

/// What [`teardown_namespace`] had to do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// Deletion was issued
    Deleted,
    /// Nothing to delete
    AlreadyGone,
}

/// Make sure namespace `name` exists, creating it if needed.
///
/// Losing a creation race to another writer counts as existing.
pub async fn ensure_namespace(
    kube: &dyn UserKubeClient,
    name: &str,
) -> Result<NamespaceOutcome, Error> {
    if kube.get_namespace(name).await?.is_some() {
        debug!(namespace = %name, "namespace exists");
        return Ok(NamespaceOutcome::Existing);
    }

    match kube.create_namespace(name).await {
        Ok(()) => {
            info!(namespace = %name, "created namespace");
            Ok(NamespaceOutcome::Created)
        }
        Err(e) if e.is_already_exists() => {
            debug!(namespace = %name, "namespace created concurrently");
            Ok(NamespaceOutcome::Existing)
        }
        Err(e) => Err(e),
    }
}

/// Delete namespace `name` if it exists.
///
/// Returns once deletion is accepted; the namespace may still be
/// terminating. Not-found at any step is success.
pub async fn teardown_namespace(
    kube: &dyn UserKubeClient,
    name: &str,
) -> Result<TeardownOutcome, Error> {
    if kube.get_namespace(name).await?.is_none() {
        debug!(namespace = %name, "namespace already gone");
        return Ok(TeardownOutcome::AlreadyGone);
    }

    match kube.delete_namespace(name).await {
        Ok(()) => {
            info!(namespace = %name, "deleted namespace");
            Ok(TeardownOutcome::Deleted)
        }
        Err(e) if e.is_not_found() => Ok(TeardownOutcome::AlreadyGone),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockUserKubeClient;
    use crate::test_support::{api_error, namespace};

    #[tokio::test]
    async fn existing_namespace_is_left_alone() {
        let mut mock = MockUserKubeClient::new();
        mock.expect_get_namespace()
            .returning(|name| Ok(Some(namespace(name))));
        mock.expect_create_namespace().never();

        let outcome = ensure_namespace(&mock, "team-alice").await.expect("ensure ok");
        assert_eq!(outcome, NamespaceOutcome::Existing);
    }

    #[tokio::test]
    async fn missing_namespace_is_created_with_exact_name() {
        let mut mock = MockUserKubeClient::new();
        mock.expect_get_namespace().returning(|_| Ok(None));
        mock.expect_create_namespace()
            .withf(|name| name == "team-alice")
            .times(1)
            .returning(|_| Ok(()));

        let outcome = ensure_namespace(&mock, "team-alice").await.expect("ensure ok");
        assert_eq!(outcome, NamespaceOutcome::Created);
    }

    #[tokio::test]
    async fn creation_race_counts_as_existing() {
        let mut mock = MockUserKubeClient::new();
        mock.expect_get_namespace().returning(|_| Ok(None));
        mock.expect_create_namespace()
            .returning(|_| Err(api_error(409, "AlreadyExists").into()));

        let outcome = ensure_namespace(&mock, "team-alice").await.expect("ensure ok");
        assert_eq!(outcome, NamespaceOutcome::Existing);
    }

    #[tokio::test]
    async fn lookup_failure_surfaces() {
        let mut mock = MockUserKubeClient::new();
        mock.expect_get_namespace()
            .returning(|_| Err(api_error(503, "ServiceUnavailable").into()));
        mock.expect_create_namespace().never();

        let err = ensure_namespace(&mock, "team-alice")
            .await
            .expect_err("lookup failure should surface");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn teardown_deletes_existing_namespace() {
        let mut mock = MockUserKubeClient::new();
        mock.expect_get_namespace()
            .returning(|name| Ok(Some(namespace(name))));
        mock.expect_delete_namespace()
            .withf(|name| name == "team-alice")
            .times(1)
            .returning(|_| Ok(()));

        let outcome = teardown_namespace(&mock, "team-alice").await.expect("teardown ok");
        assert_eq!(outcome, TeardownOutcome::Deleted);
    }

    #[tokio::test]
    async fn teardown_of_missing_namespace_is_success() {
        let mut mock = MockUserKubeClient::new();
        mock.expect_get_namespace().returning(|_| Ok(None));
        mock.expect_delete_namespace().never();

        let outcome = teardown_namespace(&mock, "team-alice").await.expect("teardown ok");
        assert_eq!(outcome, TeardownOutcome::AlreadyGone);
    }

    #[tokio::test]
    async fn namespace_vanishing_before_delete_is_success() {
        let mut mock = MockUserKubeClient::new();
        mock.expect_get_namespace()
            .returning(|name| Ok(Some(namespace(name))));
        mock.expect_delete_namespace()
            .returning(|_| Err(api_error(404, "NotFound").into()));

        let outcome = teardown_namespace(&mock, "team-alice").await.expect("teardown ok");
        assert_eq!(outcome, TeardownOutcome::AlreadyGone);
    }

    #[tokio::test]
    async fn delete_failure_surfaces() {
        let mut mock = MockUserKubeClient::new();
        mock.expect_get_namespace()
            .returning(|name| Ok(Some(namespace(name))));
        mock.expect_delete_namespace()
            .returning(|_| Err(api_error(500, "InternalError").into()));

        assert!(teardown_namespace(&mock, "team-alice").await.is_err());
    }
}
