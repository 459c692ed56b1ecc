//! Kubernetes access for the user controller
//!
//! Everything the reconciler needs from the API server goes through
//! [`UserKubeClient`] so the reconcile logic can be exercised against mocks.
//! Not-found and already-exists handling is left to callers; the real
//! implementation only maps a missing object on reads to `None`.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{
    Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
};
use kube::discovery::{ApiCapabilities, ApiResource, Discovery, Scope};
use kube::{Client, ResourceExt};
use tokio::sync::RwLock;
use tracing::{debug, trace};

#[cfg(test)]
use mockall::automock;

use user_operator_common::crd::{User, UserCreationConfig};
use user_operator_common::manifest::Manifest;
use user_operator_common::{Error, FIELD_MANAGER};

/// API operations used by the user controller
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserKubeClient: Send + Sync {
    /// List every UserCreationConfig in the cluster
    async fn list_user_creation_configs(&self) -> Result<Vec<UserCreationConfig>, Error>;

    /// Get a User by name, `None` if it does not exist
    async fn get_user(&self, name: &str) -> Result<Option<User>, Error>;

    /// Add `finalizer` to the observed User.
    ///
    /// The write is conditional on the User's resourceVersion, so a stale
    /// observation fails with a conflict instead of overwriting newer edits.
    async fn add_user_finalizer(&self, user: &User, finalizer: &str) -> Result<(), Error>;

    /// Remove `finalizer` from the observed User (conditional like add)
    async fn remove_user_finalizer(&self, user: &User, finalizer: &str) -> Result<(), Error>;

    /// Get a Namespace by name, `None` if it does not exist
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, Error>;

    /// Create a Namespace carrying only a name
    async fn create_namespace(&self, name: &str) -> Result<(), Error>;

    /// Delete a Namespace by name
    async fn delete_namespace(&self, name: &str) -> Result<(), Error>;

    /// Server-side apply a manifest with forced ownership
    async fn apply_manifest(&self, manifest: Manifest) -> Result<(), Error>;
}

/// Real implementation backed by a kube client
pub struct UserKubeClientImpl {
    client: Client,
    discovery: RwLock<Option<Discovery>>,
}

impl UserKubeClientImpl {
    /// Create a new client wrapper
    pub fn new(client: Client) -> Self {
        Self {
            client,
            discovery: RwLock::new(None),
        }
    }

    /// Resolve a manifest's kind to an API resource.
    ///
    /// Discovery results are cached; an unknown kind triggers one fresh
    /// discovery run since the CRD may have been installed after the cache
    /// was filled.
    async fn resolve(&self, manifest: &Manifest) -> Result<(ApiResource, ApiCapabilities), Error> {
        let gvk = manifest.gvk();
        if let Some(found) = self
            .discovery
            .read()
            .await
            .as_ref()
            .and_then(|d| d.resolve_gvk(&gvk))
        {
            return Ok(found);
        }

        debug!(api_version = %manifest.api_version(), kind = %manifest.kind(), "running API discovery");
        let discovery = Discovery::new(self.client.clone()).run().await?;
        let found = discovery.resolve_gvk(&gvk);
        *self.discovery.write().await = Some(discovery);

        found.ok_or_else(|| {
            Error::internal_with_context(
                "discovery",
                format!(
                    "unknown resource type {}/{}",
                    manifest.api_version(),
                    manifest.kind()
                ),
            )
        })
    }
}

#[async_trait]
impl UserKubeClient for UserKubeClientImpl {
    async fn list_user_creation_configs(&self) -> Result<Vec<UserCreationConfig>, Error> {
        let api: Api<UserCreationConfig> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_user(&self, name: &str) -> Result<Option<User>, Error> {
        let api: Api<User> = Api::all(self.client.clone());
        match api.get(name).await {
            Ok(user) => Ok(Some(user)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn add_user_finalizer(&self, user: &User, finalizer: &str) -> Result<(), Error> {
        let mut finalizers = user.finalizers().to_vec();
        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        finalizers.push(finalizer.to_string());
        patch_user_finalizers(&self.client, user, finalizers).await
    }

    async fn remove_user_finalizer(&self, user: &User, finalizer: &str) -> Result<(), Error> {
        let finalizers: Vec<String> = user
            .finalizers()
            .iter()
            .filter(|f| *f != finalizer)
            .cloned()
            .collect();
        match patch_user_finalizers(&self.client, user, finalizers).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.get(name).await {
            Ok(ns) => Ok(Some(ns)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_namespace(&self, name: &str) -> Result<(), Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        api.create(&PostParams::default(), &ns).await?;
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn apply_manifest(&self, mut manifest: Manifest) -> Result<(), Error> {
        let (ar, caps) = self.resolve(&manifest).await?;

        // Cluster-scoped kinds cannot carry the workspace namespace
        let api: Api<DynamicObject> = if caps.scope == Scope::Cluster {
            manifest.clear_namespace();
            Api::all_with(self.client.clone(), &ar)
        } else {
            match manifest.namespace() {
                Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
                None => Api::default_namespaced_with(self.client.clone(), &ar),
            }
        };

        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(manifest.name(), &params, &Patch::Apply(manifest.value()))
            .await?;

        trace!(kind = %manifest.kind(), name = %manifest.name(), namespace = ?manifest.namespace(), "applied manifest");
        Ok(())
    }
}

async fn patch_user_finalizers(
    client: &Client,
    user: &User,
    finalizers: Vec<String>,
) -> Result<(), Error> {
    let api: Api<User> = Api::all(client.clone());
    let patch = serde_json::json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": user.resource_version(),
        }
    });
    api.patch(&user.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}
