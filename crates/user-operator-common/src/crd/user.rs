//! User CRD: the identity a workspace is provisioned for

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{CustomResource, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::USER_FINALIZER;

/// A cluster user and the identity attributes templates can reference.
///
/// Example:
/// ```yaml
/// apiVersion: user-operator.lcpu.dev/v1alpha1
/// kind: User
/// metadata:
///   name: alice
/// spec:
///   username: alice
///   uid: "1001"
///   groups: [students]
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "user-operator.lcpu.dev",
    version = "v1alpha1",
    kind = "User",
    printcolumn = r#"{"name":"Username","type":"string","jsonPath":".spec.username"}"#,
    printcolumn = r#"{"name":"UID","type":"string","jsonPath":".spec.uid"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct UserSpec {
    /// Login name. An empty username means the User is not ready yet.
    #[serde(default)]
    pub username: String,

    /// Identity provider UID
    #[serde(default)]
    pub uid: String,

    /// Group memberships
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,

    /// Free-form identity attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Vec<String>>,
}

impl User {
    /// Whether the identity carries enough data to provision for
    pub fn is_ready(&self) -> bool {
        !self.spec.username.is_empty()
    }

    /// Whether deletion has been requested
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether the operator finalizer is present
    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == USER_FINALIZER)
    }

    /// Owner reference pointing at this User.
    ///
    /// Returns `None` until the API server has assigned a UID.
    pub fn owner_reference(&self) -> Option<OwnerReference> {
        Some(OwnerReference {
            api_version: User::api_version(&()).to_string(),
            kind: User::kind(&()).to_string(),
            name: self.name_any(),
            uid: self.metadata.uid.clone()?,
            ..Default::default()
        })
    }
}
