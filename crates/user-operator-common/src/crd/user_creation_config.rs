//! UserCreationConfig CRD: a cluster-wide provisioning policy
//!
//! Every enabled policy contributes a namespace prefix and a list of
//! manifest templates. The controller folds all enabled policies together
//! on each reconcile; it never writes to them.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Provisioning policy applied to every User.
///
/// Example:
/// ```yaml
/// apiVersion: user-operator.lcpu.dev/v1alpha1
/// kind: UserCreationConfig
/// metadata:
///   name: team-workspaces
/// spec:
///   enabled: true
///   namespacePrefix: team-
///   resources:
///     - |
///       apiVersion: v1
///       kind: ConfigMap
///       metadata:
///         name: profile
///       data:
///         user: "{{ Username }}"
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "user-operator.lcpu.dev",
    version = "v1alpha1",
    kind = "UserCreationConfig",
    printcolumn = r#"{"name":"Enabled","type":"boolean","jsonPath":".spec.enabled"}"#,
    printcolumn = r#"{"name":"Prefix","type":"string","jsonPath":".spec.namespacePrefix"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct UserCreationConfigSpec {
    /// Disabled policies are ignored entirely
    pub enabled: bool,

    /// Prepended to the username to form the namespace name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace_prefix: String,

    /// Manifest templates, one document each
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn optional_fields_default_to_empty() {
        let spec: UserCreationConfigSpec =
            serde_json::from_value(serde_json::json!({ "enabled": true })).expect("valid spec");
        assert!(spec.enabled);
        assert_eq!(spec.namespace_prefix, "");
        assert!(spec.resources.is_empty());
    }

    #[test]
    fn enabled_is_required() {
        let result: Result<UserCreationConfigSpec, _> =
            serde_json::from_value(serde_json::json!({ "namespacePrefix": "x-" }));
        assert!(result.is_err());
    }

    #[test]
    fn prefix_is_camel_case_on_the_wire() {
        let spec = UserCreationConfigSpec {
            enabled: true,
            namespace_prefix: "team-".to_string(),
            resources: vec![],
        };
        let value = serde_json::to_value(&spec).expect("spec serializes");
        assert_eq!(value["namespacePrefix"], "team-");
        assert!(value.get("resources").is_none());
    }

    #[test]
    fn crd_is_cluster_scoped() {
        let crd = UserCreationConfig::crd();
        assert_eq!(crd.spec.scope, "Cluster");
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("usercreationconfigs.user-operator.lcpu.dev")
        );
    }
}
