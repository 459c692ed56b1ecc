//! Schema-less manifests decoded from rendered templates
//!
//! A [`Manifest`] keeps the document as a `serde_json::Value` so any kind,
//! including CRDs the operator has never heard of, can be server-side
//! applied. Only the fields the controller stamps (namespace and owner
//! reference) are ever touched.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::GroupVersionKind;
use serde_json::Value;
use tracing::warn;

use crate::kube_utils::parse_api_version;
use crate::yaml::parse_yaml_documents;
use crate::Error;

/// A single decoded manifest document
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    value: Value,
    api_version: String,
    kind: String,
    name: String,
}

impl Manifest {
    /// Decode rendered template output.
    ///
    /// JSON is accepted when the text starts with `{`, YAML otherwise. Only
    /// the first YAML document is used; an empty first document followed by
    /// a real one is an error rather than a silent skip. Returns `Ok(None)`
    /// when the text holds no document at all (a template whose conditionals
    /// rendered nothing).
    pub fn decode(text: &str) -> Result<Option<Self>, Error> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let value = if trimmed.starts_with('{') {
            serde_json::from_str(trimmed)
                .map_err(|e| Error::manifest(format!("invalid JSON: {}", e)))?
        } else {
            let mut docs = parse_yaml_documents(text)
                .map_err(|e| Error::manifest(format!("invalid YAML: {}", e)))?
                .into_iter();
            let first = docs.next().unwrap_or(Value::Null);
            let ignored = docs.filter(|d| !d.is_null()).count();
            if first.is_null() && ignored > 0 {
                return Err(Error::manifest(
                    "first document is empty but later documents are not; only the first document is applied",
                ));
            }
            if ignored > 0 {
                warn!(ignored, "rendered template holds several documents, using the first");
            }
            first
        };

        if value.is_null() {
            return Ok(None);
        }
        Self::from_value(value).map(Some)
    }

    /// Build a manifest from an already parsed value
    pub fn from_value(value: Value) -> Result<Self, Error> {
        if !value.is_object() {
            return Err(Error::manifest("document is not a mapping"));
        }

        let api_version = required_str(&value, "/apiVersion")?;
        let kind = required_str(&value, "/kind")?;
        let name = required_str(&value, "/metadata/name")?;

        Ok(Self {
            value,
            api_version,
            kind,
            name,
        })
    }

    /// Force `metadata.namespace`, overriding whatever the template set
    pub fn set_namespace(&mut self, namespace: &str) {
        if let Some(metadata) = self.metadata_mut() {
            metadata.insert("namespace".to_string(), Value::String(namespace.to_string()));
        }
    }

    /// Drop `metadata.namespace` (cluster-scoped kinds)
    pub fn clear_namespace(&mut self) {
        if let Some(metadata) = self.metadata_mut() {
            metadata.remove("namespace");
        }
    }

    /// Replace `metadata.ownerReferences` with exactly `owner`
    pub fn set_owner(&mut self, owner: &OwnerReference) -> Result<(), Error> {
        let owner = serde_json::to_value(owner)
            .map_err(|e| Error::serialization_for_kind("OwnerReference", e.to_string()))?;
        if let Some(metadata) = self.metadata_mut() {
            metadata.insert("ownerReferences".to_string(), Value::Array(vec![owner]));
        }
        Ok(())
    }

    /// Group, version and kind of the document
    pub fn gvk(&self) -> GroupVersionKind {
        let (group, version) = parse_api_version(&self.api_version);
        GroupVersionKind {
            group,
            version,
            kind: self.kind.clone(),
        }
    }

    /// `metadata.name`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `kind`
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// `apiVersion`
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// `metadata.namespace`, if set
    pub fn namespace(&self) -> Option<&str> {
        self.value.pointer("/metadata/namespace").and_then(Value::as_str)
    }

    /// The full document
    pub fn value(&self) -> &Value {
        &self.value
    }

    fn metadata_mut(&mut self) -> Option<&mut serde_json::Map<String, Value>> {
        self.value
            .get_mut("metadata")
            .and_then(Value::as_object_mut)
    }
}

fn required_str(value: &Value, pointer: &str) -> Result<String, Error> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::manifest(format!("manifest missing {}", pointer)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIGMAP: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: profile
  namespace: somewhere-else
data:
  user: alice
"#;

    fn owner() -> OwnerReference {
        OwnerReference {
            api_version: "user-operator.lcpu.dev/v1alpha1".to_string(),
            kind: "User".to_string(),
            name: "alice".to_string(),
            uid: "uid-1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn decodes_yaml_manifest() {
        let m = Manifest::decode(CONFIGMAP)
            .expect("valid manifest")
            .expect("document present");
        assert_eq!(m.kind(), "ConfigMap");
        assert_eq!(m.name(), "profile");
        assert_eq!(m.api_version(), "v1");
        assert_eq!(m.namespace(), Some("somewhere-else"));
        let gvk = m.gvk();
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");
    }

    #[test]
    fn decodes_json_manifest() {
        let json = r#"{"apiVersion":"rbac.authorization.k8s.io/v1","kind":"RoleBinding","metadata":{"name":"admin"}}"#;
        let m = Manifest::decode(json)
            .expect("valid manifest")
            .expect("document present");
        assert_eq!(m.gvk().group, "rbac.authorization.k8s.io");
        assert_eq!(m.namespace(), None);
    }

    #[test]
    fn blank_output_is_not_a_document() {
        assert_eq!(Manifest::decode("").expect("blank is fine"), None);
        assert_eq!(Manifest::decode("  \n\n ").expect("blank is fine"), None);
        assert_eq!(Manifest::decode("# disabled\n").expect("comment is fine"), None);
    }

    #[test]
    fn only_first_document_is_used() {
        let text = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: b\n";
        let m = Manifest::decode(text)
            .expect("valid manifest")
            .expect("document present");
        assert_eq!(m.name(), "a");
    }

    #[test]
    fn empty_first_document_before_a_real_one_is_rejected() {
        let text = "---\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n";
        let err = Manifest::decode(text).expect_err("later object must not be skipped");
        assert!(matches!(err, Error::Manifest { .. }));

        let m = Manifest::decode("---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n")
            .expect("leading separator is fine")
            .expect("document present");
        assert_eq!(m.name(), "a");
    }

    #[test]
    fn missing_identity_fields_are_rejected() {
        let err = Manifest::decode("kind: ConfigMap\nmetadata:\n  name: x\n")
            .expect_err("apiVersion is required");
        assert!(err.to_string().contains("apiVersion"));

        let err = Manifest::decode("apiVersion: v1\nkind: ConfigMap\n")
            .expect_err("metadata.name is required");
        assert!(err.to_string().contains("metadata/name"));

        assert!(Manifest::decode("- just\n- a list\n").is_err());
        assert!(Manifest::decode("{ not json").is_err());
    }

    #[test]
    fn namespace_is_forced() {
        let mut m = Manifest::decode(CONFIGMAP)
            .expect("valid manifest")
            .expect("document present");
        m.set_namespace("team-alice");
        assert_eq!(m.namespace(), Some("team-alice"));
        m.clear_namespace();
        assert_eq!(m.namespace(), None);
    }

    #[test]
    fn owner_reference_replaces_existing_ones() {
        let text = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: profile
  ownerReferences:
    - apiVersion: v1
      kind: Pod
      name: intruder
      uid: other
"#;
        let mut m = Manifest::decode(text)
            .expect("valid manifest")
            .expect("document present");
        m.set_owner(&owner()).expect("owner serializes");

        let refs = m.value()["metadata"]["ownerReferences"]
            .as_array()
            .expect("owner references set");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0]["kind"], "User");
        assert_eq!(refs[0]["uid"], "uid-1");
        assert_eq!(refs[0]["apiVersion"], "user-operator.lcpu.dev/v1alpha1");
    }
}
