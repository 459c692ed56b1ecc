//! Values exposed to policy templates

use std::collections::BTreeMap;

use minijinja::Value;

use crate::crd::User;

/// Everything a policy template can reference while rendering for one User
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateContext {
    /// `{{ Namespace }}`
    pub namespace: String,
    /// `{{ Username }}`
    pub username: String,
    /// `{{ UID }}`
    pub uid: String,
    /// `{{ Groups }}`
    pub groups: Vec<String>,
    /// `{{ Extra }}`
    pub extra: BTreeMap<String, Vec<String>>,
}

impl TemplateContext {
    /// Build the context for `user` provisioned into `namespace`
    pub fn for_user(user: &User, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            username: user.spec.username.clone(),
            uid: user.spec.uid.clone(),
            groups: user.spec.groups.clone(),
            extra: user.spec.extra.clone(),
        }
    }

    /// Convert to minijinja Value for rendering
    pub fn to_value(&self) -> Value {
        let extra: BTreeMap<String, Value> = self
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect();

        Value::from_iter([
            ("Namespace".to_string(), Value::from(self.namespace.clone())),
            ("Username".to_string(), Value::from(self.username.clone())),
            ("UID".to_string(), Value::from(self.uid.clone())),
            ("Groups".to_string(), Value::from(self.groups.clone())),
            ("Extra".to_string(), Value::from_iter(extra)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::UserSpec;

    #[test]
    fn context_is_built_from_user_spec() {
        let user = User::new(
            "alice",
            UserSpec {
                username: "alice".to_string(),
                uid: "1001".to_string(),
                groups: vec!["students".to_string()],
                extra: BTreeMap::from([("dept".to_string(), vec!["cs".to_string()])]),
            },
        );

        let ctx = TemplateContext::for_user(&user, "team-alice");
        assert_eq!(ctx.namespace, "team-alice");
        assert_eq!(ctx.username, "alice");
        assert_eq!(ctx.uid, "1001");
        assert_eq!(ctx.groups, vec!["students".to_string()]);
        assert_eq!(ctx.extra["dept"], vec!["cs".to_string()]);
    }

    #[test]
    fn value_exposes_exactly_five_keys() {
        let value = TemplateContext::default().to_value();
        let mut keys: Vec<String> = value
            .try_iter()
            .expect("context is a map")
            .map(|k| k.to_string())
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["Extra", "Groups", "Namespace", "UID", "Username"]);
    }
}
