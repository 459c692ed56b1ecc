//! Policy aggregation
//!
//! Folds every enabled [`UserCreationConfig`] into a single
//! [`EffectivePolicy`]. The result is never stored; it is recomputed from the
//! live policy set on every reconcile so a policy edit takes effect on the
//! next pass for every user.

use kube::ResourceExt;
use tracing::warn;

use user_operator_common::crd::UserCreationConfig;

/// The combined provisioning policy for one reconcile pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EffectivePolicy {
    /// Concatenation of every enabled policy's prefix, oldest first
    pub namespace_prefix: String,
    /// Every enabled policy's templates, oldest policy first, in list order
    pub resource_templates: Vec<String>,
}

impl EffectivePolicy {
    /// Aggregate the enabled policies.
    ///
    /// Policies are ordered by creation timestamp, ties broken by name, so
    /// the result does not depend on the order the API server listed them
    /// in. Prefixes are concatenated in that order: two enabled policies
    /// with prefixes `a-` and `b-` yield `a-b-`.
    pub fn aggregate(configs: &[UserCreationConfig]) -> Self {
        let mut enabled: Vec<&UserCreationConfig> =
            configs.iter().filter(|c| c.spec.enabled).collect();
        enabled.sort_by(|a, b| {
            let a_ts = a.metadata.creation_timestamp.as_ref().map(|t| t.0);
            let b_ts = b.metadata.creation_timestamp.as_ref().map(|t| t.0);
            a_ts.cmp(&b_ts).then_with(|| a.name_any().cmp(&b.name_any()))
        });

        let prefixed: Vec<String> = enabled
            .iter()
            .filter(|c| !c.spec.namespace_prefix.is_empty())
            .map(|c| c.name_any())
            .collect();
        if prefixed.len() > 1 {
            warn!(
                policies = ?prefixed,
                "several enabled policies set a namespace prefix, concatenating them"
            );
        }

        let mut policy = EffectivePolicy::default();
        for config in enabled {
            policy.namespace_prefix.push_str(&config.spec.namespace_prefix);
            policy
                .resource_templates
                .extend(config.spec.resources.iter().cloned());
        }
        policy
    }

    /// Namespace name for `username` under this policy
    pub fn namespace_for(&self, username: &str) -> String {
        format!("{}{}", self.namespace_prefix, username)
    }
}
