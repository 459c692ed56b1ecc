//! Error types for the user operator
//!
//! Errors carry the name of the object being reconciled where one is known,
//! so a log line is enough to find the offending User or policy.

use thiserror::Error;

use crate::template::TemplateError;

/// Main error type for user operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A policy template failed to parse or render
    #[error("template error in resource {index} for {user}: {source}")]
    Template {
        /// User whose provisioning pass hit the broken template
        user: String,
        /// Position of the template in the effective policy
        index: usize,
        /// The underlying template failure
        #[source]
        source: TemplateError,
    },

    /// A rendered document could not be decoded into a manifest
    #[error("manifest error: {message}")]
    Manifest {
        /// Description of what is wrong with the document
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "discovery", "create_client")
        context: String,
    },
}

impl Error {
    /// Create a template error for the template at `index` while provisioning `user`
    pub fn template(user: impl Into<String>, index: usize, source: TemplateError) -> Self {
        Self::Template {
            user: user.into(),
            index,
            source,
        }
    }

    /// Create a manifest decode error
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest {
            message: msg.into(),
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Template, manifest and serialization errors need a policy change and
    /// are not retried. Kubernetes errors are retried unless the API server
    /// rejected the request outright; optimistic-concurrency conflicts and
    /// throttling are the exceptions among 4xx responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) if ae.code == 409 || ae.code == 429 => true,
                kube::Error::Api(ae) => !(400..500).contains(&ae.code),
                _ => true,
            },
            Error::Template { .. } => false,
            Error::Manifest { .. } => false,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// True when the API server reported that the object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Kube {
                source: kube::Error::Api(ae)
            } if ae.code == 404
        )
    }

    /// True when a create lost the race to another writer
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Error::Kube {
                source: kube::Error::Api(ae)
            } if ae.code == 409 && ae.reason == "AlreadyExists"
        )
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use kube::core::ErrorResponse;

    /// Build an API error the way the API server reports it
    pub fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} ({})", reason, code),
            reason: reason.to_string(),
            code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::api_error;
    use super::*;

    // ==========================================================================
    // Story Tests: How failures steer the requeue decision
    // ==========================================================================

    /// Story: A broken policy template waits for an operator to fix it
    ///
    /// Retrying a template that fails to parse will fail the same way, so the
    /// controller waits for the next change instead of hot-looping.
    #[test]
    fn story_template_errors_wait_for_policy_fix() {
        let err = Error::template(
            "alice",
            2,
            TemplateError::Syntax("unexpected end of input".to_string()),
        );
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("alice"));
        assert!(err.to_string().contains("resource 2"));
    }

    /// Story: Transient API failures are retried
    #[test]
    fn story_server_errors_are_retried() {
        let err = Error::from(api_error(503, "ServiceUnavailable"));
        assert!(err.is_retryable());

        let err = Error::from(api_error(500, "InternalError"));
        assert!(err.is_retryable());
    }

    /// Story: A stale finalizer write conflicts and is retried with fresh state
    #[test]
    fn story_conflicts_and_throttling_are_retried() {
        assert!(Error::from(api_error(409, "Conflict")).is_retryable());
        assert!(Error::from(api_error(429, "TooManyRequests")).is_retryable());
    }

    /// Story: Rejected requests are not retried blindly
    #[test]
    fn story_client_errors_are_not_retried() {
        assert!(!Error::from(api_error(403, "Forbidden")).is_retryable());
        assert!(!Error::from(api_error(422, "Invalid")).is_retryable());
    }

    #[test]
    fn not_found_is_detected_only_for_404() {
        assert!(Error::from(api_error(404, "NotFound")).is_not_found());
        assert!(!Error::from(api_error(409, "AlreadyExists")).is_not_found());
        assert!(!Error::internal_with_context("apply", "boom").is_not_found());
    }

    #[test]
    fn already_exists_is_distinct_from_conflict() {
        assert!(Error::from(api_error(409, "AlreadyExists")).is_already_exists());
        assert!(!Error::from(api_error(409, "Conflict")).is_already_exists());
    }

    #[test]
    fn internal_errors_expose_context() {
        let err = Error::internal_with_context("discovery", "group list failed");
        assert_eq!(err.context(), Some("discovery"));
        assert!(err.to_string().contains("[discovery]"));
        assert_eq!(Error::manifest("x").context(), None);
    }

    #[test]
    fn serialization_errors_carry_kind() {
        match Error::serialization_for_kind("ConfigMap", "bad data") {
            Error::Serialization { kind, message } => {
                assert_eq!(kind.as_deref(), Some("ConfigMap"));
                assert_eq!(message, "bad data");
            }
            _ => panic!("Expected Serialization variant"),
        }
        assert!(!Error::serialization_for_kind("ConfigMap", "x").is_retryable());
    }
}
