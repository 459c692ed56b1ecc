//! Common types for the user operator: CRDs, errors, templating and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod kube_utils;
pub mod manifest;
pub mod telemetry;
pub mod template;
pub mod yaml;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group shared by every user operator CRD
pub const API_GROUP: &str = "user-operator.lcpu.dev";

/// Finalizer placed on each User before any provisioning side effect
pub const USER_FINALIZER: &str = "user-operator.lcpu.dev/user-finalizer";

/// Field manager for every server-side apply issued by the controller
pub const FIELD_MANAGER: &str = "lcpu-user-operator-user-controller";

/// Component name reported on Kubernetes Events
pub const CONTROLLER_NAME: &str = "user-operator";
