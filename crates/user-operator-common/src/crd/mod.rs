//! Custom Resource Definitions for the user operator
//!
//! Both resources are cluster-scoped and live in the `user-operator.lcpu.dev`
//! API group.

mod user;
mod user_creation_config;

pub use user::{User, UserSpec};
pub use user_creation_config::{UserCreationConfig, UserCreationConfigSpec};
