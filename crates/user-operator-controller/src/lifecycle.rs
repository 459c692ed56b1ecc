//! Identity lifecycle
//!
//! A User moves through
//! `Unready → PendingFinalizer → Active → Terminating → Gone`.
//! The state is derived from the object on every pass and never stored.

use std::fmt;

use user_operator_common::crd::User;

/// Where a User is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// No username yet, nothing to provision for
    Unready,
    /// Ready but not yet protected by the finalizer
    PendingFinalizer,
    /// Finalizer present, workspace should exist
    Active,
    /// Deletion requested and finalizer still present: tear down
    Terminating,
    /// Deletion requested and finalizer already removed
    Gone,
}

impl LifecycleState {
    /// Classify a User.
    ///
    /// Readiness is checked first: a User with an empty username is
    /// `Unready` even when it is being deleted.
    pub fn observe(user: &User) -> Self {
        if !user.is_ready() {
            return Self::Unready;
        }
        match (user.is_deleting(), user.has_finalizer()) {
            (false, false) => Self::PendingFinalizer,
            (false, true) => Self::Active,
            (true, true) => Self::Terminating,
            (true, false) => Self::Gone,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unready => "Unready",
            Self::PendingFinalizer => "PendingFinalizer",
            Self::Active => "Active",
            Self::Terminating => "Terminating",
            Self::Gone => "Gone",
        };
        f.write_str(s)
    }
}
