//! User operator binary support: CLI, startup and controller wiring

#![deny(missing_docs)]

pub mod config;
pub mod controller_runner;
pub mod startup;
