//! Runtime core: orchestration and lifecycle.
//!
//! This module contains the embedded implementation of the plugboard runtime.
//! The main entry point is [`Manager`], which validates the dependency graph
//! and drives feature units through their lifecycle.
//!
//! Modules:
//! - [`manager`]: batch activation/deactivation, reloads, emergency stop;
//! - [`builder`]: assembles a manager from config, context source and specs;
//! - [`config`]: global runtime settings;
//! - [`registry`]: feature table, dependency ordering, error history;
//! - [`status`]: read-only runtime snapshot;
//! - [`sweep`]: periodic rescue of retry-eligible errored units.

mod builder;
mod config;
mod manager;
mod registry;
mod status;
mod sweep;

pub use builder::ManagerBuilder;
pub use config::ManagerConfig;
pub use manager::Manager;
pub use registry::{ERROR_HISTORY_CAP, ErrorStats, GraphReport, Registry};
pub use status::StatusSnapshot;
