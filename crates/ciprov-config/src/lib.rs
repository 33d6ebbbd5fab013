//! KDL configuration parsing for ciprov.
//!
//! This crate handles parsing of desired-state files (`ciprov.kdl`): the orchestrator to
//! target, reconciliation settings, and the plugins, credential and job to converge on.

pub mod desired;
pub mod error;

pub use desired::{
    DesiredStateFile, OrchestratorConfig, SettingsConfig, load_desired_state,
    parse_desired_state, parse_desired_state_with,
};
pub use error::{ConfigError, ConfigResult};
