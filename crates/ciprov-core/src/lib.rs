//! Core domain types for the ciprov CI provisioner.
//!
//! This crate contains:
//! - The desired-resource model (plugins, credentials, pipeline jobs)
//! - Existence states, per-resource outcomes and the reconciliation report
//! - Remote endpoint and secret handling
//! - Typed XML payload builders for the orchestrator API

pub mod endpoint;
pub mod error;
pub mod payload;
pub mod report;
pub mod resource;
pub mod secret;

pub use endpoint::{Auth, RemoteEndpoint};
pub use error::{Error, Result};
pub use report::{ReconciliationReport, ReportEntry, ResourceOutcome, excerpt};
pub use resource::{
    ChoiceParameter, Credential, DesiredState, ExistenceState, Job, Plugin, Resource,
    ResourceKind, ResourceRef, UnknownPolicies, UnknownPolicy,
};
pub use secret::Secret;
