//! Reconciliation of desired orchestrator state.
//!
//! Probes the orchestrator, then checks and creates each desired resource in order,
//! folding the per-resource outcomes into a [`ReconciliationReport`].
//!
//! [`ReconciliationReport`]: ciprov_core::ReconciliationReport

pub mod driver;

pub use driver::{DEFAULT_PLUGIN_DELAY, ReconcileEvent, ReconcileSettings, Reconciler};
