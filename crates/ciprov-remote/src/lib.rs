//! Remote operations against the CI orchestrator and the workspace identity provider.
//!
//! Every component talks through the [`Transport`] trait so the reconciliation driver can be
//! exercised against an in-memory orchestrator.

pub mod api;
pub mod existence;
pub mod install;
pub mod probe;
pub mod token;
pub mod transport;

pub use existence::{ExistenceChecker, PluginListing};
pub use install::Installer;
pub use probe::{ProbeFailure, Prober};
pub use token::{Identity, TokenState, TokenValidator};
pub use transport::{
    HttpTransport, Method, READ_TIMEOUT, Request, Response, Transport, TransportError,
    WRITE_TIMEOUT,
};
