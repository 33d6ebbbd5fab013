//! Per-resource outcomes and the reconciliation report.

use crate::ResourceRef;

/// Result of reconciling one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOutcome {
    /// A read confirmed the resource already exists; nothing was mutated.
    AlreadyPresent,
    /// The mutating call returned a success-class status.
    Created,
    Failed { reason: String },
}

impl ResourceOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        ResourceOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ResourceOutcome::Failed { .. })
    }
}

/// One line of the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub resource: ResourceRef,
    pub outcome: ResourceOutcome,
    /// Operator-facing follow-up (e.g. "update the job manually").
    pub note: Option<String>,
}

/// Ordered outcomes for one reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationReport {
    /// Set when the connectivity probe failed; no entries exist in that case.
    pub aborted: Option<String>,
    pub entries: Vec<ReportEntry>,
}

impl ReconciliationReport {
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self {
            aborted: Some(reason.into()),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    pub fn success(&self) -> bool {
        self.aborted.is_none() && !self.entries.iter().any(|e| e.outcome.is_failure())
    }

    /// Entries whose outcome is `Failed`, in run order.
    pub fn failures(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.outcome.is_failure())
    }

    pub fn outcome_of(&self, resource: &ResourceRef) -> Option<&ResourceOutcome> {
        self.entries
            .iter()
            .find(|e| &e.resource == resource)
            .map(|e| &e.outcome)
    }
}

/// Bound a response body for display, cutting on a character boundary.
pub fn excerpt(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
