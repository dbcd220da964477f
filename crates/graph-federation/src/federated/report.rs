use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A delegate whose contribution was dropped under skip-on-error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDelegate {
    pub graph_id: String,
    pub reason: String,
}

/// A delegate stream that failed to release its resources on close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseFailure {
    pub graph_id: String,
    pub reason: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct FederationReport {
    pub skipped: Vec<SkippedDelegate>,
    pub release_failures: Vec<ReleaseFailure>,
}

impl FederationReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.release_failures.is_empty()
    }
}

/// Shared handle to one execution's report. Merged streams keep a clone so
/// failures surfacing during lazy iteration still land in the same report.
#[derive(Debug, Default, Clone)]
pub struct ReportHandle(Arc<Mutex<FederationReport>>);

impl ReportHandle {
    fn lock(&self) -> MutexGuard<'_, FederationReport> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_skipped(&self, graph_id: &str, reason: impl Into<String>) {
        self.lock().skipped.push(SkippedDelegate {
            graph_id: graph_id.to_string(),
            reason: reason.into(),
        });
    }

    pub fn record_release_failure(&self, graph_id: &str, reason: impl Into<String>) {
        self.lock().release_failures.push(ReleaseFailure {
            graph_id: graph_id.to_string(),
            reason: reason.into(),
        });
    }

    pub fn snapshot(&self) -> FederationReport {
        self.lock().clone()
    }
}
