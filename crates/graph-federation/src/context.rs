use crate::federated::report::{FederationReport, ReportHandle, SkippedDelegate};
use crate::user::User;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Per-execution state: who is asking, and a scratch bag hooks may write to.
///
/// A context belongs to exactly one chain execution and is dropped when it
/// finishes. Delegate dispatches get their own derived context sharing the
/// job id, the cancellation signal and the federation report.
#[derive(Debug)]
pub struct Context {
    user: User,
    job_id: Uuid,
    started_at: DateTime<Utc>,
    metadata: HashMap<String, Value>,
    cancellation: CancellationToken,
    report: ReportHandle,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(User::default())
    }
}

impl Context {
    pub fn new(user: User) -> Self {
        Self {
            user,
            job_id: Uuid::new_v4(),
            started_at: Utc::now(),
            metadata: HashMap::new(),
            cancellation: CancellationToken::new(),
            report: ReportHandle::default(),
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn remove_metadata(&mut self, key: &str) -> Option<Value> {
        self.metadata.remove(key)
    }

    /// Cancels this execution and every delegate dispatch derived from it.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn report(&self) -> &ReportHandle {
        &self.report
    }

    pub fn federation_report(&self) -> FederationReport {
        self.report.snapshot()
    }

    pub fn skipped_delegates(&self) -> Vec<SkippedDelegate> {
        self.report.snapshot().skipped
    }

    /// Context handed to one delegate store. Cancelling the parent cancels
    /// the child, not the other way round.
    pub(crate) fn for_delegate(&self) -> Context {
        Context {
            user: self.user.clone(),
            job_id: self.job_id,
            started_at: self.started_at,
            metadata: self.metadata.clone(),
            cancellation: self.cancellation.child_token(),
            report: self.report.clone(),
        }
    }
}
