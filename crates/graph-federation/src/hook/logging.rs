use super::GraphHook;
use crate::context::Context;
use crate::error::{GraphError, Result};
use crate::operation::OperationChain;
use crate::store::QueryOutput;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Logs the start and end of every chain it sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingHook {
    /// Whether user ids appear in the log lines.
    #[serde(default = "default_include_user")]
    pub include_user: bool,
}

fn default_include_user() -> bool {
    true
}

impl Default for LoggingHook {
    fn default() -> Self {
        Self {
            include_user: default_include_user(),
        }
    }
}

impl LoggingHook {
    fn user<'a>(&self, ctx: &'a Context) -> &'a str {
        if self.include_user {
            &ctx.user().user_id
        } else {
            "-"
        }
    }
}

impl GraphHook for LoggingHook {
    fn name(&self) -> &str {
        "LoggingHook"
    }

    fn pre_execute(&self, chain: &mut OperationChain, ctx: &mut Context) -> Result<()> {
        info!(
            job_id = %ctx.job_id(),
            user = self.user(ctx),
            operations = ?chain.operation_names(),
            "running operation chain"
        );
        Ok(())
    }

    fn post_execute(
        &self,
        result: &mut QueryOutput,
        _chain: &OperationChain,
        ctx: &mut Context,
    ) -> Result<()> {
        let elapsed_ms = (Utc::now() - ctx.started_at()).num_milliseconds();
        let report = ctx.federation_report();
        info!(
            job_id = %ctx.job_id(),
            user = self.user(ctx),
            output = %result.kind(),
            elapsed_ms,
            skipped_delegates = report.skipped.len(),
            "operation chain finished"
        );
        Ok(())
    }

    fn on_failure(
        &self,
        result: Option<QueryOutput>,
        _chain: &OperationChain,
        ctx: &mut Context,
        error: &GraphError,
    ) -> Option<QueryOutput> {
        let elapsed_ms = (Utc::now() - ctx.started_at()).num_milliseconds();
        warn!(
            job_id = %ctx.job_id(),
            user = self.user(ctx),
            elapsed_ms,
            %error,
            "operation chain failed"
        );
        result
    }
}
