//! Hooks wrap chain execution.
//!
//! Each registered hook sees the chain three times at most: `pre_execute`
//! before the store runs (it may rewrite operations in place or reject the
//! chain), then either `post_execute` with the result or `on_failure` with
//! whatever partial result exists. Hooks run in registration order and each
//! receives the previous hook's output.
//!
//! `post_execute` works on the result in place, so when it fails the graph
//! still owns the result and hands it to `on_failure` before releasing it.

mod authoriser;
mod logging;
mod update_view;

pub use authoriser::OperationAuthoriser;
pub use logging::LoggingHook;
pub use update_view::UpdateViewHook;

use crate::context::Context;
use crate::error::{GraphError, Result};
use crate::operation::OperationChain;
use crate::store::QueryOutput;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub trait GraphHook: Send + Sync {
    fn name(&self) -> &str;

    fn pre_execute(&self, _chain: &mut OperationChain, _ctx: &mut Context) -> Result<()> {
        Ok(())
    }

    /// May replace `result`. On error the result as it stands becomes the
    /// partial result seen by `on_failure`.
    fn post_execute(
        &self,
        _result: &mut QueryOutput,
        _chain: &OperationChain,
        _ctx: &mut Context,
    ) -> Result<()> {
        Ok(())
    }

    fn on_failure(
        &self,
        result: Option<QueryOutput>,
        _chain: &OperationChain,
        _ctx: &mut Context,
        _error: &GraphError,
    ) -> Option<QueryOutput> {
        result
    }
}

/// Hook declarations as they appear in a graph configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HookConfig {
    UpdateView(UpdateViewHook),
    OperationAuthoriser(OperationAuthoriser),
    Logging(LoggingHook),
}

impl HookConfig {
    pub fn into_hook(self) -> Arc<dyn GraphHook> {
        match self {
            HookConfig::UpdateView(hook) => Arc::new(hook),
            HookConfig::OperationAuthoriser(hook) => Arc::new(hook),
            HookConfig::Logging(hook) => Arc::new(hook),
        }
    }
}
