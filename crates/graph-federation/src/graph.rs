//! A graph: one store behind the validation gate and a hook pipeline.

use crate::context::Context;
use crate::error::{GraphError, Result};
use crate::handler::discard;
use crate::hook::{GraphHook, HookConfig};
use crate::operation::OperationChain;
use crate::schema::Schema;
use crate::store::{QueryOutput, Store};
use crate::validation::{OperationValidator, ValidationRules};
use crate::view::View;
use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Graph configuration as loaded from JSON.
///
/// ```json
/// {
///   "graph_id": "roads",
///   "hooks": [
///     { "type": "operation_authoriser", "auths": { "GetAllElements": ["admin"] } },
///     { "type": "update_view", "black_list_element_groups": ["secret"] },
///     { "type": "logging" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    pub graph_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub hooks: Vec<HookConfig>,
}

impl GraphConfig {
    pub fn new(graph_id: impl Into<String>) -> Self {
        Self {
            graph_id: graph_id.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read graph config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid graph config {}", path.display()))
    }
}

pub struct Graph {
    graph_id: String,
    description: Option<String>,
    store: Arc<dyn Store>,
    hooks: Vec<Arc<dyn GraphHook>>,
    validator: OperationValidator,
}

impl Graph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(|hook| hook.name()).collect()
    }

    /// Validates `chain`, runs the hooks around the store and returns the
    /// result. On any failure every hook's `on_failure` runs before the
    /// error is returned, and whatever partial result is left is released.
    pub async fn execute(&self, chain: OperationChain, ctx: &mut Context) -> Result<QueryOutput> {
        let mut chain = chain.flattened();
        let mut output = None;
        match self.run(&mut chain, ctx, &mut output).await {
            Ok(()) => Ok(output.unwrap_or(QueryOutput::Void)),
            Err(err) => {
                debug!(graph_id = %self.graph_id, job_id = %ctx.job_id(), error = %err, "running failure hooks");
                let mut partial = output;
                for hook in &self.hooks {
                    partial = hook.on_failure(partial, &chain, ctx, &err);
                }
                discard(partial);
                Err(err)
            }
        }
    }

    /// Leaves the store's result in `output` even when a later stage fails.
    async fn run(
        &self,
        chain: &mut OperationChain,
        ctx: &mut Context,
        output: &mut Option<QueryOutput>,
    ) -> Result<()> {
        let schema = self.store.schema();
        if let Some(err) = self.validator.validate(chain, ctx.user(), &schema).into_error() {
            return Err(err);
        }
        fill_default_views(chain, &schema);
        for hook in &self.hooks {
            hook.pre_execute(chain, ctx)?;
        }
        let result = output.insert(self.store.execute(chain.clone(), ctx).await?);
        for hook in &self.hooks {
            hook.post_execute(result, chain, ctx)?;
        }
        Ok(())
    }
}

/// Operations without a view get one naming every schema group, so hooks
/// always have explicit groups to rewrite.
fn fill_default_views(chain: &mut OperationChain, schema: &Schema) {
    for operation in chain.leaves_mut() {
        for slot in operation.views_mut() {
            if slot.is_none() {
                *slot = Some(View::from_schema(schema));
            }
        }
    }
}

/// A graph can itself be a delegate of a federated store. Each call runs
/// under a context derived from the caller's.
#[async_trait]
impl Store for Graph {
    fn schema(&self) -> Schema {
        self.store.schema()
    }

    async fn execute(&self, chain: OperationChain, ctx: &Context) -> Result<QueryOutput> {
        let mut ctx = ctx.for_delegate();
        Graph::execute(self, chain, &mut ctx).await
    }
}

#[derive(Default)]
pub struct GraphBuilder {
    config: GraphConfig,
    store: Option<Arc<dyn Store>>,
    hooks: Vec<Arc<dyn GraphHook>>,
    rules: ValidationRules,
}

impl GraphBuilder {
    pub fn graph_id(mut self, graph_id: impl Into<String>) -> Self {
        self.config.graph_id = graph_id.into();
        self
    }

    /// Takes id and description from `config`; its hooks are appended after
    /// any added so far.
    pub fn config(mut self, config: GraphConfig) -> Self {
        self.hooks
            .extend(config.hooks.iter().cloned().map(HookConfig::into_hook));
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn add_hook(mut self, hook: impl GraphHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn validation_rules(mut self, rules: ValidationRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn build(self) -> Result<Graph> {
        let store = self.store.ok_or_else(|| {
            GraphError::Store(anyhow::anyhow!(
                "graph {} has no store",
                self.config.graph_id
            ))
        })?;
        if self.config.graph_id.is_empty() {
            return Err(GraphError::Store(anyhow::anyhow!("graph id must not be empty")));
        }
        Ok(Graph {
            graph_id: self.config.graph_id,
            description: self.config.description,
            store,
            hooks: self.hooks,
            validator: OperationValidator::new(self.rules),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::{LoggingHook, OperationAuthoriser, UpdateViewHook};

    #[test]
    fn config_parses_every_hook_type() {
        let config = GraphConfig::from_json(
            r#"{
                "graph_id": "roads",
                "description": "road network",
                "hooks": [
                    { "type": "operation_authoriser", "auths": { "GetAllElements": ["admin"] } },
                    {
                        "type": "update_view",
                        "with_data_auth": ["analyst"],
                        "view_to_merge": { "entities": { "junction": {} } }
                    },
                    { "type": "logging", "include_user": false }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.graph_id, "roads");
        assert_eq!(
            config.hooks[0],
            HookConfig::OperationAuthoriser(OperationAuthoriser::new().require("GetAllElements", ["admin"]))
        );
        let HookConfig::UpdateView(hook) = &config.hooks[1] else {
            panic!("expected update view hook");
        };
        assert!(hook.merge_view().unwrap().unwrap().entities.contains_key("junction"));
        assert_eq!(
            config.hooks[2],
            HookConfig::Logging(LoggingHook { include_user: false })
        );
    }

    #[test]
    fn builder_requires_a_store() {
        let err = Graph::builder().graph_id("g").build().err().unwrap();
        assert!(err.to_string().contains("has no store"));
    }

    #[test]
    fn config_hooks_keep_declared_order() {
        let config = GraphConfig {
            hooks: vec![
                HookConfig::UpdateView(UpdateViewHook::new()),
                HookConfig::Logging(LoggingHook::default()),
            ],
            ..GraphConfig::new("g")
        };
        let store: Arc<dyn Store> = Arc::new(crate::map_store::MapStore::new(Schema::new()));
        let graph = Graph::builder().config(config).store(store).build().unwrap();
        assert_eq!(graph.hook_names(), ["UpdateViewHook", "LoggingHook"]);
    }
}
