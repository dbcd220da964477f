//! A store that answers by fanning each request out to delegate stores and
//! merging what comes back.
//!
//! Delegates are registered with an access rule. Each request is sent to the
//! delegates the user may see, narrowed by the `federation.graph_ids` chain
//! option, minus delegates whose schema cannot satisfy the request's views.
//! Element results are merged lazily; counts are summed; walks concatenated.

pub mod config;
mod merge;
pub mod report;

pub use config::{FailurePolicy, FederatedStoreConfig};
pub use merge::ChainedStream;
pub use report::{FederationReport, ReleaseFailure, ReportHandle, SkippedDelegate};

use crate::context::Context;
use crate::error::{GraphError, Result};
use crate::handler::{run_chain, ElementSource};
use crate::operation::{Operation, OperationChain, OutputKind, GRAPH_IDS_OPTION};
use crate::schema::Schema;
use crate::store::{QueryOutput, Store};
use crate::stream::ElementStream;
use crate::user::{contains_any, User};
use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Who may see a delegate graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphAccess {
    #[serde(default)]
    pub public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Users holding any of these data auths may see the graph.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub auths: BTreeSet<String>,
}

impl GraphAccess {
    pub fn public() -> Self {
        Self {
            public: true,
            ..Self::default()
        }
    }

    pub fn owned_by(owner: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            ..Self::default()
        }
    }

    pub fn shared_with<I, S>(mut self, auths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auths.extend(auths.into_iter().map(Into::into));
        self
    }

    pub fn is_visible_to(&self, user: &User) -> bool {
        self.public
            || self.owner.as_deref() == Some(user.user_id.as_str())
            || contains_any(&user.data_auths, &self.auths)
    }
}

/// A registered delegate. The schema is captured once at registration.
pub struct DelegateGraph {
    graph_id: String,
    store: Arc<dyn Store>,
    schema: Schema,
    access: GraphAccess,
}

impl DelegateGraph {
    /// A public delegate; see [`DelegateGraph::with_access`].
    pub fn new(graph_id: impl Into<String>, store: Arc<dyn Store>) -> Self {
        let schema = store.schema();
        Self {
            graph_id: graph_id.into(),
            store,
            schema,
            access: GraphAccess::public(),
        }
    }

    pub fn with_access(mut self, access: GraphAccess) -> Self {
        self.access = access;
        self
    }

    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn access(&self) -> &GraphAccess {
        &self.access
    }
}

impl std::fmt::Debug for DelegateGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegateGraph")
            .field("graph_id", &self.graph_id)
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

/// Fan-out/fan-in store over a registry of delegates.
///
/// The registry may change while requests are in flight; each request works
/// on the snapshot it took when it started.
#[derive(Default)]
pub struct FederatedStore {
    graphs: RwLock<Vec<Arc<DelegateGraph>>>,
    config: FederatedStoreConfig,
}

impl FederatedStore {
    pub fn new(config: FederatedStoreConfig) -> Self {
        Self {
            graphs: RwLock::new(Vec::new()),
            config,
        }
    }

    pub fn config(&self) -> &FederatedStoreConfig {
        &self.config
    }

    pub fn add_graph(&self, graph: DelegateGraph) -> Result<()> {
        let mut graphs = self.graphs.write().unwrap_or_else(PoisonError::into_inner);
        if graphs.iter().any(|g| g.graph_id == graph.graph_id) {
            return Err(GraphError::DuplicateGraph(graph.graph_id));
        }
        info!(graph_id = %graph.graph_id, groups = graph.schema.entities.len() + graph.schema.edges.len(), "registered delegate graph");
        graphs.push(Arc::new(graph));
        Ok(())
    }

    pub fn remove_graph(&self, graph_id: &str) -> Result<()> {
        let mut graphs = self.graphs.write().unwrap_or_else(PoisonError::into_inner);
        let before = graphs.len();
        graphs.retain(|g| g.graph_id != graph_id);
        if graphs.len() == before {
            return Err(GraphError::UnknownGraph(graph_id.to_string()));
        }
        info!(graph_id, "removed delegate graph");
        Ok(())
    }

    /// Ids of the delegates `user` may see, in registration order.
    pub fn graph_ids(&self, user: &User) -> Vec<String> {
        self.snapshot()
            .iter()
            .filter(|g| g.access.is_visible_to(user))
            .map(|g| g.graph_id.clone())
            .collect()
    }

    fn snapshot(&self) -> Vec<Arc<DelegateGraph>> {
        self.graphs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Visible delegates, restricted to the chain's graph ids option when set.
    /// Naming a graph the user cannot see is an error, not an empty result.
    fn select_graphs(&self, chain: &OperationChain, user: &User) -> Result<Vec<Arc<DelegateGraph>>> {
        let visible: Vec<_> = self
            .snapshot()
            .into_iter()
            .filter(|g| g.access.is_visible_to(user))
            .collect();

        let Some(requested) = chain.graph_ids() else {
            return Ok(visible);
        };
        let mut selected = Vec::with_capacity(requested.len());
        for graph_id in requested {
            let graph = visible
                .iter()
                .find(|g| g.graph_id == graph_id)
                .ok_or_else(|| GraphError::UnknownGraph(graph_id.clone()))?;
            if !selected.iter().any(|g: &Arc<DelegateGraph>| g.graph_id == graph_id) {
                selected.push(graph.clone());
            }
        }
        Ok(selected)
    }

    /// Sends `chain` to every selected delegate at once and merges the
    /// outputs. Every operation in `chain` must be one whose per-delegate
    /// results combine into the federated answer.
    pub async fn execute_federated(&self, chain: OperationChain, ctx: &Context) -> Result<QueryOutput> {
        let kind = chain.output_kind();
        let graphs = self.select_graphs(&chain, ctx.user())?;

        let dispatches: Vec<_> = graphs
            .into_iter()
            .filter_map(|graph| match update_chain_for_graph(&chain, &graph.schema) {
                Some(delegate_chain) => Some((graph, delegate_chain)),
                None => {
                    debug!(graph_id = %graph.graph_id, "delegate schema cannot satisfy request views");
                    None
                }
            })
            .collect();

        if dispatches.is_empty() {
            debug!(job_id = %ctx.job_id(), "no delegate can answer the request");
            return Ok(QueryOutput::empty(kind));
        }
        debug!(
            job_id = %ctx.job_id(),
            delegates = dispatches.len(),
            operations = ?chain.operation_names(),
            "dispatching to delegates"
        );

        let timeout = self.config.delegate_timeout();
        let slots = dispatches.len();
        let mut pending: FuturesUnordered<_> = dispatches
            .into_iter()
            .enumerate()
            .map(|(index, (graph, delegate_chain))| async move {
                let delegate_ctx = ctx.for_delegate();
                let result = dispatch(&graph, delegate_chain, &delegate_ctx, timeout).await;
                (index, graph.graph_id.clone(), result)
            })
            .collect();

        // Completion order is arbitrary; slots put outputs back in
        // registration order.
        let mut finished: Vec<Option<(String, QueryOutput)>> = (0..slots).map(|_| None).collect();
        let mut failure = None;
        while let Some((index, graph_id, result)) = pending.next().await {
            if ctx.is_cancelled() {
                if let Ok(output) = result {
                    finished[index] = Some((graph_id, output));
                }
                break;
            }
            let result = result.and_then(|mut output| {
                if output.kind() == kind || kind == OutputKind::Void {
                    return Ok(output);
                }
                let got = output.kind();
                if let Err(err) = output.close() {
                    ctx.report().record_release_failure(&graph_id, err.to_string());
                }
                Err(GraphError::Store(anyhow::anyhow!("expected {kind} output, got {got}")))
            });
            match result {
                Ok(output) => finished[index] = Some((graph_id, output)),
                Err(err) => {
                    if let Some(err) = self.on_delegate_failure(graph_id, err, ctx) {
                        failure = Some(err);
                        break;
                    }
                }
            }
        }
        // Drops every dispatch still in flight.
        drop(pending);

        let outputs: Vec<(String, QueryOutput)> = finished.into_iter().flatten().collect();
        if ctx.is_cancelled() {
            close_outputs(outputs, ctx);
            return Err(GraphError::Cancelled);
        }
        if let Some(err) = failure {
            close_outputs(outputs, ctx);
            return Err(err);
        }
        Ok(self.merge_outputs(kind, outputs, ctx))
    }

    /// Applies the failure policy to one delegate failure. Returns the error
    /// the whole request must fail with, if any.
    fn on_delegate_failure(&self, graph_id: String, err: GraphError, ctx: &Context) -> Option<GraphError> {
        match self.config.failure_policy {
            FailurePolicy::FailFast => {
                warn!(graph_id = %graph_id, error = %err, "delegate failed, failing request");
                Some(GraphError::delegate(graph_id, err))
            }
            FailurePolicy::SkipOnError => {
                warn!(graph_id = %graph_id, error = %err, "delegate failed, skipping it");
                ctx.report().record_skipped(&graph_id, err.to_string());
                None
            }
        }
    }

    /// `outputs` all have kind `kind` (or `kind` is void).
    fn merge_outputs(&self, kind: OutputKind, outputs: Vec<(String, QueryOutput)>, ctx: &Context) -> QueryOutput {
        match kind {
            OutputKind::Elements => {
                let parts = outputs
                    .into_iter()
                    .filter_map(|(graph_id, output)| match output {
                        QueryOutput::Elements(stream) => Some((graph_id, stream)),
                        _ => None,
                    })
                    .collect();
                QueryOutput::Elements(ElementStream::new(ChainedStream::new(
                    parts,
                    self.config.failure_policy,
                    ctx.report().clone(),
                    ctx.cancellation_token().clone(),
                )))
            }
            OutputKind::Count => QueryOutput::Count(
                outputs
                    .iter()
                    .map(|(_, output)| match output {
                        QueryOutput::Count(count) => *count,
                        _ => 0,
                    })
                    .sum(),
            ),
            OutputKind::Walks => QueryOutput::Walks(
                outputs
                    .into_iter()
                    .flat_map(|(_, output)| match output {
                        QueryOutput::Walks(walks) => walks,
                        _ => Vec::new(),
                    })
                    .collect(),
            ),
            OutputKind::Void => {
                close_outputs(outputs, ctx);
                QueryOutput::Void
            }
        }
    }
}

/// Runs one delegate, bounded by the timeout and the request's cancellation.
async fn dispatch(
    graph: &DelegateGraph,
    chain: OperationChain,
    ctx: &Context,
    timeout: Option<Duration>,
) -> Result<QueryOutput> {
    let run = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, graph.store.execute(chain, ctx))
                .await
                .map_err(|_| GraphError::Timeout {
                    millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })?,
            None => graph.store.execute(chain, ctx).await,
        }
    };
    tokio::select! {
        output = run => output,
        _ = ctx.cancellation_token().cancelled() => Err(GraphError::Cancelled),
    }
}

fn close_outputs(outputs: Vec<(String, QueryOutput)>, ctx: &Context) {
    for (graph_id, mut output) in outputs {
        if let Err(err) = output.close() {
            warn!(graph_id = %graph_id, error = %err, "failed to close delegate output");
            ctx.report().record_release_failure(&graph_id, err.to_string());
        }
    }
}

/// The chain as one delegate should see it: every view narrowed to the
/// groups the delegate's schema declares. `None` when a view that named
/// groups has none left, since the delegate could only return nothing.
pub fn update_chain_for_graph(chain: &OperationChain, schema: &Schema) -> Option<OperationChain> {
    let mut delegate_chain = chain.clone();
    delegate_chain.options.remove(GRAPH_IDS_OPTION);
    for operation in delegate_chain.leaves_mut() {
        for slot in operation.views_mut() {
            if let Some(view) = slot.as_ref() {
                let restricted = view.restricted_to(schema);
                if view.has_groups() && !restricted.has_groups() {
                    return None;
                }
                *slot = Some(restricted);
            }
        }
    }
    Some(delegate_chain)
}

/// Fetches through the federation, carrying the options of the chain being
/// run so every fetch honours the same graph selection.
struct ScopedSource<'a> {
    store: &'a FederatedStore,
    options: BTreeMap<String, String>,
}

#[async_trait]
impl<'a> ElementSource for ScopedSource<'a> {
    async fn fetch(&self, operation: Operation, ctx: &Context) -> Result<ElementStream> {
        let mut chain = OperationChain::first(operation);
        chain.options = self.options.clone();
        self.store.execute_federated(chain, ctx).await?.into_elements()
    }
}

#[async_trait]
impl Store for FederatedStore {
    /// Union of every delegate's schema.
    fn schema(&self) -> Schema {
        let mut schema = Schema::new();
        for graph in self.snapshot() {
            schema.merge(&graph.schema);
        }
        schema
    }

    /// The leading source operation and any count or collect directly after
    /// it go to the delegates; the rest runs here on the merged output.
    async fn execute(&self, chain: OperationChain, ctx: &Context) -> Result<QueryOutput> {
        let OperationChain {
            mut operations,
            options,
        } = chain.flattened();

        let split = match operations.split_first() {
            Some((first, rest)) if first.is_source() => {
                1 + rest
                    .iter()
                    .take_while(|op| op.is_delegate_safe() && !op.is_source())
                    .count()
            }
            _ => 0,
        };
        let local = operations.split_off(split);

        let input = if operations.is_empty() {
            None
        } else {
            let mut federated = OperationChain::new(operations);
            federated.options = options.clone();
            Some(self.execute_federated(federated, ctx).await?)
        };

        if local.is_empty() {
            return Ok(input.unwrap_or(QueryOutput::Void));
        }
        let source = ScopedSource {
            store: self,
            options,
        };
        run_chain(&source, local, input, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{GetAllElements, GetElements};
    use crate::schema::SchemaElementDefinition;
    use crate::view::{View, ViewElementDefinition};

    fn schema(entities: &[&str]) -> Schema {
        entities.iter().fold(Schema::new(), |schema, group| {
            schema.entity(*group, SchemaElementDefinition::default())
        })
    }

    #[test]
    fn access_rules() {
        let alice = User::new("alice").with_data_auths(["team-a"]);
        assert!(GraphAccess::public().is_visible_to(&alice));
        assert!(GraphAccess::owned_by("alice").is_visible_to(&alice));
        assert!(!GraphAccess::owned_by("bob").is_visible_to(&alice));
        assert!(GraphAccess::owned_by("bob").shared_with(["team-a"]).is_visible_to(&alice));
        assert!(!GraphAccess::default().is_visible_to(&alice));
    }

    #[test]
    fn chain_is_narrowed_to_delegate_schema() {
        let view = View::new()
            .entity("person", ViewElementDefinition::new())
            .entity("place", ViewElementDefinition::new());
        let chain = OperationChain::first(GetAllElements::new().view(view))
            .with_option(GRAPH_IDS_OPTION, "a");

        let narrowed = update_chain_for_graph(&chain, &schema(&["person"])).unwrap();

        let views = narrowed.flatten()[0].views()[0].cloned().unwrap();
        assert_eq!(views.groups(), BTreeSet::from(["person"]));
        assert!(narrowed.graph_ids().is_none());
    }

    #[test]
    fn delegate_without_any_requested_group_is_excluded() {
        let view = View::new().entity("place", ViewElementDefinition::new());
        let chain = OperationChain::first(GetElements::new().seeds(["x"]).view(view));
        assert!(update_chain_for_graph(&chain, &schema(&["person"])).is_none());

        let unrestricted = OperationChain::first(GetElements::new().seeds(["x"]));
        assert!(update_chain_for_graph(&unrestricted, &schema(&["person"])).is_some());
    }
}
