//! Query core for federated property graphs.
//!
//! An [`OperationChain`] runs against a [`Graph`]: the chain is validated,
//! passed through the graph's hooks (which may rewrite views or reject the
//! chain) and executed by the graph's [`Store`]. A [`FederatedStore`] is a
//! store that fans each request out to delegate stores and merges their
//! lazy, closeable result streams. Multi-hop walks are assembled from
//! per-hop adjacency maps that are pruned of dead ends as they grow.

pub mod adjacency;
pub mod context;
pub mod element;
pub mod error;
pub mod federated;
pub mod graph;
pub mod handler;
pub mod hook;
pub mod map_store;
pub mod operation;
pub mod schema;
pub mod store;
pub mod stream;
pub mod user;
pub mod validation;
pub mod view;
pub mod walk;

pub use adjacency::{AdjacencyMap, AdjacencyMaps, PrunedAdjacencyMaps, SimpleAdjacencyMaps};
pub use context::Context;
pub use element::{Direction, Edge, Element, Entity, PropertyValue};
pub use error::{GraphError, Result};
pub use federated::{
    DelegateGraph, FailurePolicy, FederatedStore, FederatedStoreConfig, FederationReport,
    GraphAccess, SkippedDelegate,
};
pub use graph::{Graph, GraphBuilder, GraphConfig};
pub use hook::{GraphHook, HookConfig, LoggingHook, OperationAuthoriser, UpdateViewHook};
pub use map_store::MapStore;
pub use operation::{
    GetAllElements, GetElements, GetWalks, Limit, Operation, OperationChain, OutputKind,
    GRAPH_IDS_OPTION,
};
pub use schema::{Schema, SchemaElementDefinition};
pub use store::{QueryOutput, Store};
pub use stream::{CloseableStream, ElementStream, IterStream, VecStream};
pub use user::User;
pub use validation::{OperationValidator, ValidationResult, ValidationRule, ValidationRules};
pub use view::{GlobalViewElementDefinition, Predicate, View, ViewElementDefinition};
pub use walk::Walk;
