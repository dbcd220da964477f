//! Operations and operation chains.
//!
//! Operations are a closed set. Anything that needs to treat them generically
//! (hooks, validation, federation) asks for a capability instead of matching on
//! the concrete operation: the views an operation owns, the kind of output it
//! produces, whether it can take the previous output as input.

use crate::element::Direction;
use crate::view::View;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Chain option restricting federated dispatch to a comma separated list of
/// delegate graph ids.
pub const GRAPH_IDS_OPTION: &str = "federation.graph_ids";

pub const DEFAULT_WALK_RESULTS_LIMIT: usize = 1_000_000;

/// What an operation (or a whole chain) yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Elements,
    Count,
    Walks,
    Void,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputKind::Elements => "elements",
            OutputKind::Count => "count",
            OutputKind::Walks => "walks",
            OutputKind::Void => "void",
        };
        f.write_str(name)
    }
}

/// Fetches elements around seed vertices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetElements {
    #[serde(default)]
    pub seeds: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
    #[serde(default)]
    pub direction: Direction,
}

impl GetElements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeds<I, S>(mut self, seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seeds = seeds.into_iter().map(Into::into).collect();
        self
    }

    pub fn view(mut self, view: View) -> Self {
        self.view = Some(view);
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAllElements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
}

impl GetAllElements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(mut self, view: View) -> Self {
        self.view = Some(view);
        self
    }
}

/// Multi-hop walk: each hop is a `GetElements` seeded with the previous hop's
/// destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetWalks {
    #[serde(default)]
    pub seeds: Vec<String>,
    pub hops: Vec<GetElements>,
    #[serde(default = "default_walk_results_limit")]
    pub results_limit: usize,
}

fn default_walk_results_limit() -> usize {
    DEFAULT_WALK_RESULTS_LIMIT
}

impl Default for GetWalks {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            hops: Vec::new(),
            results_limit: DEFAULT_WALK_RESULTS_LIMIT,
        }
    }
}

impl GetWalks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeds<I, S>(mut self, seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seeds = seeds.into_iter().map(Into::into).collect();
        self
    }

    pub fn hop(mut self, hop: GetElements) -> Self {
        self.hops.push(hop);
        self
    }

    pub fn results_limit(mut self, limit: usize) -> Self {
        self.results_limit = limit;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    pub result_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum Operation {
    GetElements(GetElements),
    GetAllElements(GetAllElements),
    GetWalks(GetWalks),
    Limit(Limit),
    Count,
    ToVec,
    Chain(OperationChain),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::GetElements(_) => "GetElements",
            Operation::GetAllElements(_) => "GetAllElements",
            Operation::GetWalks(_) => "GetWalks",
            Operation::Limit(_) => "Limit",
            Operation::Count => "Count",
            Operation::ToVec => "ToVec",
            Operation::Chain(_) => "OperationChain",
        }
    }

    pub fn output_kind(&self) -> OutputKind {
        match self {
            Operation::GetElements(_)
            | Operation::GetAllElements(_)
            | Operation::Limit(_)
            | Operation::ToVec => OutputKind::Elements,
            Operation::Count => OutputKind::Count,
            Operation::GetWalks(_) => OutputKind::Walks,
            Operation::Chain(chain) => chain.output_kind(),
        }
    }

    /// Whether this operation can follow an operation producing `previous`
    /// (`None` when it is first in the chain).
    pub fn accepts(&self, previous: Option<OutputKind>) -> bool {
        match self {
            Operation::GetElements(_) | Operation::GetWalks(_) => {
                matches!(previous, None | Some(OutputKind::Elements) | Some(OutputKind::Void))
            }
            Operation::GetAllElements(_) => matches!(previous, None | Some(OutputKind::Void)),
            Operation::Limit(_) | Operation::Count | Operation::ToVec => {
                previous == Some(OutputKind::Elements)
            }
            Operation::Chain(chain) => chain
                .operations
                .first()
                .map_or(true, |first| first.accepts(previous)),
        }
    }

    /// Operations that read from the underlying graph rather than from the
    /// previous output.
    pub fn is_source(&self) -> bool {
        matches!(self, Operation::GetElements(_) | Operation::GetAllElements(_))
    }

    /// Operations whose per-delegate results combine into the same answer a
    /// single store would give (concatenate or sum).
    pub fn is_delegate_safe(&self) -> bool {
        matches!(
            self,
            Operation::GetElements(_)
                | Operation::GetAllElements(_)
                | Operation::Count
                | Operation::ToVec
        )
    }

    /// Every view slot this operation owns, walk hops included.
    pub fn views(&self) -> Vec<Option<&View>> {
        match self {
            Operation::GetElements(op) => vec![op.view.as_ref()],
            Operation::GetAllElements(op) => vec![op.view.as_ref()],
            Operation::GetWalks(op) => op.hops.iter().map(|hop| hop.view.as_ref()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn views_mut(&mut self) -> Vec<&mut Option<View>> {
        match self {
            Operation::GetElements(op) => vec![&mut op.view],
            Operation::GetAllElements(op) => vec![&mut op.view],
            Operation::GetWalks(op) => op.hops.iter_mut().map(|hop| &mut hop.view).collect(),
            _ => Vec::new(),
        }
    }

    pub fn owns_view(&self) -> bool {
        !self.views().is_empty()
    }

    /// Explicit seeds, for operations that take them.
    pub fn seeds_mut(&mut self) -> Option<&mut Vec<String>> {
        match self {
            Operation::GetElements(op) => Some(&mut op.seeds),
            Operation::GetWalks(op) => Some(&mut op.seeds),
            _ => None,
        }
    }
}

impl From<GetElements> for Operation {
    fn from(op: GetElements) -> Self {
        Operation::GetElements(op)
    }
}

impl From<GetAllElements> for Operation {
    fn from(op: GetAllElements) -> Self {
        Operation::GetAllElements(op)
    }
}

impl From<GetWalks> for Operation {
    fn from(op: GetWalks) -> Self {
        Operation::GetWalks(op)
    }
}

impl From<Limit> for Operation {
    fn from(op: Limit) -> Self {
        Operation::Limit(op)
    }
}

impl From<OperationChain> for Operation {
    fn from(chain: OperationChain) -> Self {
        Operation::Chain(chain)
    }
}

/// An ordered list of operations, each feeding the next. Chains may nest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationChain {
    pub operations: Vec<Operation>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl OperationChain {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self {
            operations,
            options: BTreeMap::new(),
        }
    }

    pub fn first(operation: impl Into<Operation>) -> Self {
        Self::new(vec![operation.into()])
    }

    pub fn then(mut self, operation: impl Into<Operation>) -> Self {
        self.operations.push(operation.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Leaf operations in declared order, nested chains expanded in place.
    pub fn flatten(&self) -> Vec<Operation> {
        let mut leaves = Vec::with_capacity(self.operations.len());
        collect_leaves(&self.operations, &mut leaves);
        leaves
    }

    /// This chain with nested chains expanded. Options of nested chains are
    /// kept unless the outer chain already sets the same key.
    pub fn flattened(self) -> OperationChain {
        let mut options = BTreeMap::new();
        collect_options(&self.operations, &mut options);
        options.extend(self.options.clone());
        OperationChain {
            operations: self.flatten(),
            options,
        }
    }

    /// Mutable access to every leaf operation, in declared order.
    pub fn leaves_mut(&mut self) -> Vec<&mut Operation> {
        let mut leaves = Vec::with_capacity(self.operations.len());
        collect_leaves_mut(&mut self.operations, &mut leaves);
        leaves
    }

    pub fn output_kind(&self) -> OutputKind {
        self.operations
            .last()
            .map_or(OutputKind::Void, Operation::output_kind)
    }

    /// Graph ids named by the [`GRAPH_IDS_OPTION`] option, if set.
    pub fn graph_ids(&self) -> Option<Vec<String>> {
        self.options.get(GRAPH_IDS_OPTION).map(|ids| {
            ids.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    pub fn operation_names(&self) -> Vec<&'static str> {
        self.operations.iter().map(Operation::name).collect()
    }
}

impl From<Operation> for OperationChain {
    fn from(operation: Operation) -> Self {
        match operation {
            Operation::Chain(chain) => chain,
            other => OperationChain::new(vec![other]),
        }
    }
}

fn collect_leaves(operations: &[Operation], out: &mut Vec<Operation>) {
    for operation in operations {
        match operation {
            Operation::Chain(chain) => collect_leaves(&chain.operations, out),
            leaf => out.push(leaf.clone()),
        }
    }
}

fn collect_leaves_mut<'a>(operations: &'a mut [Operation], out: &mut Vec<&'a mut Operation>) {
    for operation in operations {
        match operation {
            Operation::Chain(chain) => collect_leaves_mut(&mut chain.operations, out),
            leaf => out.push(leaf),
        }
    }
}

fn collect_options(operations: &[Operation], out: &mut BTreeMap<String, String>) {
    for operation in operations {
        if let Operation::Chain(chain) = operation {
            collect_options(&chain.operations, out);
            out.extend(chain.options.clone());
        }
    }
}
