//! In-memory store: elements in insertion order plus a vertex index.

use crate::context::Context;
use crate::element::{Direction, Element};
use crate::error::{GraphError, Result};
use crate::handler::{run_chain, ElementSource};
use crate::operation::{Operation, OperationChain};
use crate::schema::Schema;
use crate::store::{QueryOutput, Store};
use crate::stream::{ElementStream, IterStream};
use crate::view::View;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

pub struct MapStore {
    schema: Schema,
    elements: RwLock<Vec<Element>>,
    /// vertex -> positions in `elements` of every element touching it
    index: DashMap<String, Vec<usize>>,
    open_streams: Arc<AtomicUsize>,
}

impl MapStore {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            elements: RwLock::new(Vec::new()),
            index: DashMap::new(),
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Appends elements. An element of a group the schema does not declare
    /// rejects the whole batch.
    pub fn add_elements(&self, batch: impl IntoIterator<Item = Element>) -> Result<usize> {
        let batch: Vec<Element> = batch.into_iter().collect();
        if let Some(unknown) = batch.iter().find(|e| !self.declares(e)) {
            return Err(GraphError::Store(anyhow::anyhow!(
                "group {} is not in the schema",
                unknown.group()
            )));
        }

        let mut elements = self.elements.write().unwrap_or_else(PoisonError::into_inner);
        let added = batch.len();
        for element in batch {
            let position = elements.len();
            for vertex in vertices(&element) {
                self.index.entry(vertex.to_string()).or_default().push(position);
            }
            elements.push(element);
        }
        debug!(added, total = elements.len(), "added elements to map store");
        Ok(added)
    }

    pub fn len(&self) -> usize {
        self.elements.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Streams handed out and not closed yet.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    fn declares(&self, element: &Element) -> bool {
        match element {
            Element::Entity(entity) => self.schema.entities.contains_key(&entity.group),
            Element::Edge(edge) => self.schema.edges.contains_key(&edge.group),
        }
    }

    fn seeded(&self, seeds: &[String], direction: Direction) -> Vec<Element> {
        let elements = self.elements.read().unwrap_or_else(PoisonError::into_inner);
        let mut seen = BTreeSet::new();
        let mut matched = Vec::new();
        for seed in seeds {
            let Some(positions) = self.index.get(seed.as_str()) else {
                continue;
            };
            for &position in positions.iter() {
                let element = &elements[position];
                if element.matches_seed(seed, direction) && seen.insert(position) {
                    matched.push(element.clone());
                }
            }
        }
        matched
    }

    fn stream(&self, matched: Vec<Element>, view: Option<View>) -> ElementStream {
        let view = view.map(|mut view| {
            view.expand_global_definitions();
            view
        });
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        let open_streams = self.open_streams.clone();
        let filtered = matched.into_iter().filter_map(move |element| match &view {
            Some(view) => view.apply(element),
            None => Some(element),
        });
        ElementStream::new(IterStream::new(filtered).on_close(move || {
            open_streams.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }))
    }
}

fn vertices(element: &Element) -> Vec<&str> {
    match element {
        Element::Entity(entity) => vec![entity.vertex.as_str()],
        Element::Edge(edge) if edge.source == edge.destination => vec![edge.source.as_str()],
        Element::Edge(edge) => vec![edge.source.as_str(), edge.destination.as_str()],
    }
}

#[async_trait]
impl ElementSource for MapStore {
    async fn fetch(&self, operation: Operation, _ctx: &Context) -> Result<ElementStream> {
        match operation {
            Operation::GetElements(op) => {
                let matched = self.seeded(&op.seeds, op.direction);
                Ok(self.stream(matched, op.view))
            }
            Operation::GetAllElements(op) => {
                let all = self
                    .elements
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                Ok(self.stream(all, op.view))
            }
            other => Err(GraphError::UnsupportedOperation {
                operation: other.name(),
                reason: "not a source operation".to_string(),
            }),
        }
    }
}

#[async_trait]
impl Store for MapStore {
    fn schema(&self) -> Schema {
        self.schema.clone()
    }

    async fn execute(&self, chain: OperationChain, ctx: &Context) -> Result<QueryOutput> {
        run_chain(self, chain.flattened().operations, None, ctx).await
    }
}
