//! Per-hop adjacency information for multi-hop walks.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Write as _};

/// One hop of a walk: source vertex -> destination vertex -> edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjacencyMap<V, E> {
    edges: BTreeMap<V, BTreeMap<V, BTreeSet<E>>>,
}

impl<V: Ord, E: Ord> Default for AdjacencyMap<V, E> {
    fn default() -> Self {
        Self {
            edges: BTreeMap::new(),
        }
    }
}

impl<V, E> AdjacencyMap<V, E>
where
    V: Ord + Clone,
    E: Ord,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_edge(&mut self, source: V, destination: V, edge: E) {
        self.edges
            .entry(source)
            .or_default()
            .entry(destination)
            .or_default()
            .insert(edge);
    }

    pub fn put_edges(&mut self, source: V, destination: V, edges: impl IntoIterator<Item = E>) {
        self.edges
            .entry(source)
            .or_default()
            .entry(destination)
            .or_default()
            .extend(edges);
    }

    pub fn edges_between(&self, source: &V, destination: &V) -> Option<&BTreeSet<E>> {
        self.edges.get(source)?.get(destination)
    }

    pub fn destinations_from(&self, source: &V) -> impl Iterator<Item = &V> {
        self.edges.get(source).into_iter().flat_map(BTreeMap::keys)
    }

    pub fn sources_to<'a>(&'a self, destination: &'a V) -> impl Iterator<Item = &'a V> + 'a {
        self.edges
            .iter()
            .filter(move |(_, row)| row.contains_key(destination))
            .map(|(source, _)| source)
    }

    pub fn all_sources(&self) -> BTreeSet<V> {
        self.edges.keys().cloned().collect()
    }

    pub fn all_destinations(&self) -> BTreeSet<V> {
        self.edges
            .values()
            .flat_map(BTreeMap::keys)
            .cloned()
            .collect()
    }

    pub fn contains_source(&self, vertex: &V) -> bool {
        self.edges.contains_key(vertex)
    }

    /// Drops every entry ending at `destination`. A source left without any
    /// destination is dropped too, so it stops counting as a source.
    pub fn remove_all_with_destination(&mut self, destination: &V) {
        self.edges.retain(|_, row| {
            row.remove(destination);
            !row.is_empty()
        });
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges
            .values()
            .flat_map(BTreeMap::values)
            .map(BTreeSet::len)
            .sum()
    }
}

impl<V: Display, E> Display for AdjacencyMap<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: Vec<String> = self
            .edges
            .iter()
            .flat_map(|(source, row)| {
                row.iter()
                    .map(move |(destination, edges)| format!("{source}->{destination} ({})", edges.len()))
            })
            .collect();
        write!(f, "{{{}}}", rows.join(", "))
    }
}

/// An ordered sequence of hops, index = hop number.
pub trait AdjacencyMaps<V, E> {
    fn add(&mut self, hop: AdjacencyMap<V, E>);

    fn as_slice(&self) -> &[AdjacencyMap<V, E>];

    fn get(&self, hop: usize) -> Option<&AdjacencyMap<V, E>> {
        self.as_slice().get(hop)
    }

    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    fn pretty_print(&self) -> String
    where
        V: Display,
    {
        let mut out = String::new();
        for (hop, map) in self.as_slice().iter().enumerate() {
            let _ = writeln!(out, "Hop {hop}: {map}");
        }
        out
    }
}

/// Keeps every hop as added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleAdjacencyMaps<V, E> {
    maps: Vec<AdjacencyMap<V, E>>,
}

impl<V, E> Default for SimpleAdjacencyMaps<V, E> {
    fn default() -> Self {
        Self { maps: Vec::new() }
    }
}

impl<V, E> AdjacencyMaps<V, E> for SimpleAdjacencyMaps<V, E> {
    fn add(&mut self, hop: AdjacencyMap<V, E>) {
        self.maps.push(hop);
    }

    fn as_slice(&self) -> &[AdjacencyMap<V, E>] {
        &self.maps
    }
}

/// Hops that stay joined up end to end.
///
/// On every `add`, destinations of the previous hop that are not sources of
/// the new hop are orphans and get removed. Removing them can orphan
/// destinations one hop further back, so the check walks backward over every
/// earlier hop down to hop 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunedAdjacencyMaps<V, E> {
    maps: Vec<AdjacencyMap<V, E>>,
}

impl<V, E> Default for PrunedAdjacencyMaps<V, E> {
    fn default() -> Self {
        Self { maps: Vec::new() }
    }
}

impl<V, E> PrunedAdjacencyMaps<V, E>
where
    V: Ord + Clone,
    E: Ord,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_vec(self) -> Vec<AdjacencyMap<V, E>> {
        self.maps
    }

    fn remove_orphans(&mut self, newest: &AdjacencyMap<V, E>) {
        let mut next_sources = newest.all_sources();
        for prev in self.maps.iter_mut().rev() {
            let orphans: Vec<V> = prev
                .all_destinations()
                .into_iter()
                .filter(|destination| !next_sources.contains(destination))
                .collect();
            for destination in &orphans {
                prev.remove_all_with_destination(destination);
            }
            next_sources = prev.all_sources();
        }
    }
}

impl<V, E> AdjacencyMaps<V, E> for PrunedAdjacencyMaps<V, E>
where
    V: Ord + Clone,
    E: Ord,
{
    fn add(&mut self, hop: AdjacencyMap<V, E>) {
        self.remove_orphans(&hop);
        self.maps.push(hop);
    }

    fn as_slice(&self) -> &[AdjacencyMap<V, E>] {
        &self.maps
    }
}
