use crate::adjacency::{AdjacencyMap, AdjacencyMaps, PrunedAdjacencyMaps};
use crate::context::Context;
use crate::element::{Edge, Element};
use crate::error::{GraphError, Result};
use crate::handler::ElementSource;
use crate::operation::{GetWalks, Operation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// One walk: `vertices[i]` to `vertices[i + 1]` through `edges[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Walk {
    pub vertices: Vec<String>,
    pub edges: Vec<BTreeSet<Edge>>,
}

impl Walk {
    pub fn source_vertex(&self) -> Option<&str> {
        self.vertices.first().map(String::as_str)
    }

    pub fn destination_vertex(&self) -> Option<&str> {
        self.vertices.last().map(String::as_str)
    }

    /// Number of hops.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl fmt::Display for Walk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.vertices.join(" -> "))
    }
}

pub type WalkMaps = PrunedAdjacencyMaps<String, Edge>;

/// Runs every hop of `op` against `source`, folding each hop into pruned
/// adjacency maps, then lists every walk that reaches the last hop.
pub async fn get_walks<S>(source: &S, op: GetWalks, ctx: &Context) -> Result<Vec<Walk>>
where
    S: ElementSource + ?Sized,
{
    let mut seen = BTreeSet::new();
    let seeds: Vec<String> = op
        .seeds
        .into_iter()
        .filter(|seed| seen.insert(seed.clone()))
        .collect();

    let mut maps = WalkMaps::new();
    let mut frontier: BTreeSet<String> = seeds.iter().cloned().collect();

    for (index, mut hop) in op.hops.into_iter().enumerate() {
        if ctx.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        let mut map = AdjacencyMap::new();
        if !frontier.is_empty() {
            let direction = hop.direction;
            hop.seeds = frontier.iter().cloned().collect();
            let elements = source
                .fetch(Operation::GetElements(hop), ctx)
                .await?
                .collect_all()
                .await?;
            for element in elements {
                if let Element::Edge(edge) = element {
                    fold_edge(&mut map, &frontier, edge, direction);
                }
            }
        }
        debug!(hop = index, edges = map.edge_count(), "walk hop fetched");
        frontier = map.all_destinations();
        maps.add(map);
    }

    enumerate_walks(&seeds, &maps, op.results_limit)
}

fn fold_edge(
    map: &mut AdjacencyMap<String, Edge>,
    frontier: &BTreeSet<String>,
    edge: Edge,
    direction: crate::element::Direction,
) {
    let mut steps = Vec::with_capacity(2);
    for from in [&edge.source, &edge.destination] {
        if frontier.contains(from) {
            if let Some(to) = edge.adjacent_to(from, direction) {
                steps.push((from.clone(), to.to_string()));
            }
        }
    }
    steps.dedup();
    for (from, to) in steps {
        map.put_edge(from, to, edge.clone());
    }
}

fn enumerate_walks(seeds: &[String], maps: &WalkMaps, limit: usize) -> Result<Vec<Walk>> {
    let hops = maps.as_slice();
    let mut walks = Vec::new();
    if hops.is_empty() {
        return Ok(walks);
    }

    for seed in seeds {
        let mut pending = vec![vec![seed.clone()]];
        while let Some(path) = pending.pop() {
            let depth = path.len() - 1;
            if depth == hops.len() {
                walks.push(to_walk(path, maps));
                if walks.len() > limit {
                    return Err(GraphError::ResultsLimitExceeded { limit });
                }
                continue;
            }
            let last = &path[depth];
            let next: Vec<&String> = hops[depth].destinations_from(last).collect();
            // Reversed so the stack pops destinations in ascending order.
            for destination in next.into_iter().rev() {
                let mut extended = path.clone();
                extended.push(destination.clone());
                pending.push(extended);
            }
        }
    }
    Ok(walks)
}

fn to_walk(vertices: Vec<String>, maps: &WalkMaps) -> Walk {
    let edges = vertices
        .windows(2)
        .enumerate()
        .map(|(hop, pair)| {
            maps.get(hop)
                .and_then(|map| map.edges_between(&pair[0], &pair[1]))
                .cloned()
                .unwrap_or_default()
        })
        .collect();
    Walk { vertices, edges }
}
