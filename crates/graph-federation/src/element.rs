//! Graph elements as they flow out of stores.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A single property value. Floats are wrapped so elements stay `Ord` and can
/// be kept in ordered sets (adjacency maps, walks).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    String(String),
}

impl PropertyValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(v) => Some(*v as f64),
            PropertyValue::Float(v) => Some(v.into_inner()),
            _ => None,
        }
    }

    /// Compares numerically across int/float, otherwise only within a variant.
    pub fn compare(&self, other: &PropertyValue) -> Option<Ordering> {
        match (self, other) {
            (PropertyValue::String(a), PropertyValue::String(b)) => Some(a.cmp(b)),
            (PropertyValue::Bool(a), PropertyValue::Bool(b)) => Some(a.cmp(b)),
            _ => {
                let (a, b) = (self.as_f64()?, other.as_f64()?);
                a.partial_cmp(&b)
            }
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Int(i64::from(value))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(OrderedFloat(value))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

pub type Properties = BTreeMap<String, PropertyValue>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub group: String,
    pub vertex: String,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub group: String,
    pub source: String,
    pub destination: String,
    #[serde(default = "default_directed")]
    pub directed: bool,
    #[serde(default)]
    pub properties: Properties,
}

fn default_directed() -> bool {
    true
}

/// Which side of a seed an edge may be followed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Either,
    Outgoing,
    Incoming,
}

impl Edge {
    pub fn new(
        group: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            source: source.into(),
            destination: destination.into(),
            directed: true,
            properties: Properties::new(),
        }
    }

    pub fn undirected(mut self) -> Self {
        self.directed = false;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// The vertex reached when leaving `vertex` along this edge, if the edge
    /// can be traversed from it in `direction`.
    pub fn adjacent_to(&self, vertex: &str, direction: Direction) -> Option<&str> {
        let from_source = self.source == vertex;
        let from_destination = self.destination == vertex;
        match direction {
            Direction::Either if from_source => Some(self.destination.as_str()),
            Direction::Either if from_destination => Some(self.source.as_str()),
            Direction::Outgoing if from_source => Some(self.destination.as_str()),
            Direction::Outgoing if from_destination && !self.directed => Some(self.source.as_str()),
            Direction::Incoming if from_destination => Some(self.source.as_str()),
            Direction::Incoming if from_source && !self.directed => Some(self.destination.as_str()),
            _ => None,
        }
    }
}

impl Entity {
    pub fn new(group: impl Into<String>, vertex: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            vertex: vertex.into(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum Element {
    Entity(Entity),
    Edge(Edge),
}

impl Element {
    pub fn group(&self) -> &str {
        match self {
            Element::Entity(entity) => &entity.group,
            Element::Edge(edge) => &edge.group,
        }
    }

    pub fn properties(&self) -> &Properties {
        match self {
            Element::Entity(entity) => &entity.properties,
            Element::Edge(edge) => &edge.properties,
        }
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        match self {
            Element::Entity(entity) => &mut entity.properties,
            Element::Edge(edge) => &mut edge.properties,
        }
    }

    pub fn is_entity(&self) -> bool {
        matches!(self, Element::Entity(_))
    }

    /// Vertex used as a seed when this element feeds the next operation:
    /// an entity's own vertex, an edge's destination.
    pub fn seed_vertex(&self) -> &str {
        match self {
            Element::Entity(entity) => &entity.vertex,
            Element::Edge(edge) => &edge.destination,
        }
    }

    /// Whether a seed on `vertex` reaches this element in `direction`.
    pub fn matches_seed(&self, vertex: &str, direction: Direction) -> bool {
        match self {
            Element::Entity(entity) => entity.vertex == vertex,
            Element::Edge(edge) => edge.adjacent_to(vertex, direction).is_some(),
        }
    }
}

impl From<Entity> for Element {
    fn from(entity: Entity) -> Self {
        Element::Entity(entity)
    }
}

impl From<Edge> for Element {
    fn from(edge: Edge) -> Self {
        Element::Edge(edge)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = if self.directed { "->" } else { "--" };
        write!(f, "{}[{} {} {}]", self.group, self.source, arrow, self.destination)
    }
}
