//! Views: a declarative, per-group description of which elements and which
//! properties an operation may see.
//!
//! A view maps entity groups and edge groups to a [`ViewElementDefinition`].
//! Global definitions apply to every group (or to a listed subset) until
//! [`View::expand_global_definitions`] folds them into the group definitions.
//! Views merge by union of groups with the later view winning per group.

use crate::element::{Element, PropertyValue};
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    Exists,
    IsEqual {
        value: PropertyValue,
    },
    IsMoreThan {
        value: PropertyValue,
        #[serde(default)]
        or_equal_to: bool,
    },
    IsLessThan {
        value: PropertyValue,
        #[serde(default)]
        or_equal_to: bool,
    },
    IsIn {
        values: Vec<PropertyValue>,
    },
}

impl Predicate {
    pub fn test(&self, value: Option<&PropertyValue>) -> bool {
        match (self, value) {
            (Predicate::Exists, value) => value.is_some(),
            (_, None) => false,
            (Predicate::IsEqual { value: expected }, Some(actual)) => actual == expected,
            (Predicate::IsMoreThan { value: bound, or_equal_to }, Some(actual)) => {
                match actual.compare(bound) {
                    Some(Ordering::Greater) => true,
                    Some(Ordering::Equal) => *or_equal_to,
                    _ => false,
                }
            }
            (Predicate::IsLessThan { value: bound, or_equal_to }, Some(actual)) => {
                match actual.compare(bound) {
                    Some(Ordering::Less) => true,
                    Some(Ordering::Equal) => *or_equal_to,
                    _ => false,
                }
            }
            (Predicate::IsIn { values }, Some(actual)) => values.contains(actual),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFilter {
    pub property: String,
    pub predicate: Predicate,
}

impl PropertyFilter {
    pub fn new(property: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            property: property.into(),
            predicate,
        }
    }
}

/// Filtering and projection for one element group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewElementDefinition {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<PropertyFilter>,
    /// When set, only these properties are returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub exclude_properties: BTreeSet<String>,
    /// Properties results are grouped by when a store aggregates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<BTreeSet<String>>,
}

impl ViewElementDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, property: impl Into<String>, predicate: Predicate) -> Self {
        self.filters.push(PropertyFilter::new(property, predicate));
        self
    }

    pub fn properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn exclude_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_properties
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn group_by<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Every property this definition mentions.
    pub fn referenced_properties(&self) -> BTreeSet<&str> {
        let mut names: BTreeSet<&str> = self.filters.iter().map(|f| f.property.as_str()).collect();
        if let Some(properties) = &self.properties {
            names.extend(properties.iter().map(String::as_str));
        }
        names.extend(self.exclude_properties.iter().map(String::as_str));
        if let Some(group_by) = &self.group_by {
            names.extend(group_by.iter().map(String::as_str));
        }
        names
    }

    /// Folds a global definition into this one. Global filters run first,
    /// projection and group-by are inherited only when unset here, exclusions
    /// accumulate.
    fn absorb_global(&mut self, global: &ViewElementDefinition) {
        if !global.filters.is_empty() {
            let mut filters = global.filters.clone();
            filters.append(&mut self.filters);
            self.filters = filters;
        }
        if self.properties.is_none() {
            self.properties = global.properties.clone();
        }
        if self.group_by.is_none() {
            self.group_by = global.group_by.clone();
        }
        self.exclude_properties
            .extend(global.exclude_properties.iter().cloned());
    }

    /// Runs the filters, then projects the surviving element's properties.
    pub fn apply(&self, mut element: Element) -> Option<Element> {
        let passes = self
            .filters
            .iter()
            .all(|f| f.predicate.test(element.properties().get(&f.property)));
        if !passes {
            return None;
        }
        let properties = element.properties_mut();
        if let Some(keep) = &self.properties {
            properties.retain(|name, _| keep.contains(name));
        }
        if !self.exclude_properties.is_empty() {
            properties.retain(|name, _| !self.exclude_properties.contains(name));
        }
        Some(element)
    }
}

/// A definition that applies to all groups, or to `groups` when given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalViewElementDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<BTreeSet<String>>,
    #[serde(flatten)]
    pub definition: ViewElementDefinition,
}

impl GlobalViewElementDefinition {
    pub fn all_groups(definition: ViewElementDefinition) -> Self {
        Self {
            groups: None,
            definition,
        }
    }

    fn applies_to(&self, group: &str) -> bool {
        self.groups.as_ref().map_or(true, |groups| groups.contains(group))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    #[serde(default)]
    pub entities: BTreeMap<String, ViewElementDefinition>,
    #[serde(default)]
    pub edges: BTreeMap<String, ViewElementDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_elements: Vec<GlobalViewElementDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_entities: Vec<GlobalViewElementDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_edges: Vec<GlobalViewElementDefinition>,
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, group: impl Into<String>, definition: ViewElementDefinition) -> Self {
        self.entities.insert(group.into(), definition);
        self
    }

    pub fn edge(mut self, group: impl Into<String>, definition: ViewElementDefinition) -> Self {
        self.edges.insert(group.into(), definition);
        self
    }

    pub fn global_element(mut self, global: GlobalViewElementDefinition) -> Self {
        self.global_elements.push(global);
        self
    }

    pub fn global_entity(mut self, global: GlobalViewElementDefinition) -> Self {
        self.global_entities.push(global);
        self
    }

    pub fn global_edge(mut self, global: GlobalViewElementDefinition) -> Self {
        self.global_edges.push(global);
        self
    }

    /// Every group `schema` declares, unfiltered.
    pub fn from_schema(schema: &Schema) -> View {
        View {
            entities: schema
                .entities
                .keys()
                .map(|group| (group.clone(), ViewElementDefinition::new()))
                .collect(),
            edges: schema
                .edges
                .keys()
                .map(|group| (group.clone(), ViewElementDefinition::new()))
                .collect(),
            ..View::default()
        }
    }

    pub fn has_groups(&self) -> bool {
        !self.entities.is_empty() || !self.edges.is_empty()
    }

    pub fn has_global_definitions(&self) -> bool {
        !self.global_elements.is_empty()
            || !self.global_entities.is_empty()
            || !self.global_edges.is_empty()
    }

    pub fn groups(&self) -> BTreeSet<&str> {
        self.entities
            .keys()
            .chain(self.edges.keys())
            .map(String::as_str)
            .collect()
    }

    /// Unions the groups of `other` into this view. `other` wins on a shared
    /// group; global definitions are appended.
    pub fn merge(&mut self, other: &View) {
        self.entities
            .extend(other.entities.iter().map(|(g, d)| (g.clone(), d.clone())));
        self.edges
            .extend(other.edges.iter().map(|(g, d)| (g.clone(), d.clone())));
        self.global_elements
            .extend(other.global_elements.iter().cloned());
        self.global_entities
            .extend(other.global_entities.iter().cloned());
        self.global_edges.extend(other.global_edges.iter().cloned());
    }

    pub fn merged(mut self, other: &View) -> View {
        self.merge(other);
        self
    }

    /// Makes all filtering explicit: every global definition is folded into
    /// the group definitions it applies to and the globals are dropped.
    pub fn expand_global_definitions(&mut self) {
        if !self.has_global_definitions() {
            return;
        }
        for (group, definition) in self.entities.iter_mut() {
            for global in self.global_elements.iter().chain(&self.global_entities) {
                if global.applies_to(group) {
                    definition.absorb_global(&global.definition);
                }
            }
        }
        for (group, definition) in self.edges.iter_mut() {
            for global in self.global_elements.iter().chain(&self.global_edges) {
                if global.applies_to(group) {
                    definition.absorb_global(&global.definition);
                }
            }
        }
        self.global_elements.clear();
        self.global_entities.clear();
        self.global_edges.clear();
    }

    /// A copy holding only the groups `schema` declares, with globals kept.
    pub fn restricted_to(&self, schema: &Schema) -> View {
        View {
            entities: self
                .entities
                .iter()
                .filter(|(group, _)| schema.entities.contains_key(*group))
                .map(|(g, d)| (g.clone(), d.clone()))
                .collect(),
            edges: self
                .edges
                .iter()
                .filter(|(group, _)| schema.edges.contains_key(*group))
                .map(|(g, d)| (g.clone(), d.clone()))
                .collect(),
            global_elements: self.global_elements.clone(),
            global_entities: self.global_entities.clone(),
            global_edges: self.global_edges.clone(),
        }
    }

    /// Filters and projects one element. Elements of a group the view does
    /// not name are dropped. Expects expanded globals; unexpanded ones are
    /// still honoured, at the cost of a per-element merge.
    pub fn apply(&self, element: Element) -> Option<Element> {
        let (definition, globals): (_, Vec<_>) = match &element {
            Element::Entity(entity) => (
                self.entities.get(&entity.group)?,
                self.global_elements.iter().chain(&self.global_entities).collect(),
            ),
            Element::Edge(edge) => (
                self.edges.get(&edge.group)?,
                self.global_elements.iter().chain(&self.global_edges).collect(),
            ),
        };
        if globals.is_empty() {
            return definition.apply(element);
        }
        let mut effective = definition.clone();
        for global in globals.into_iter().filter(|g| g.applies_to(element.group())) {
            effective.absorb_global(&global.definition);
        }
        effective.apply(element)
    }

    pub fn to_json_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> crate::Result<View> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
