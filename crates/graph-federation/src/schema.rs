use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Property names (and their declared type names) for one element group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaElementDefinition {
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl SchemaElementDefinition {
    pub fn with_property(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.properties.insert(name.into(), type_name.into());
        self
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }
}

/// The groups a store knows about. Loading and type checking live outside
/// this crate; the core only needs group membership and property names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub entities: BTreeMap<String, SchemaElementDefinition>,
    #[serde(default)]
    pub edges: BTreeMap<String, SchemaElementDefinition>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, group: impl Into<String>, definition: SchemaElementDefinition) -> Self {
        self.entities.insert(group.into(), definition);
        self
    }

    pub fn edge(mut self, group: impl Into<String>, definition: SchemaElementDefinition) -> Self {
        self.edges.insert(group.into(), definition);
        self
    }

    pub fn entity_groups(&self) -> BTreeSet<String> {
        self.entities.keys().cloned().collect()
    }

    pub fn edge_groups(&self) -> BTreeSet<String> {
        self.edges.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.edges.is_empty()
    }

    /// Union of two schemas. On a shared group the property sets are combined.
    pub fn merge(&mut self, other: &Schema) {
        for (group, definition) in &other.entities {
            self.entities
                .entry(group.clone())
                .or_default()
                .properties
                .extend(definition.properties.clone());
        }
        for (group, definition) in &other.edges {
            self.edges
                .entry(group.clone())
                .or_default()
                .properties
                .extend(definition.properties.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_unions_groups_and_properties() {
        let mut left = Schema::new()
            .entity("person", SchemaElementDefinition::default().with_property("age", "int"));
        let right = Schema::new()
            .entity("person", SchemaElementDefinition::default().with_property("name", "string"))
            .edge("knows", SchemaElementDefinition::default());

        left.merge(&right);

        assert_eq!(left.edge_groups(), BTreeSet::from(["knows".to_string()]));
        let person = &left.entities["person"];
        assert!(person.has_property("age"));
        assert!(person.has_property("name"));
    }
}
