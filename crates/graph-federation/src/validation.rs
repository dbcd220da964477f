//! The validation gate every chain passes before hooks or stores see it.
//!
//! Built-in checks cover chain shape, operation fields and views against the
//! store schema. Extra rules are registered per operation name and run after
//! the built-ins. Validation never touches a store.

use crate::error::GraphError;
use crate::operation::{Operation, OperationChain, OutputKind};
use crate::schema::{Schema, SchemaElementDefinition};
use crate::user::User;
use crate::view::{View, ViewElementDefinition};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn add(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn error_string(&self) -> String {
        self.errors.join(", ")
    }

    /// The rejection to return, if anything failed.
    pub fn into_error(self) -> Option<GraphError> {
        if self.is_valid() {
            None
        } else {
            Some(GraphError::Validation {
                messages: self.errors,
            })
        }
    }
}

pub trait ValidationRule: Send + Sync {
    fn validate(&self, operation: &Operation, user: &User, schema: &Schema) -> ValidationResult;
}

impl<F> ValidationRule for F
where
    F: Fn(&Operation, &User, &Schema) -> ValidationResult + Send + Sync,
{
    fn validate(&self, operation: &Operation, user: &User, schema: &Schema) -> ValidationResult {
        self(operation, user, schema)
    }
}

/// Extra rules keyed by operation name (`"GetElements"`, `"Limit"`, ...).
#[derive(Clone, Default)]
pub struct ValidationRules {
    rules: HashMap<String, Vec<Arc<dyn ValidationRule>>>,
}

impl ValidationRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, operation: impl Into<String>, rule: impl ValidationRule + 'static) -> Self {
        self.rules
            .entry(operation.into())
            .or_default()
            .push(Arc::new(rule));
        self
    }

    pub fn rules_for(&self, operation: &str) -> &[Arc<dyn ValidationRule>] {
        self.rules.get(operation).map_or(&[], Vec::as_slice)
    }
}

impl std::fmt::Debug for ValidationRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: BTreeMap<_, _> = self.rules.iter().map(|(k, v)| (k, v.len())).collect();
        f.debug_struct("ValidationRules").field("rules", &counts).finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OperationValidator {
    rules: ValidationRules,
}

impl OperationValidator {
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }

    pub fn validate(&self, chain: &OperationChain, user: &User, schema: &Schema) -> ValidationResult {
        let operations = chain.flatten();
        let mut result = ValidationResult::new();
        if operations.is_empty() {
            result.add_error("Operation chain contains no operations");
            return result;
        }

        let mut previous: Option<OutputKind> = None;
        for (position, operation) in operations.iter().enumerate() {
            if !operation.accepts(previous) {
                match previous {
                    None => result.add_error(format!("{} cannot start a chain", operation.name())),
                    Some(kind) => result.add_error(format!(
                        "{} cannot take {kind} output as input",
                        operation.name()
                    )),
                }
            }
            validate_fields(operation, position == 0, &mut result);
            for view in operation.views().into_iter().flatten() {
                validate_view(view, schema, &mut result);
            }
            for rule in self.rules.rules_for(operation.name()) {
                result.add(rule.validate(operation, user, schema));
            }
            previous = Some(operation.output_kind());
        }
        result
    }
}

fn validate_fields(operation: &Operation, leading: bool, result: &mut ValidationResult) {
    match operation {
        Operation::GetElements(op) if leading && op.seeds.is_empty() => {
            result.add_error("GetElements requires seeds when it starts a chain")
        }
        Operation::GetWalks(op) => {
            if leading && op.seeds.is_empty() {
                result.add_error("GetWalks requires seeds when it starts a chain");
            }
            if op.hops.is_empty() {
                result.add_error("GetWalks requires at least one hop");
            }
            if op.results_limit == 0 {
                result.add_error("GetWalks results limit must be greater than 0");
            }
        }
        Operation::Limit(limit) if limit.result_limit == 0 => {
            result.add_error("Limit must be greater than 0")
        }
        _ => {}
    }
}

fn validate_view(view: &View, schema: &Schema, result: &mut ValidationResult) {
    let mut view = view.clone();
    view.expand_global_definitions();
    for (group, definition) in &view.entities {
        match schema.entities.get(group) {
            Some(declared) => validate_properties(group, definition, declared, result),
            None if schema.edges.contains_key(group) => {
                result.add_error(format!("{group} is an edge group, not an entity group"))
            }
            None => result.add_error(format!("Entity group {group} is not in the schema")),
        }
    }
    for (group, definition) in &view.edges {
        match schema.edges.get(group) {
            Some(declared) => validate_properties(group, definition, declared, result),
            None if schema.entities.contains_key(group) => {
                result.add_error(format!("{group} is an entity group, not an edge group"))
            }
            None => result.add_error(format!("Edge group {group} is not in the schema")),
        }
    }
}

fn validate_properties(
    group: &str,
    definition: &ViewElementDefinition,
    declared: &SchemaElementDefinition,
    result: &mut ValidationResult,
) {
    for property in definition.referenced_properties() {
        if !declared.has_property(property) {
            result.add_error(format!("Property {property} is not in group {group}"));
        }
    }
}
