//! Declarative description of a concept: its root entity and required relations.

use std::fmt;
use std::rc::Rc;

use conceptgen_core::{Attributes, Record};
use convert_case::{Case, Casing};
use indexmap::IndexMap;
use serde_json::Value;

use crate::concept::ConceptEngine;
use crate::errors::Result;

/// A relation the root must be connected to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDeclaration {
    /// Relation name on the root entity.
    pub relation: String,
    /// Library key; defaults to the relation name.
    pub alias: Option<String>,
    /// Explicit number of related records for many-relations.
    pub count: Option<usize>,
}

impl RelationDeclaration {
    pub fn new(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            alias: None,
            count: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn library_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.relation)
    }
}

/// What a relation handler hands back to the engine.
#[derive(Debug, Clone)]
pub enum Nested {
    /// Use this record as the related instance.
    Record(Record),
    /// Generate the related instance with a nested concept.
    Concept(ConceptDefinition),
}

/// Resolver function registered for a library alias.
pub type Handler = Rc<dyn Fn(&ConceptEngine) -> Result<Nested>>;

/// Immutable template for one concept.
#[derive(Clone)]
pub struct ConceptDefinition {
    name: String,
    entity: String,
    alias: String,
    template: Option<String>,
    attributes: Attributes,
    relations: Vec<RelationDeclaration>,
    instance_count: usize,
    handlers: IndexMap<String, Handler>,
}

impl ConceptDefinition {
    /// `name` is the concept type name in compound-word form (`PersonWithPets`).
    pub fn new(name: impl Into<String>, entity: impl Into<String>) -> Self {
        let entity = entity.into();
        Self {
            name: name.into(),
            alias: entity.to_case(Case::Snake),
            entity,
            template: None,
            attributes: Attributes::new(),
            relations: Vec::new(),
            instance_count: 1,
            handlers: IndexMap::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn attribute(mut self, column: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(column.into(), value);
        self
    }

    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn relation(mut self, declaration: RelationDeclaration) -> Self {
        self.relations.push(declaration);
        self
    }

    pub fn instances(mut self, count: usize) -> Self {
        self.instance_count = count.max(1);
        self
    }

    /// Register a resolver for `alias`, consulted before the default factory.
    pub fn handler<F>(mut self, alias: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&ConceptEngine) -> Result<Nested> + 'static,
    {
        self.handlers.insert(alias.into(), Rc::new(handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry slug: the type name in hyphenated lowercase.
    pub fn slug(&self) -> String {
        self.name.to_case(Case::Kebab)
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn root_alias(&self) -> &str {
        &self.alias
    }

    pub fn template_name(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn default_attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn relations(&self) -> &[RelationDeclaration] {
        &self.relations
    }

    pub fn instance_count(&self) -> usize {
        self.instance_count
    }

    pub fn handler_for(&self, alias: &str) -> Option<Handler> {
        self.handlers.get(alias).cloned()
    }

    pub fn has_handler(&self, alias: &str) -> bool {
        self.handlers.contains_key(alias)
    }

    pub(crate) fn set_attributes(&mut self, attributes: Attributes) {
        self.attributes = attributes;
    }
}

impl fmt::Debug for ConceptDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConceptDefinition")
            .field("name", &self.name)
            .field("entity", &self.entity)
            .field("alias", &self.alias)
            .field("template", &self.template)
            .field("attributes", &self.attributes)
            .field("relations", &self.relations)
            .field("instance_count", &self.instance_count)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_is_hyphenated_lowercase() {
        let definition = ConceptDefinition::new("PersonWithPets", "Person");
        assert_eq!(definition.slug(), "person-with-pets");
    }

    #[test]
    fn root_alias_defaults_to_snake_case_entity() {
        let definition = ConceptDefinition::new("Checkout", "OrderLine");
        assert_eq!(definition.root_alias(), "order_line");
    }

    #[test]
    fn declaration_alias_falls_back_to_relation() {
        assert_eq!(RelationDeclaration::new("pets").library_alias(), "pets");
        assert_eq!(
            RelationDeclaration::new("pets").alias("animals").library_alias(),
            "animals"
        );
    }

    #[test]
    fn instance_count_never_drops_below_one() {
        let definition = ConceptDefinition::new("Empty", "Person").instances(0);
        assert_eq!(definition.instance_count(), 1);
    }
}
