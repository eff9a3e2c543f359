use indexmap::IndexMap;
use tracing::debug;

use crate::definition::ConceptDefinition;

/// Concept definitions addressable by slug.
#[derive(Debug, Clone, Default)]
pub struct ConceptRegistry {
    concepts: IndexMap<String, ConceptDefinition>,
}

impl ConceptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition under its slug, replacing any previous holder.
    pub fn register(&mut self, definition: ConceptDefinition) -> String {
        let slug = definition.slug();
        if self.concepts.insert(slug.clone(), definition).is_some() {
            debug!(slug = %slug, "concept re-registered");
        }
        slug
    }

    pub fn find_in_registry(&self, slug: &str) -> Option<&ConceptDefinition> {
        self.concepts.get(slug)
    }

    /// Slug to concept-name mapping, in registration order.
    pub fn registry(&self) -> IndexMap<String, String> {
        self.concepts
            .iter()
            .map(|(slug, definition)| (slug.clone(), definition.name().to_string()))
            .collect()
    }

    pub fn slugs(&self) -> impl Iterator<Item = &str> {
        self.concepts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }
}
