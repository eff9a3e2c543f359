use std::collections::BTreeMap;
use std::ops::Range;

use conceptgen_core::{Attributes, ColumnRules, PivotInfo, RelationInfo, RelationKind};
use indexmap::IndexMap;
use serde::Deserialize;
use toml::Spanned;

/// Declarative description of entities, factory templates and concepts.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Blueprint {
    /// Entity types keyed by name (ex.: `Person`).
    #[serde(default)]
    pub entities: IndexMap<String, EntityBlueprint>,
    /// Concepts keyed by their compound-word type name.
    #[serde(default)]
    pub concepts: IndexMap<String, ConceptBlueprint>,
    /// Where the blueprint was read from; used in template locations.
    #[serde(skip)]
    origin: String,
    /// Byte offsets at which each source line starts.
    #[serde(skip)]
    line_starts: Vec<usize>,
}

/// One entity type: constraints, factory templates and relations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityBlueprint {
    /// Columns whose values must be unique across records.
    #[serde(default)]
    pub unique: Vec<String>,
    /// Per-column constraints.
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnRules>,
    /// Named factory templates; `default` is used when none is named.
    #[serde(default)]
    pub templates: IndexMap<String, Spanned<TemplateBlueprint>>,
    /// Relations exposed by the entity, keyed by relation name.
    #[serde(default)]
    pub relations: IndexMap<String, RelationBlueprint>,
}

/// Attribute values a factory template produces.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateBlueprint {
    /// String values may contain `{n}`, replaced by the record sequence number.
    #[serde(default)]
    pub attributes: Attributes,
}

/// Relation metadata declared on an entity.
#[derive(Debug, Clone, Deserialize)]
pub struct RelationBlueprint {
    pub kind: RelationKind,
    pub target: String,
    pub foreign_key: String,
    #[serde(default)]
    pub morph_type: Option<String>,
    #[serde(default)]
    pub pivot: Option<PivotInfo>,
}

impl RelationBlueprint {
    pub fn to_info(&self, name: &str) -> RelationInfo {
        let mut info = RelationInfo::new(name, self.kind, &self.target, &self.foreign_key);
        if let Some(column) = &self.morph_type {
            info = info.with_morph_type(column);
        }
        if let Some(pivot) = &self.pivot {
            info = info.with_pivot(pivot.clone());
        }
        info
    }
}

/// A concept: root entity, default attributes and required relations.
#[derive(Debug, Clone, Deserialize)]
pub struct ConceptBlueprint {
    pub entity: String,
    /// Library alias for the root; defaults to the snake-cased entity name.
    #[serde(default)]
    pub alias: Option<String>,
    /// Factory template for the root record.
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub relations: Vec<DeclarationBlueprint>,
    /// Instances produced when the concept is nested under a many-relation.
    #[serde(default = "default_instances")]
    pub instances: usize,
    /// Library alias → handler producing the related instance.
    #[serde(default)]
    pub handlers: IndexMap<String, HandlerBlueprint>,
}

fn default_instances() -> usize {
    1
}

/// A relation a concept requires.
#[derive(Debug, Clone, Deserialize)]
pub struct DeclarationBlueprint {
    pub relation: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub count: Option<usize>,
}

impl DeclarationBlueprint {
    pub fn library_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.relation)
    }
}

/// How a handler produces its instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HandlerBlueprint {
    /// Generate it with another concept.
    Concept { concept: String },
    /// Build one record of `entity` from a named factory template.
    Record {
        entity: String,
        #[serde(default)]
        template: Option<String>,
    },
}

impl Blueprint {
    /// Parse blueprint TOML; `origin` names the source in template locations.
    pub fn from_toml_str(content: &str, origin: impl Into<String>) -> Result<Self, toml::de::Error> {
        let mut blueprint: Blueprint = toml::from_str(content)?;
        blueprint.origin = origin.into();
        blueprint.line_starts = std::iter::once(0)
            .chain(content.match_indices('\n').map(|(offset, _)| offset + 1))
            .collect();
        Ok(blueprint)
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// `origin:line` of the span, with 1-based lines.
    pub fn location(&self, span: Range<usize>) -> String {
        let line = self
            .line_starts
            .partition_point(|start| *start <= span.start)
            .max(1);
        format!("{}:{}", self.origin, line)
    }

    /// Source location of an entity template, if the entity defines it.
    pub fn template_location(&self, entity: &str, template: &str) -> Option<String> {
        let spanned = self.entities.get(entity)?.templates.get(template)?;
        Some(self.location(spanned.span()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"
[entities.Person]
unique = ["email"]

[entities.Person.templates.default]
attributes = { email = "person{n}@example.com" }

[entities.Person.relations.pets]
kind = "has_many"
target = "Pet"
foreign_key = "person_id"

[concepts.PersonWithPets]
entity = "Person"
relations = [{ relation = "pets", count = 3 }]
handlers = { pets = { concept = "LonelyPet" }, vet = { entity = "Vet", template = "senior" } }
"#;

    #[test]
    fn parses_entities_and_concepts() {
        let blueprint = Blueprint::from_toml_str(SAMPLE, "concepts.toml").expect("parse");

        let person = blueprint.entities.get("Person").expect("person");
        assert_eq!(person.unique, ["email"]);
        let template = person.templates.get("default").expect("template");
        assert_eq!(
            template.get_ref().attributes.get("email"),
            Some(&json!("person{n}@example.com"))
        );
        assert_eq!(
            person.relations.get("pets").map(|r| r.to_info("pets").kind),
            Some(RelationKind::HasMany)
        );

        let concept = blueprint.concepts.get("PersonWithPets").expect("concept");
        assert_eq!(concept.instances, 1);
        assert_eq!(concept.relations[0].count, Some(3));
        assert_eq!(
            concept.handlers.get("pets"),
            Some(&HandlerBlueprint::Concept {
                concept: "LonelyPet".to_string()
            })
        );
        assert_eq!(
            concept.handlers.get("vet"),
            Some(&HandlerBlueprint::Record {
                entity: "Vet".to_string(),
                template: Some("senior".to_string())
            })
        );
    }

    #[test]
    fn template_locations_point_at_the_table() {
        let blueprint = Blueprint::from_toml_str(SAMPLE, "concepts.toml").expect("parse");
        let location = blueprint
            .template_location("Person", "default")
            .expect("location");

        let line: usize = location
            .strip_prefix("concepts.toml:")
            .and_then(|line| line.parse().ok())
            .expect("line number");
        assert!(line >= 2, "unexpected line {line}");
        assert!(blueprint.template_location("Person", "vip").is_none());
    }
}
