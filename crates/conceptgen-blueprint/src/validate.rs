use std::collections::{HashMap, HashSet};

use conceptgen_core::{DEFAULT_TEMPLATE, RelationKind};
use convert_case::{Case, Casing};

use crate::errors::{ValidationIssue, ValidationReport};
use crate::model::{Blueprint, ConceptBlueprint, EntityBlueprint, HandlerBlueprint};

/// Check a parsed blueprint for dangling references and unusable settings.
pub fn validate_blueprint(blueprint: &Blueprint) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (name, entity) in &blueprint.entities {
        validate_entity(blueprint, name, entity, &mut report);
    }

    let mut slugs: HashMap<String, &str> = HashMap::new();
    for (name, concept) in &blueprint.concepts {
        let slug = name.to_case(Case::Kebab);
        if let Some(previous) = slugs.insert(slug.clone(), name) {
            report.push(ValidationIssue::error(
                "duplicate_slug",
                format!("/concepts/{name}"),
                format!("concepts '{previous}' and '{name}' share the slug '{slug}'"),
                Some("rename one of the concepts"),
            ));
        }
        validate_concept(blueprint, name, concept, &mut report);
    }

    report
}

fn validate_entity(
    blueprint: &Blueprint,
    name: &str,
    entity: &EntityBlueprint,
    report: &mut ValidationReport,
) {
    let base_path = format!("/entities/{name}");

    if !entity.templates.contains_key(DEFAULT_TEMPLATE) {
        report.push(ValidationIssue::warning(
            "default_template_missing",
            format!("{base_path}/templates"),
            format!("entity '{name}' has no '{DEFAULT_TEMPLATE}' template"),
            Some("the factory cannot build related records of this entity without one"),
        ));
    }

    for (relation_name, relation) in &entity.relations {
        let path = format!("{base_path}/relations/{relation_name}");
        if !blueprint.entities.contains_key(&relation.target) {
            report.push(ValidationIssue::error(
                "unknown_relation_target",
                format!("{path}/target"),
                format!("relation target '{}' is not a declared entity", relation.target),
                None,
            ));
        }
        if relation.kind.uses_pivot() && relation.pivot.is_none() {
            report.push(ValidationIssue::error(
                "pivot_missing",
                path.clone(),
                format!("{} relation '{relation_name}' needs a pivot table", relation.kind),
                Some("add pivot = { table, foreign_pivot_key, related_pivot_key }"),
            ));
        }
        if matches!(
            relation.kind,
            RelationKind::HasOneThrough | RelationKind::HasManyThrough
        ) {
            report.push(ValidationIssue::warning(
                "relation_not_linkable",
                path,
                format!("{} relations cannot be linked by concepts", relation.kind),
                None,
            ));
        }
    }
}

fn validate_concept(
    blueprint: &Blueprint,
    name: &str,
    concept: &ConceptBlueprint,
    report: &mut ValidationReport,
) {
    let base_path = format!("/concepts/{name}");

    let Some(entity) = blueprint.entities.get(&concept.entity) else {
        report.push(ValidationIssue::error(
            "unknown_entity",
            format!("{base_path}/entity"),
            format!("entity '{}' is not declared", concept.entity),
            Some("declare it under [entities]"),
        ));
        return;
    };

    if let Some(template) = &concept.template {
        if !entity.templates.contains_key(template) {
            report.push(ValidationIssue::error(
                "unknown_template",
                format!("{base_path}/template"),
                format!("entity '{}' has no template '{template}'", concept.entity),
                None,
            ));
        }
    }

    if concept.instances == 0 {
        report.push(ValidationIssue::error(
            "instances_zero",
            format!("{base_path}/instances"),
            "instances must be greater than zero",
            Some("set instances to a positive integer"),
        ));
    }

    let mut aliases = HashSet::new();
    for (idx, declaration) in concept.relations.iter().enumerate() {
        let path = format!("{base_path}/relations/{idx}");
        if !entity.relations.contains_key(&declaration.relation) {
            report.push(ValidationIssue::error(
                "unknown_relation",
                format!("{path}/relation"),
                format!(
                    "entity '{}' has no relation '{}'",
                    concept.entity, declaration.relation
                ),
                None,
            ));
        }
        if declaration.count == Some(0) {
            report.push(ValidationIssue::error(
                "count_zero",
                format!("{path}/count"),
                "count must be greater than zero",
                Some("remove count to use the default"),
            ));
        }
        if !aliases.insert(declaration.library_alias()) {
            report.push(ValidationIssue::error(
                "duplicate_alias",
                path,
                format!("alias '{}' is declared twice", declaration.library_alias()),
                Some("give one of the relations an explicit alias"),
            ));
        }
    }

    for (alias, handler) in &concept.handlers {
        let path = format!("{base_path}/handlers/{alias}");
        if !aliases.contains(alias.as_str()) {
            report.push(ValidationIssue::warning(
                "unused_handler",
                path.clone(),
                format!("no relation uses the alias '{alias}'"),
                None,
            ));
        }
        match handler {
            HandlerBlueprint::Concept { concept: target } => {
                if !blueprint.concepts.contains_key(target) {
                    report.push(ValidationIssue::error(
                        "unknown_concept",
                        format!("{path}/concept"),
                        format!("handler references unknown concept '{target}'"),
                        None,
                    ));
                }
            }
            HandlerBlueprint::Record {
                entity: target,
                template,
            } => match blueprint.entities.get(target) {
                None => report.push(ValidationIssue::error(
                    "unknown_entity",
                    format!("{path}/entity"),
                    format!("entity '{target}' is not declared"),
                    None,
                )),
                Some(target_entity) => {
                    let template = template.as_deref().unwrap_or(DEFAULT_TEMPLATE);
                    if !target_entity.templates.contains_key(template) {
                        report.push(ValidationIssue::error(
                            "unknown_template",
                            format!("{path}/template"),
                            format!("entity '{target}' has no template '{template}'"),
                            None,
                        ));
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Blueprint {
        Blueprint::from_toml_str(content, "test.toml").expect("parse blueprint")
    }

    #[test]
    fn consistent_blueprint_has_no_issues() {
        let blueprint = parse(
            r#"
[entities.Person.templates.default]
attributes = { email = "p{n}@example.com" }
[entities.Person.relations.pets]
kind = "has_many"
target = "Pet"
foreign_key = "person_id"
[entities.Pet.templates.default]
attributes = { name = "Pet {n}" }

[concepts.PersonWithPets]
entity = "Person"
relations = [{ relation = "pets" }]
handlers = { pets = { concept = "LonelyPet" } }

[concepts.LonelyPet]
entity = "Pet"
"#,
        );

        let report = validate_blueprint(&blueprint);
        assert!(report.is_ok(), "unexpected errors: {:?}", report.errors);
        assert!(report.warnings.is_empty(), "unexpected warnings: {:?}", report.warnings);
    }

    #[test]
    fn dangling_references_are_reported() {
        let blueprint = parse(
            r#"
[entities.Person.templates.default]
attributes = {}
[entities.Person.relations.pets]
kind = "has_many"
target = "Pet"
foreign_key = "person_id"
[entities.Person.relations.tags]
kind = "belongs_to_many"
target = "Person"
foreign_key = "person_id"

[concepts.Broken]
entity = "Person"
template = "vip"
relations = [
  { relation = "pets", count = 0 },
  { relation = "pets" },
  { relation = "ghosts" },
]
handlers = { pets = { concept = "Missing" } }

[concepts.Orphan]
entity = "Robot"
"#,
        );

        let report = validate_blueprint(&blueprint);
        let codes = report.error_codes();
        for expected in [
            "unknown_relation_target",
            "pivot_missing",
            "unknown_template",
            "count_zero",
            "duplicate_alias",
            "unknown_relation",
            "unknown_concept",
            "unknown_entity",
        ] {
            assert!(codes.contains(&expected), "missing {expected} in {codes:?}");
        }
    }

    #[test]
    fn colliding_slugs_are_rejected() {
        let blueprint = parse(
            r#"
[entities.Person.templates.default]
attributes = {}
[concepts.PersonWithPets]
entity = "Person"
[concepts.personWithPets]
entity = "Person"
"#,
        );

        let report = validate_blueprint(&blueprint);
        assert_eq!(report.error_codes(), ["duplicate_slug"]);
    }
}
