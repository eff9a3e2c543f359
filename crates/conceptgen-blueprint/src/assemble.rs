use std::path::Path;
use std::rc::Rc;

use conceptgen_core::{Attributes, BuildRequest, EntityRules, MemoryStore, RecordStore};
use conceptgen_engine::{
    Backend, ConceptDefinition, ConceptError, ConceptRegistry, Nested, RelationDeclaration,
};
use tracing::{info, warn};

use crate::errors::{BlueprintError, Result, ValidationIssue};
use crate::model::{Blueprint, HandlerBlueprint};
use crate::validate::validate_blueprint;

/// A blueprint turned into a populated store and concept registry.
#[derive(Debug)]
pub struct Assembly {
    pub store: Rc<MemoryStore>,
    pub registry: ConceptRegistry,
    pub warnings: Vec<ValidationIssue>,
}

impl Assembly {
    pub fn backend(&self) -> Backend {
        Backend::from_store(self.store.clone())
    }
}

/// Read and parse a blueprint file.
pub fn load_blueprint(path: &Path) -> Result<Blueprint> {
    let content = std::fs::read_to_string(path).map_err(|source| BlueprintError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Blueprint::from_toml_str(&content, path.display().to_string())?)
}

/// Validate a blueprint and build the store and registry it describes.
pub fn assemble(blueprint: Blueprint) -> Result<Assembly> {
    let report = validate_blueprint(&blueprint);
    if !report.is_ok() {
        return Err(BlueprintError::Invalid(report));
    }
    for issue in &report.warnings {
        warn!(code = %issue.code, path = %issue.path, message = %issue.message, "blueprint warning");
    }

    let mut store = MemoryStore::new();
    for (entity, blueprint_entity) in &blueprint.entities {
        for (name, template) in &blueprint_entity.templates {
            let location = blueprint.location(template.span());
            store.define(entity, name, template.get_ref().attributes.clone(), location);
        }
        store.define_rules(
            entity,
            EntityRules {
                unique: blueprint_entity.unique.clone(),
                columns: blueprint_entity.columns.clone(),
            },
        );
        for (name, relation) in &blueprint_entity.relations {
            store.define_relation(entity, relation.to_info(name));
        }
    }

    let blueprint = Rc::new(blueprint);
    let mut registry = ConceptRegistry::new();
    for name in blueprint.concepts.keys() {
        if let Some(definition) = concept_definition(&blueprint, name) {
            registry.register(definition);
        }
    }

    info!(
        origin = %blueprint.origin(),
        entities = blueprint.entities.len(),
        concepts = registry.len(),
        warnings = report.warnings.len(),
        "blueprint assembled"
    );

    Ok(Assembly {
        store: Rc::new(store),
        registry,
        warnings: report.warnings,
    })
}

/// Build the definition of concept `name`.
///
/// Nested concepts are looked up when their handler runs, so concepts may
/// refer to each other in cycles.
pub fn concept_definition(blueprint: &Rc<Blueprint>, name: &str) -> Option<ConceptDefinition> {
    let concept = blueprint.concepts.get(name)?;

    let mut definition = ConceptDefinition::new(name, &concept.entity)
        .attributes(concept.attributes.clone())
        .instances(concept.instances);
    if let Some(alias) = &concept.alias {
        definition = definition.alias(alias);
    }
    if let Some(template) = &concept.template {
        definition = definition.template(template);
    }
    for declaration in &concept.relations {
        let mut relation = RelationDeclaration::new(&declaration.relation);
        if let Some(alias) = &declaration.alias {
            relation = relation.alias(alias);
        }
        if let Some(count) = declaration.count {
            relation = relation.count(count);
        }
        definition = definition.relation(relation);
    }

    for (alias, handler) in &concept.handlers {
        let owner = name.to_string();
        let alias_name = alias.clone();
        definition = match handler.clone() {
            HandlerBlueprint::Concept { concept: target } => {
                let blueprint = Rc::clone(blueprint);
                definition.handler(alias, move |_| {
                    concept_definition(&blueprint, &target)
                        .map(Nested::Concept)
                        .ok_or_else(|| ConceptError::UnresolvedRelation {
                            concept: owner.clone(),
                            alias: alias_name.clone(),
                        })
                })
            }
            HandlerBlueprint::Record { entity, template } => {
                definition.handler(alias, move |engine| {
                    let request = BuildRequest::new(&entity).template(template.clone());
                    let record = engine
                        .backend()
                        .store()
                        .build(&request)
                        .map_err(|err| {
                            ConceptError::from_factory(err, &entity, template.as_deref())
                        })?
                        .into_iter()
                        .next()
                        .ok_or_else(|| ConceptError::UnresolvedRelation {
                            concept: owner.clone(),
                            alias: alias_name.clone(),
                        })?;
                    if let Some(log) = engine.current_action_log() {
                        log.add_action(&record, Some(&Attributes::new()), Some(&record.attributes));
                    }
                    Ok(Nested::Record(record))
                })
            }
        };
    }

    Some(definition)
}
