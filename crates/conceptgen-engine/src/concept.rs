//! Concept engine: builds a root record and wires up every declared relation.

use std::fmt;
use std::rc::Rc;

use conceptgen_core::{
    Attributes, BuildRequest, Events, Record, RecordStore, RelationInfo, RelationIntrospector,
    StoreError,
};
use tracing::{debug, info, warn};

use crate::action_log::ActionLog;
use crate::definition::{ConceptDefinition, Nested, RelationDeclaration};
use crate::errors::{ConceptError, Result};
use crate::library::{ModelLibrary, Resolved};
use crate::resolver::{Probe, Source, candidate_sources};

/// Number of records the factory builds for a many-relation without an explicit count.
pub const DEFAULT_MANY_COUNT: usize = 2;

/// Store and introspector handles shared by an engine and its nested engines.
#[derive(Clone)]
pub struct Backend {
    store: Rc<dyn RecordStore>,
    introspector: Rc<dyn RelationIntrospector>,
}

impl Backend {
    pub fn new(store: Rc<dyn RecordStore>, introspector: Rc<dyn RelationIntrospector>) -> Self {
        Self {
            store,
            introspector,
        }
    }

    /// Use one value as both the record store and the relation introspector.
    pub fn from_store<S>(store: Rc<S>) -> Self
    where
        S: RecordStore + RelationIntrospector + 'static,
    {
        Self {
            store: store.clone(),
            introspector: store,
        }
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn introspector(&self) -> &dyn RelationIntrospector {
        self.introspector.as_ref()
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend").finish_non_exhaustive()
    }
}

/// A declared relation together with the instance chosen for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRelation {
    pub declaration: RelationDeclaration,
    pub value: Resolved,
    pub source: Source,
}

/// Generator for one concept.
///
/// The engine owns its model library and root record; the action log is a
/// shared handle so nested engines write into the ledger of the outermost run.
#[derive(Debug)]
pub struct ConceptEngine {
    definition: ConceptDefinition,
    backend: Backend,
    model: Option<Record>,
    library: ModelLibrary,
    log: Option<ActionLog>,
    /// Concept names currently being created further up the nesting chain.
    ancestors: Vec<String>,
}

impl ConceptEngine {
    pub fn new(definition: ConceptDefinition, backend: Backend) -> Self {
        Self {
            definition,
            backend,
            model: None,
            library: ModelLibrary::new(),
            log: None,
            ancestors: Vec::new(),
        }
    }

    pub fn definition(&self) -> &ConceptDefinition {
        &self.definition
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Replace the default attributes applied to the root record.
    pub fn set_attributes(&mut self, attributes: Attributes) -> &mut Self {
        self.definition.set_attributes(attributes);
        self
    }

    pub fn attributes(&self) -> &Attributes {
        self.definition.default_attributes()
    }

    pub fn set_action_log(&mut self, log: ActionLog) -> &mut Self {
        self.log = Some(log);
        self
    }

    /// Shared handle to the action log, created on first use.
    pub fn action_log(&mut self) -> ActionLog {
        self.log.get_or_insert_with(ActionLog::new).clone()
    }

    /// The action log if one was attached or created, without creating one.
    ///
    /// Handlers only see `&ConceptEngine`; during `create` the log is always
    /// present, so a handler that persists records can log them here.
    pub fn current_action_log(&self) -> Option<ActionLog> {
        self.log.clone()
    }

    pub fn model_library(&self) -> &ModelLibrary {
        &self.library
    }

    pub fn set_model_library(&mut self, library: ModelLibrary) -> &mut Self {
        self.library = library;
        self
    }

    /// Move the library out, leaving this engine with an empty one.
    pub fn take_model_library(&mut self) -> ModelLibrary {
        std::mem::take(&mut self.library)
    }

    /// Union `other` into the library; its entries win on alias collisions.
    pub fn merge_library(&mut self, other: ModelLibrary) -> &mut Self {
        self.library.merge(other);
        self
    }

    /// Attach an existing root record; later creations update it in place.
    pub fn set_model(&mut self, record: Record) -> Result<&mut Self> {
        if !record.is_instance_of(self.definition.entity()) {
            return Err(ConceptError::TypeMismatch(format!(
                "model must be an instance of {}, {} given",
                self.definition.entity(),
                record.entity
            )));
        }
        self.model = Some(record);
        Ok(self)
    }

    /// The root record, created from the default attributes when absent.
    pub fn model(&mut self) -> Result<Record> {
        if let Some(model) = &self.model {
            return Ok(model.clone());
        }
        self.create_model(&Attributes::new())
    }

    /// Resolve relations ahead of creation and store them in the library.
    pub fn with(&mut self, declarations: &[RelationDeclaration]) -> Result<&mut Self> {
        for declaration in declarations {
            let relation = self.resolve_relation(declaration)?;
            if relation.source != Source::Library {
                self.library
                    .insert(declaration.library_alias().to_string(), relation.value);
            }
        }
        Ok(self)
    }

    /// Generate the concept `count` times (default: the definition's instance count).
    ///
    /// Returns the root record, or every root when more than one instance was
    /// requested. Each extra instance starts from the library as it was before
    /// the call, and everything the instances produced is gathered back into it.
    pub fn create(&mut self, overrides: &Attributes, count: Option<usize>) -> Result<Resolved> {
        let count = count.unwrap_or(self.definition.instance_count()).max(1);
        let log = self.action_log();
        info!(
            concept = %self.name(),
            entity = %self.definition.entity(),
            count,
            "concept_create_started"
        );

        let baseline = self.library.deep_copy();
        let mut produced = ModelLibrary::new();
        let mut roots = Vec::with_capacity(count);

        for iteration in 0..count {
            if iteration > 0 {
                self.model = None;
                self.library = baseline.deep_copy();
            }
            let root = self.create_once(overrides)?;
            if count > 1 {
                for (alias, value) in self.library.difference(&baseline) {
                    produced.accumulate(alias, value);
                }
            }
            roots.push(root);
        }

        if count > 1 {
            self.library = baseline;
            self.library.merge(produced);
        }

        info!(
            concept = %self.name(),
            roots = roots.len(),
            library = self.library.len(),
            actions = log.len(),
            "concept_created"
        );
        Ok(if roots.len() == 1 {
            Resolved::Single(roots.remove(0))
        } else {
            Resolved::Many(roots)
        })
    }

    /// Resolve a single relation of the root by name and link it.
    pub fn create_relationship(&mut self, relation: &str, alias: Option<&str>) -> Result<Resolved> {
        let mut declaration = RelationDeclaration::new(relation);
        if let Some(alias) = alias {
            declaration = declaration.alias(alias);
        }
        let mut root = self.model()?;
        let mut resolved = [self.resolve_relation(&declaration)?];
        self.relate_models(&mut root, &mut resolved)?;
        self.model = Some(root);
        let [resolved] = resolved;
        Ok(resolved.value)
    }

    /// Choose an instance for `declaration`: library, then handler, then factory.
    pub fn resolve_relation(
        &mut self,
        declaration: &RelationDeclaration,
    ) -> Result<ResolvedRelation> {
        let alias = declaration.library_alias().to_string();
        let info = self
            .backend
            .introspector()
            .relation(self.definition.entity(), &declaration.relation);
        let many = info.as_ref().is_some_and(RelationInfo::is_many);
        let probe = Probe {
            in_library: self.library.contains(&alias),
            has_handler: self.definition.has_handler(&alias),
            has_relation: info.is_some(),
        };

        for source in candidate_sources(probe) {
            let value = match source {
                Source::Library => self
                    .library
                    .get(&alias)
                    .cloned()
                    .and_then(|value| value.coerce(many)),
                Source::Nested => self.from_handler(declaration, many)?,
                Source::Factory => match &info {
                    Some(info) => Some(self.from_factory(declaration, info)?),
                    None => None,
                },
            };
            if let Some(value) = value {
                debug!(
                    concept = %self.name(),
                    alias = %alias,
                    source = %source,
                    records = value.len(),
                    "relation_resolved"
                );
                return Ok(ResolvedRelation {
                    declaration: declaration.clone(),
                    value,
                    source,
                });
            }
        }

        Err(ConceptError::UnresolvedRelation {
            concept: self.name().to_string(),
            alias,
        })
    }

    /// Link every resolved value to `root` and log the resulting changes.
    ///
    /// `root` and the resolved values are refreshed with their persisted
    /// states, and each value lands in the library under its alias. Links
    /// that already exist are skipped.
    pub fn relate_models(
        &mut self,
        root: &mut Record,
        relations: &mut [ResolvedRelation],
    ) -> Result<()> {
        let log = self.action_log();

        for relation in relations.iter_mut() {
            let name = relation.declaration.relation.clone();
            let info = self
                .backend
                .introspector()
                .relation(&root.entity, &name)
                .ok_or_else(|| ConceptError::UnresolvedRelation {
                    concept: self.name().to_string(),
                    alias: relation.declaration.library_alias().to_string(),
                })?;

            let related: Vec<Record> = relation.value.records().to_vec();
            for record in &related {
                if !record.is_instance_of(&info.target) {
                    return Err(ConceptError::TypeMismatch(format!(
                        "{}::{}() expects {}, {} given",
                        root.entity, name, info.target, record.entity
                    )));
                }

                match self
                    .backend
                    .store()
                    .relate(root, record, &info, Events::Suppress)
                {
                    Ok(mutations) => {
                        for mutation in mutations {
                            log.add_link(&mutation);
                            if mutation.record.id() == root.id() {
                                *root = mutation.record.clone();
                            }
                            relation.value.refresh(&mutation.record);
                            self.library.refresh(&mutation.record);
                        }
                        debug!(
                            root = %root.id(),
                            related = %record.id(),
                            relation = %name,
                            kind = %info.kind,
                            "relation_linked"
                        );
                    }
                    Err(err) if err.is_duplicate_link() => {
                        debug!(
                            root = %root.id(),
                            related = %record.id(),
                            relation = %name,
                            "duplicate_link_skipped"
                        );
                    }
                    Err(StoreError::UnsupportedRelationKind {
                        entity,
                        relation: relation_name,
                        kind,
                    }) => {
                        return Err(ConceptError::UnsupportedRelationKind {
                            entity,
                            relation: relation_name,
                            kind,
                        });
                    }
                    Err(err) => return Err(err.into()),
                }
            }

            self.library.insert(
                relation.declaration.library_alias().to_string(),
                relation.value.clone(),
            );
        }
        Ok(())
    }

    fn create_once(&mut self, overrides: &Attributes) -> Result<Record> {
        let mut root = self.create_model(overrides)?;
        let declarations = self.definition.relations().to_vec();
        for declaration in &declarations {
            let mut relation = self.resolve_relation(declaration)?;
            self.relate_models(&mut root, std::slice::from_mut(&mut relation))?;
        }
        self.model = Some(root.clone());
        self.library.insert(
            self.definition.root_alias().to_string(),
            Resolved::Single(root.clone()),
        );
        Ok(root)
    }

    /// Create the root record, or update the attached one with the attributes.
    fn create_model(&mut self, overrides: &Attributes) -> Result<Record> {
        let mut attributes = self.definition.default_attributes().clone();
        attributes.extend(overrides.clone());
        let log = self.action_log();

        let record = match &self.model {
            Some(model) => {
                let updated =
                    self.backend
                        .store()
                        .update(&model.id(), &attributes, Events::Fire)?;
                log.add_action(&updated, Some(&model.attributes), Some(&updated.attributes));
                updated
            }
            None => {
                let record = self.build_first(
                    self.definition.entity(),
                    self.definition.template_name(),
                    attributes,
                )?;
                log.mark_created(record.id());
                log.add_action(&record, Some(&Attributes::new()), Some(&record.attributes));
                record
            }
        };
        self.model = Some(record.clone());
        Ok(record)
    }

    fn from_handler(
        &mut self,
        declaration: &RelationDeclaration,
        many: bool,
    ) -> Result<Option<Resolved>> {
        let alias = declaration.library_alias();
        let Some(handler) = self.definition.handler_for(alias) else {
            return Ok(None);
        };

        match handler(&*self)? {
            Nested::Record(record) => Ok(Resolved::Single(record).coerce(many)),
            Nested::Concept(definition) => {
                if self.is_active(definition.name()) {
                    debug!(
                        concept = %self.name(),
                        nested = %definition.name(),
                        alias = %alias,
                        "self_reference_detected"
                    );
                    return Ok(None);
                }

                let count = if many {
                    declaration.count.unwrap_or(definition.instance_count())
                } else {
                    1
                };
                let mut nested = ConceptEngine::new(definition, self.backend.clone());
                nested.log = Some(self.action_log());
                nested.ancestors = self.nesting_path();
                nested.library = self.take_model_library();

                let outcome = nested.create(&Attributes::new(), Some(count));
                self.library.merge(nested.take_model_library());
                Ok(outcome?.coerce(many))
            }
        }
    }

    fn from_factory(
        &mut self,
        declaration: &RelationDeclaration,
        info: &RelationInfo,
    ) -> Result<Resolved> {
        let count = if info.is_many() {
            declaration.count.unwrap_or(DEFAULT_MANY_COUNT)
        } else {
            1
        };
        let records = self.build_records(&info.target, None, Attributes::new(), count)?;

        // Records the link will not touch are logged here so rollback removes them.
        let log = self.action_log();
        for record in &records {
            log.mark_created(record.id());
            if !info.kind.writes_related() {
                log.add_action(record, Some(&Attributes::new()), Some(&record.attributes));
            }
        }

        Resolved::from_records(records, info.is_many()).ok_or_else(|| {
            ConceptError::UnresolvedRelation {
                concept: self.name().to_string(),
                alias: declaration.library_alias().to_string(),
            }
        })
    }

    fn build_records(
        &self,
        entity: &str,
        template: Option<&str>,
        overrides: Attributes,
        count: usize,
    ) -> Result<Vec<Record>> {
        let request = BuildRequest::new(entity)
            .template(template.map(str::to_string))
            .overrides(overrides)
            .count(count);
        self.backend.store().build(&request).map_err(|err| {
            let err = ConceptError::from_factory(err, entity, template);
            if let ConceptError::InvalidDefinition { location, .. } = &err {
                warn!(entity = %entity, location = %location, "factory template rejected by store");
            }
            err
        })
    }

    fn build_first(
        &self,
        entity: &str,
        template: Option<&str>,
        overrides: Attributes,
    ) -> Result<Record> {
        self.build_records(entity, template, overrides, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| ConceptError::EmptyFactory(entity.to_string()))
    }

    fn is_active(&self, name: &str) -> bool {
        name == self.name() || self.ancestors.iter().any(|ancestor| ancestor == name)
    }

    fn nesting_path(&self) -> Vec<String> {
        let mut path = self.ancestors.clone();
        path.push(self.name().to_string());
        path
    }
}

impl Clone for ConceptEngine {
    fn clone(&self) -> Self {
        Self {
            definition: self.definition.clone(),
            backend: self.backend.clone(),
            model: self.model.clone(),
            library: self.library.deep_copy(),
            log: self.log.clone(),
            ancestors: self.ancestors.clone(),
        }
    }
}
