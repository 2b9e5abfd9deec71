//! Two-phase schema registry
//!
//! Entities are declared first and refer to each other by name; `build`
//! compiles every entity, then binds every reference, then builds the root
//! queries and mutations. Forward and circular references are fine; a name
//! that never gets declared fails the build.

use super::entity::{build_entity_with_config, BuiltEntity, EntityDefinition};
use super::field::{EntityRef, FieldType};
use super::shape::BuiltField;
use crate::config::EngineConfig;
use crate::error::{AuthzError, Result};
use crate::mutation::{build_mutation, Mutation, MutationOptions};
use crate::query::{build_query, Query};
use crate::types::TypeName;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Collects entity, query and mutation declarations
#[derive(Default)]
pub struct SchemaBuilder {
    config: EngineConfig,
    entities: Vec<EntityDefinition>,
    queries: Vec<(String, Query)>,
    mutations: Vec<(String, Mutation)>,
    mutation_options: MutationOptions,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn entity(mut self, definition: EntityDefinition) -> Self {
        self.entities.push(definition);
        self
    }

    pub fn query(mut self, name: impl Into<String>, query: Query) -> Self {
        self.queries.push((name.into(), query));
        self
    }

    pub fn mutation(mut self, name: impl Into<String>, mutation: Mutation) -> Self {
        self.mutations.push((name.into(), mutation));
        self
    }

    /// Options shared by every mutation; each mutation's own options win
    pub fn mutation_options(mut self, options: MutationOptions) -> Self {
        self.mutation_options = options;
        self
    }

    /// Compile everything, failing on the first configuration error
    pub fn build(self) -> Result<Schema> {
        let config = Arc::new(self.config);

        let mut entities: HashMap<TypeName, Arc<BuiltEntity>> = HashMap::new();
        for definition in self.entities {
            let name = definition.name().clone();
            if entities.contains_key(&name) {
                return Err(AuthzError::configuration(format!(
                    "entity {} is declared more than once",
                    name
                )));
            }
            let built = build_entity_with_config(definition, config.clone())?;
            entities.insert(name, built);
        }

        for entity in entities.values() {
            for reference in entity.references() {
                bind(reference, &entities)?;
            }
        }
        debug!(entities = entities.len(), "entity references bound");

        let mut queries = HashMap::new();
        for (name, query) in self.queries {
            bind_type(query.ty(), &entities)?;
            for arg in query.args() {
                bind_type(&arg.ty, &entities)?;
            }
            let built = build_query(&name, query)?;
            queries.insert(name, built);
        }

        let mut mutations = HashMap::new();
        for (name, mutation) in self.mutations {
            bind_type(mutation.ty(), &entities)?;
            for arg in mutation.args() {
                bind_type(&arg.ty, &entities)?;
            }
            let options = mutation.options().merged_over(&self.mutation_options);
            let built = build_mutation(&name, mutation, options, config.clone())?;
            mutations.insert(name, built);
        }

        info!(
            entities = entities.len(),
            queries = queries.len(),
            mutations = mutations.len(),
            "schema built"
        );

        Ok(Schema {
            entities,
            queries,
            mutations,
            config,
        })
    }
}

fn bind(reference: &EntityRef, entities: &HashMap<TypeName, Arc<BuiltEntity>>) -> Result<()> {
    if reference.is_bound() {
        return Ok(());
    }
    let entity = entities.get(reference.name()).ok_or_else(|| {
        AuthzError::configuration(format!("unknown entity type {}", reference.name()))
    })?;
    reference.bind(entity)
}

fn bind_type(ty: &FieldType, entities: &HashMap<TypeName, Arc<BuiltEntity>>) -> Result<()> {
    match ty.entity_ref() {
        Some(reference) => bind(reference, entities),
        None => Ok(()),
    }
}

/// A built schema: entities plus root query and mutation fields
pub struct Schema {
    entities: HashMap<TypeName, Arc<BuiltEntity>>,
    queries: HashMap<String, BuiltField>,
    mutations: HashMap<String, BuiltField>,
    config: Arc<EngineConfig>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn entity(&self, name: &str) -> Option<&Arc<BuiltEntity>> {
        self.entities.get(name)
    }

    pub fn query(&self, name: &str) -> Option<&BuiltField> {
        self.queries.get(name)
    }

    pub fn mutation(&self, name: &str) -> Option<&BuiltField> {
        self.mutations.get(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<BuiltEntity>> {
        self.entities.values()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn sorted<'a>(names: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
            let mut names: Vec<_> = names.collect();
            names.sort_unstable();
            names
        }

        f.debug_struct("Schema")
            .field("entities", &sorted(self.entities.keys().map(TypeName::as_str)))
            .field("queries", &sorted(self.queries.keys().map(String::as_str)))
            .field("mutations", &sorted(self.mutations.keys().map(String::as_str)))
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Rule;
    use crate::schema::RulePolicy;
    use serde_json::json;

    fn disabled(name: &str) -> EntityDefinition {
        EntityDefinition::new(name)
            .read_rules(RulePolicy::Disabled)
            .write_rules(RulePolicy::Disabled)
    }

    #[test]
    fn test_circular_references_bind() {
        let schema = SchemaBuilder::new()
            .entity(disabled("Group").field("events", FieldType::list(FieldType::entity("Event"))))
            .entity(disabled("Event").field("group", FieldType::entity("Group")))
            .build()
            .unwrap();

        let group = schema.entity("Group").unwrap();
        let events = group.output().field("events").unwrap();
        let event = events.ty.resolve_entity().unwrap().unwrap();
        assert_eq!(event.name(), "Event");

        let back = event.output().field("group").unwrap();
        let resolved = back.ty.resolve_entity().unwrap().unwrap();
        assert!(Arc::ptr_eq(&resolved, group));
        assert!(group.nested_inputs()["events"].is_bound());
    }

    #[test]
    fn test_unknown_reference_fails_build() {
        let result = SchemaBuilder::new()
            .entity(disabled("Group").field("owner", FieldType::entity("User")))
            .build();
        let err = result.err().unwrap();
        assert_eq!(err.to_string(), "Configuration error: unknown entity type User");
    }

    #[test]
    fn test_duplicate_entity_fails_build() {
        let result = SchemaBuilder::new()
            .entity(disabled("Group"))
            .entity(disabled("Group"))
            .build();
        assert!(matches!(result, Err(AuthzError::Configuration(_))));
    }

    #[test]
    fn test_entity_errors_surface_from_build() {
        let result = SchemaBuilder::new()
            .entity(EntityDefinition::new("Group").write_rules(RulePolicy::Disabled))
            .build();
        assert!(result.err().unwrap().to_string().contains("readRules"));
    }

    #[test]
    fn test_roots_are_registered() {
        let schema = SchemaBuilder::new()
            .with_config(EngineConfig {
                max_ancestor_depth: 8,
                ..EngineConfig::default()
            })
            .entity(disabled("Group").field("id", FieldType::id()))
            .query(
                "groups",
                Query::from_fn(FieldType::list(FieldType::entity("Group")), |_, _, _| {
                    Ok(json!([]))
                }),
            )
            .mutation(
                "addGroup",
                Mutation::from_fn(FieldType::entity("Group"), |_, args, _| Ok(args))
                    .without_validation()
                    .write_rules(RulePolicy::Blanket(Rule::Allow)),
            )
            .build()
            .unwrap();

        assert!(schema.query("groups").is_some());
        assert!(schema.mutation("addGroup").is_some());
        assert!(schema.query("missing").is_none());
        assert_eq!(schema.entities().count(), 1);
        assert_eq!(schema.config().max_ancestor_depth, 8);
    }
}
