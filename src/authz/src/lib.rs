//! # Fieldguard Field Authorization Engine
//!
//! Field-level read and write authorization for schema-driven query and
//! mutation resolvers.
//!
//! ## Features
//!
//! - **Per-instance rules**: every field of every entity instance is decided
//!   against the caller's context
//! - **Denial as data**: a denied field resolves to a substitute (or is
//!   omitted), never to an error, unless a rule explicitly refuses
//! - **Ownership chains**: rules can walk the parent models an instance was
//!   reached through (`is_owner_of("Group")`)
//! - **Async rules**: predicates and fallbacks may be synchronous or async
//! - **Order-preserving arrays**: elements are authorized concurrently and
//!   reassembled in input order
//! - **Recursive mutation input**: nested entity arguments are sanitized by
//!   their own write rules before the business resolver runs
//!
//! ## Example
//!
//! ```rust
//! use fieldguard_authz::{
//!     Context, EntityDefinition, FieldType, Operation, Query, Rule, RulePolicy, SchemaBuilder,
//!     Selection,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let schema = SchemaBuilder::new()
//!         .entity(
//!             EntityDefinition::new("User")
//!                 .field("name", FieldType::string())
//!                 .field("email", FieldType::string())
//!                 .read_rules(RulePolicy::fields([
//!                     ("name", Rule::Allow),
//!                     ("email", Rule::Deny.or_value(json!("hidden"))),
//!                 ]))
//!                 .write_rules(RulePolicy::Disabled),
//!         )
//!         .query(
//!             "me",
//!             Query::from_fn(FieldType::entity("User"), |_, _, _| {
//!                 Ok(json!({"name": "Ada", "email": "ada@example.com"}))
//!             }),
//!         )
//!         .build()?;
//!
//!     let operation = Operation::query([Selection::field("me")
//!         .select([Selection::field("name"), Selection::field("email")])]);
//!
//!     let result = schema.execute(&operation, &Context::empty()).await?;
//!     assert_eq!(result, json!({"me": {"name": "Ada", "email": "hidden"}}));
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod model;
pub mod mutation;
pub mod query;
pub mod rule;
pub mod schema;
pub mod types;
pub mod validate;
pub mod value;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::{apply_read_rules, apply_rules, apply_write_rules, Authorized, RuleEngine};
pub use error::{AuthzError, Result};
pub use executor::{Operation, OperationKind, Selection};
pub use model::{FieldOutcome, RuleModel};
pub use mutation::{build_mutation, build_mutations, Mutation, MutationOptions};
pub use query::{build_queries, build_query, Query};
pub use rule::{is_owner_of, wrap_rule, CompiledRule, Denial, Props, Rule};
pub use schema::{
    build_entity, build_entity_with_config, BuiltEntity, EntityDefinition, Field, FieldType,
    Resolved, RulePolicy, Schema, SchemaBuilder,
};
pub use types::{Context, RuleKind, RuleSetId, TypeName};
pub use validate::{TypedArgs, Validation, Validator};
pub use value::Thunk;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
