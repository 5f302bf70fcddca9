//! Question answering over a relational database.
//!
//! A run describes the live schema, asks the text-generation collaborator for
//! the relevant tables and then for read-only SQL, sanitizes and executes that
//! SQL statement by statement, and finally asks the collaborator to summarize
//! the results. Stage failures never abort a run; they are reported inline.
//!
//! The collaborator is anything implementing [`llm::LlmClient`]. The database
//! is anything implementing [`askdb_core::SqlBackend`].

pub mod executor;
pub mod introspect;
pub mod llm;
pub mod pipeline;
pub mod prompts;

#[cfg(test)]
mod testing;

pub use executor::run_statements;
pub use introspect::describe_schema;
pub use llm::{client_from_config, LlmClient};
pub use pipeline::{Pipeline, PipelineSettings};
