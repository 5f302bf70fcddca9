pub mod backend;
pub mod config;
pub mod errors;
pub mod guard;
pub mod response;
pub mod sanitize;
pub mod schema;
pub mod value;

pub use backend::{BackendSession, QueryOutput, SqlBackend};
pub use config::{AppConfig, DatabaseBackend, LlmProvider};
pub use errors::{AgentStage, BackendError, InterfaceError, PipelineError};
pub use guard::{classify, split_statements, StatementClass};
pub use response::{AskResponse, PipelineResult, QueryResult, StatementOutcome, StatementResult};
pub use sanitize::clean_sql;
pub use schema::{SchemaDescription, TableSchema};
pub use value::{normalize, IsoFormat, NativeValue};
