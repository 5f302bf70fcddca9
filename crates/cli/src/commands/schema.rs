use askdb_agent::describe_schema;

use super::{load_config, runtime, CommandResult, EXIT_BACKEND};

const COMMAND: &str = "schema";

pub fn run() -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let backend = match askdb_db::open_backend(&config.database) {
        Ok(backend) => backend,
        Err(error) => return CommandResult::failure(COMMAND, "backend", error.to_string(), EXIT_BACKEND),
    };
    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    match runtime.block_on(describe_schema(backend.as_ref())) {
        Ok(description) => CommandResult::text(description.to_string()),
        Err(error) => CommandResult::failure(COMMAND, "catalog_unavailable", error.to_string(), EXIT_BACKEND),
    }
}
