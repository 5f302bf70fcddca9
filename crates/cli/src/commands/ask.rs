use askdb_agent::{client_from_config, Pipeline, PipelineSettings};
use askdb_core::AskResponse;

use super::{load_config, runtime, CommandResult, EXIT_BACKEND, EXIT_CONFIG};

const COMMAND: &str = "ask";

/// Answers one question and prints the response JSON. Stage failures are part
/// of a normal response; only an empty question changes the exit code.
pub fn run(question: &str, pretty: bool) -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let backend = match askdb_db::open_backend(&config.database) {
        Ok(backend) => backend,
        Err(error) => return CommandResult::failure(COMMAND, "backend", error.to_string(), EXIT_BACKEND),
    };
    let llm = match client_from_config(&config.llm) {
        Ok(llm) => llm,
        Err(error) => return CommandResult::failure(COMMAND, "llm", error.to_string(), EXIT_CONFIG),
    };
    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let pipeline = Pipeline::new(llm, backend, PipelineSettings::from_config(&config));
    let response = runtime.block_on(pipeline.ask(question));
    render(&response, pretty)
}

fn render(response: &AskResponse, pretty: bool) -> CommandResult {
    let serialized =
        if pretty { serde_json::to_string_pretty(response) } else { serde_json::to_string(response) };
    let output = match serialized {
        Ok(output) => output,
        Err(error) => return CommandResult::failure(COMMAND, "serialization", error.to_string(), 1),
    };

    let exit_code = match response {
        AskResponse::Answered(_) => 0,
        AskResponse::Error { .. } => 1,
    };
    CommandResult { exit_code, output }
}

#[cfg(test)]
mod tests {
    use askdb_core::AskResponse;

    use super::render;

    #[test]
    fn empty_question_response_exits_nonzero() {
        let result = render(&AskResponse::empty_question(), false);

        assert_eq!(result.exit_code, 1);
        assert_eq!(result.output, r#"{"error":"Empty question."}"#);
    }
}
