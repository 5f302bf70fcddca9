use std::process::ExitCode;

fn main() -> ExitCode {
    askdb_cli::run()
}
