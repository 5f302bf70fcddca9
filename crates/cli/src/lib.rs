pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "askdb",
    about = "Ask questions of a SQL database in plain language",
    long_about = "Answer natural-language questions with read-only SQL, inspect the live schema, and check runtime readiness.",
    after_help = "Examples:\n  askdb ask \"How many customers are there?\" --pretty\n  askdb schema\n  askdb doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run the question pipeline once and print the response JSON")]
    Ask {
        #[arg(help = "Question to answer")]
        question: String,
        #[arg(long, help = "Pretty-print the response JSON")]
        pretty: bool,
    },
    #[command(about = "Print the schema description handed to the model")]
    Schema,
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Validate config, LLM credentials, and database connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { question, pretty } => commands::ask::run(&question, pretty),
        Command::Schema => commands::schema::run(),
        Command::Config => commands::CommandResult::text(commands::config::run()),
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
