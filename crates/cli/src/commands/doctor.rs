use askdb_core::config::AppConfig;
use askdb_core::BackendError;
use serde::Serialize;

use super::{load_config, runtime, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report() -> DoctorReport {
    let checks = match load_config("doctor") {
        Ok(config) => vec![
            DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            },
            check_llm_configuration(&config),
            check_database_connectivity(&config),
        ],
        Err(failure) => {
            let skipped = |name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            };
            vec![
                DoctorCheck { name: "config_validation", status: CheckStatus::Fail, details: failure.output },
                skipped("llm_configuration"),
                skipped("database_connectivity"),
            ]
        }
    };

    summarize(checks)
}

fn summarize(checks: Vec<DoctorCheck>) -> DoctorReport {
    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    DoctorReport {
        overall_status: if all_pass { CheckStatus::Pass } else { CheckStatus::Fail },
        summary: if all_pass {
            "doctor: all readiness checks passed".to_string()
        } else {
            "doctor: one or more readiness checks failed".to_string()
        },
        checks,
    }
}

fn check_llm_configuration(config: &AppConfig) -> DoctorCheck {
    let llm = &config.llm;
    let provider = llm.provider.as_str();

    if llm.provider.requires_api_key() && llm.api_key().is_none() {
        return DoctorCheck {
            name: "llm_configuration",
            status: CheckStatus::Fail,
            details: format!("LLM not configured: {provider} requires ASKDB_LLM_API_KEY"),
        };
    }

    DoctorCheck {
        name: "llm_configuration",
        status: CheckStatus::Pass,
        details: format!("{provider} model `{}` at {}", llm.model, llm.endpoint()),
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let target = match config.database.backend {
        askdb_core::DatabaseBackend::Sqlite => config.database.sqlite_path.clone(),
        askdb_core::DatabaseBackend::Postgres => {
            let postgres = &config.database.postgres;
            format!("{}:{}/{}", postgres.host, postgres.port, postgres.database)
        }
    };

    let runtime = match runtime("doctor") {
        Ok(runtime) => runtime,
        Err(failure) => {
            return DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: failure.output };
        }
    };

    let result = runtime.block_on(async {
        let backend = askdb_db::open_backend(&config.database)?;
        let mut session = backend.connect().await?;
        let tables = session.list_tables().await;
        session.close().await?;
        tables
    });

    match result {
        Ok(tables) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!(
                "connected to {} `{target}` ({} tables)",
                config.database.backend.as_str(),
                tables.len()
            ),
        },
        Err(error) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Fail,
            details: describe_backend_error(&target, &error),
        },
    }
}

fn describe_backend_error(target: &str, error: &BackendError) -> String {
    format!("failed to reach `{target}`: {error}")
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
