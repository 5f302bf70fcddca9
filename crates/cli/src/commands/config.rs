use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use askdb_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct FieldRow {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> String {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            let config_file_path = detect_config_path();
            let config_file_doc = load_config_file_doc(config_file_path.as_deref());
            render(&config, config_file_doc.as_ref(), config_file_path.as_deref())
        }
        Err(error) => format!("config validation failed: {error}"),
    }
}

fn render(config: &AppConfig, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for row in field_rows(config) {
        let source = field_source(row.key, row.env_keys, file_doc, file_path);
        lines.push(format!("- {} = {} (source: {source})", row.key, row.value));
    }
    lines.join("\n")
}

fn field_rows(config: &AppConfig) -> Vec<FieldRow> {
    let database = &config.database;
    let postgres = &database.postgres;
    let llm = &config.llm;

    let row = |key: &'static str, env_keys: &'static [&'static str], value: String| FieldRow {
        key,
        env_keys,
        value,
    };
    vec![
        row("database.backend", &["ASKDB_DATABASE_BACKEND"], database.backend.as_str().to_string()),
        row("database.sqlite_path", &["ASKDB_DATABASE_SQLITE_PATH"], database.sqlite_path.clone()),
        row("database.postgres.host", &["ASKDB_POSTGRES_HOST"], postgres.host.clone()),
        row("database.postgres.port", &["ASKDB_POSTGRES_PORT"], postgres.port.to_string()),
        row("database.postgres.database", &["ASKDB_POSTGRES_DATABASE"], postgres.database.clone()),
        row("database.postgres.user", &["ASKDB_POSTGRES_USER"], postgres.user.clone()),
        row(
            "database.postgres.password",
            &["ASKDB_POSTGRES_PASSWORD"],
            redact_secret(Some(postgres.password.expose_secret())),
        ),
        row(
            "database.connect_timeout_secs",
            &["ASKDB_DATABASE_CONNECT_TIMEOUT_SECS"],
            database.connect_timeout_secs.to_string(),
        ),
        row(
            "database.statement_timeout_secs",
            &["ASKDB_DATABASE_STATEMENT_TIMEOUT_SECS"],
            database.statement_timeout_secs.to_string(),
        ),
        row("llm.provider", &["ASKDB_LLM_PROVIDER"], llm.provider.as_str().to_string()),
        row("llm.model", &["ASKDB_LLM_MODEL"], llm.model.clone()),
        row("llm.base_url", &["ASKDB_LLM_BASE_URL"], llm.endpoint().to_string()),
        row("llm.api_key", &["ASKDB_LLM_API_KEY"], redact_secret(llm.api_key())),
        row("llm.timeout_secs", &["ASKDB_LLM_TIMEOUT_SECS"], llm.timeout_secs.to_string()),
        row("llm.max_retries", &["ASKDB_LLM_MAX_RETRIES"], llm.max_retries.to_string()),
        row("server.bind_address", &["ASKDB_SERVER_BIND_ADDRESS"], config.server.bind_address.clone()),
        row("server.port", &["ASKDB_SERVER_PORT"], config.server.port.to_string()),
        row(
            "server.graceful_shutdown_secs",
            &["ASKDB_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            config.server.graceful_shutdown_secs.to_string(),
        ),
        row("logging.level", &["ASKDB_LOGGING_LEVEL", "ASKDB_LOG_LEVEL"], config.logging.level.clone()),
        row(
            "logging.format",
            &["ASKDB_LOGGING_FORMAT", "ASKDB_LOG_FORMAT"],
            format!("{:?}", config.logging.format).to_lowercase(),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["askdb.toml", "config/askdb.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    match config_file_doc {
        Some(doc) if contains_path(doc, key_path) => {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            format!("file ({file_path})")
        }
        _ => "default".to_string(),
    }
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    key_path.split('.').try_fold(root, |current, key| current.get(key)).is_some()
}

fn redact_secret(secret: Option<&str>) -> String {
    match secret.map(str::trim) {
        None | Some("") => "<unset>".to_string(),
        Some(_) => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use askdb_core::config::AppConfig;
    use secrecy::SecretString;
    use toml::Value;

    use super::{contains_path, redact_secret, render};

    #[test]
    fn secrets_are_redacted_in_rendered_output() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some(SecretString::from("sk-live-123456".to_string()));
        config.database.postgres.password = SecretString::from("hunter2".to_string());

        let rendered = render(&config, None, None);

        assert!(!rendered.contains("sk-live-123456"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("- llm.api_key = <redacted>"));
        assert!(rendered.contains("- database.postgres.password = <redacted>"));
        assert!(rendered.contains("- database.backend = sqlite"));
    }

    #[test]
    fn file_keys_are_attributed_to_the_file() {
        let doc: Value = "[database]\nsqlite_path = \"data/company.db\"\n[database.postgres]\nhost = \"db\"\n"
            .parse()
            .expect("toml should parse");

        assert!(contains_path(&doc, "database.sqlite_path"));
        assert!(contains_path(&doc, "database.postgres.host"));
        assert!(!contains_path(&doc, "database.postgres.port"));
        assert!(!contains_path(&doc, "llm.model"));
        assert_eq!(redact_secret(Some("   ")), "<unset>");
    }
}
