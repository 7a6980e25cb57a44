use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use pagepilot_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run(options: LoadOptions) -> String {
    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let api_key = if config.oracle.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let store_dir = config
        .context
        .store_dir
        .as_ref()
        .map(|dir| dir.display().to_string())
        .unwrap_or_else(|| "<in-memory>".to_string());

    let rows = vec![
        row("oracle.provider", format!("{:?}", config.oracle.provider), &["PAGEPILOT_ORACLE_PROVIDER"]),
        row("oracle.model", config.oracle.model.clone(), &["PAGEPILOT_ORACLE_MODEL"]),
        row(
            "oracle.base_url",
            config.oracle.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["PAGEPILOT_ORACLE_BASE_URL"],
        ),
        row("oracle.api_key", api_key.to_string(), &["PAGEPILOT_ORACLE_API_KEY"]),
        row(
            "oracle.timeout_secs",
            config.oracle.timeout_secs.to_string(),
            &["PAGEPILOT_ORACLE_TIMEOUT_SECS"],
        ),
        row(
            "agent.max_iterations",
            config.agent.max_iterations.to_string(),
            &["PAGEPILOT_AGENT_MAX_ITERATIONS"],
        ),
        row(
            "agent.classify_first",
            config.agent.classify_first.to_string(),
            &["PAGEPILOT_AGENT_CLASSIFY_FIRST"],
        ),
        row("context.store_dir", store_dir, &["PAGEPILOT_CONTEXT_STORE_DIR"]),
        row(
            "logging.level",
            config.logging.level.clone(),
            &["PAGEPILOT_LOGGING_LEVEL", "PAGEPILOT_LOG_LEVEL"],
        ),
        row(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["PAGEPILOT_LOGGING_FORMAT", "PAGEPILOT_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        rows.into_iter().map(|(key, value, env_keys)| render_line(key, &value, source(key, env_keys))),
    );
    lines.join("\n")
}

fn row(
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
) -> (&'static str, String, &'static [&'static str]) {
    (key, value, env_keys)
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from("pagepilot.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/pagepilot.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
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

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
