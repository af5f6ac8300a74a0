use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use shopmate_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = detect_config_path();
    let file_doc = load_config_file_doc(file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, file_doc.as_ref(), file_path.as_deref())
    };

    let llm_api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_key(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let privileged = config
        .orchestrator
        .privileged_functions
        .iter()
        .map(|name| name.as_str())
        .collect::<Vec<_>>()
        .join(",");

    let rows = [
        (
            "llm.provider",
            format!("{:?}", config.llm.provider),
            source("llm.provider", &["SHOPMATE_LLM_PROVIDER"]),
        ),
        ("llm.model", config.llm.model.clone(), source("llm.model", &["SHOPMATE_LLM_MODEL"])),
        (
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            source("llm.base_url", &["SHOPMATE_LLM_BASE_URL"]),
        ),
        ("llm.api_key", llm_api_key, source("llm.api_key", &["SHOPMATE_LLM_API_KEY"])),
        (
            "llm.timeout_secs",
            config.llm.timeout_secs.to_string(),
            source("llm.timeout_secs", &["SHOPMATE_LLM_TIMEOUT_SECS"]),
        ),
        (
            "orchestrator.max_iterations",
            config.orchestrator.max_iterations.to_string(),
            source("orchestrator.max_iterations", &["SHOPMATE_ORCHESTRATOR_MAX_ITERATIONS"]),
        ),
        (
            "orchestrator.capability_timeout_secs",
            config.orchestrator.capability_timeout_secs.to_string(),
            source(
                "orchestrator.capability_timeout_secs",
                &["SHOPMATE_ORCHESTRATOR_CAPABILITY_TIMEOUT_SECS"],
            ),
        ),
        (
            "orchestrator.validation_timeout_secs",
            config.orchestrator.validation_timeout_secs.to_string(),
            source(
                "orchestrator.validation_timeout_secs",
                &["SHOPMATE_ORCHESTRATOR_VALIDATION_TIMEOUT_SECS"],
            ),
        ),
        (
            "orchestrator.privileged_functions",
            privileged,
            source(
                "orchestrator.privileged_functions",
                &["SHOPMATE_ORCHESTRATOR_PRIVILEGED_FUNCTIONS"],
            ),
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            source("logging.level", &["SHOPMATE_LOGGING_LEVEL", "SHOPMATE_LOG_LEVEL"]),
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            source("logging.format", &["SHOPMATE_LOGGING_FORMAT", "SHOPMATE_LOG_FORMAT"]),
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(rows.iter().map(|(key, value, source)| render_line(key, value, source)));
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("shopmate.toml"), PathBuf::from("config/shopmate.toml")]
        .into_iter()
        .find(|path| path.exists())
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

fn render_line(key: &str, value: &str, source: &str) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
