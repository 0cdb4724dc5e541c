use relay_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_secret(key.expose_secret()))
        .unwrap_or_else(|| "(unset)".to_string());

    let lines = vec![
        "effective config (source precedence: env > file > default):".to_string(),
        format!("database.url = {}", config.database.url),
        format!("database.max_connections = {}", config.database.max_connections),
        format!("database.timeout_secs = {}", config.database.timeout_secs),
        format!("llm.api_key = {api_key}"),
        format!("llm.base_url = {}", config.llm.base_url),
        format!("llm.timeout_secs = {}", config.llm.timeout_secs),
        format!("engine.max_round_trips = {}", config.engine.max_round_trips),
        format!("engine.tool_timeout_secs = {}", config.engine.tool_timeout_secs),
        format!("engine.default_locale = {}", config.engine.default_locale),
        format!("logging.level = {}", config.logging.level),
        format!("logging.format = {:?}", config.logging.format),
    ];

    lines.join("\n")
}

/// Keeps just enough of the key to confirm which credential is loaded.
fn redact_secret(value: &str) -> String {
    let prefix: String = value.chars().take(4).collect();
    format!("{prefix}…[redacted]")
}

#[cfg(test)]
mod tests {
    use super::redact_secret;

    #[test]
    fn redaction_never_echoes_the_full_secret() {
        let redacted = redact_secret("sk-ant-very-secret-key");
        assert!(redacted.starts_with("sk-a"));
        assert!(!redacted.contains("very-secret"));
    }
}
