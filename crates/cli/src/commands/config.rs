use std::env;

use rewear_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;

/// Render the effective configuration with a source column and secret
/// redaction. Precedence: env > file > default.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line("database.url", &config.database.url, "REWEAR_DATABASE_URL"));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        "REWEAR_DATABASE_MAX_CONNECTIONS",
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        "REWEAR_DATABASE_TIMEOUT_SECS",
    ));

    lines.push(render_line(
        "gateway.auth_token",
        &redact_token(config.gateway.auth_token.expose_secret()),
        "REWEAR_GATEWAY_AUTH_TOKEN",
    ));
    lines.push(render_line(
        "gateway.webhook_secret",
        &config
            .gateway
            .webhook_secret
            .as_ref()
            .map(|secret| redact_token(secret.expose_secret()))
            .unwrap_or_else(|| "(unset)".to_string()),
        "REWEAR_GATEWAY_WEBHOOK_SECRET",
    ));

    lines.push(render_line(
        "extractor.base_url",
        config.extractor.base_url.as_deref().unwrap_or("(unset)"),
        "REWEAR_EXTRACTOR_BASE_URL",
    ));
    lines.push(render_line(
        "extractor.api_key",
        &config
            .extractor
            .api_key
            .as_ref()
            .map(|key| redact_token(key.expose_secret()))
            .unwrap_or_else(|| "(unset)".to_string()),
        "REWEAR_EXTRACTOR_API_KEY",
    ));
    lines.push(render_line("extractor.model", &config.extractor.model, "REWEAR_EXTRACTOR_MODEL"));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        "REWEAR_SERVER_BIND_ADDRESS",
    ));
    lines.push(render_line("server.port", &config.server.port.to_string(), "REWEAR_SERVER_PORT"));

    lines.push(render_line(
        "selling.min_photos",
        &config.selling.min_photos.to_string(),
        "REWEAR_SELLING_MIN_PHOTOS",
    ));
    lines.push(render_line(
        "selling.max_auth_attempts",
        &config.selling.max_auth_attempts.to_string(),
        "REWEAR_SELLING_MAX_AUTH_ATTEMPTS",
    ));
    lines.push(render_line(
        "selling.attempt_window_cap",
        &config.selling.attempt_window_cap.to_string(),
        "REWEAR_SELLING_ATTEMPT_WINDOW_CAP",
    ));

    lines.push(render_line("logging.level", &config.logging.level, "REWEAR_LOGGING_LEVEL"));

    lines.join("\n")
}

fn render_line(key: &str, value: &str, env_var: &str) -> String {
    let source = if env::var(env_var).map(|raw| !raw.trim().is_empty()).unwrap_or(false) {
        "env"
    } else {
        "file/default"
    };
    format!("  {key} = {value} ({source})")
}

fn redact_token(token: &str) -> String {
    if token.is_empty() {
        return "(unset)".to_string();
    }
    if token.len() <= 4 {
        return "****".to_string();
    }
    format!("{}****", &token[..4])
}
