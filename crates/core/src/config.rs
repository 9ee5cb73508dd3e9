use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub extractor: ExtractorConfig,
    pub server: ServerConfig,
    pub selling: SellingConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Messaging gateway credentials. The auth token authenticates outbound
/// API calls; the webhook secret, when set, is what inbound requests
/// must present.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub auth_token: SecretString,
    pub webhook_secret: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct ExtractorConfig {
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl ExtractorConfig {
    /// Without a base URL the deterministic keyword extractor is used
    /// instead of the hosted model.
    pub fn remote_enabled(&self) -> bool {
        self.base_url.as_deref().is_some_and(|url| !url.trim().is_empty())
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

/// Knobs for the conversation flows.
#[derive(Clone, Debug)]
pub struct SellingConfig {
    pub min_photos: u32,
    pub max_auth_attempts: u32,
    pub attempt_window_cap: u32,
    pub attempt_window_secs: u64,
    pub confusion_threshold: u8,
    pub default_commission_pct: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub gateway_auth_token: Option<String>,
    pub gateway_webhook_secret: Option<String>,
    pub extractor_base_url: Option<String>,
    pub extractor_api_key: Option<String>,
    pub extractor_model: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://rewear.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            gateway: GatewayConfig { auth_token: String::new().into(), webhook_secret: None },
            extractor: ExtractorConfig {
                base_url: None,
                api_key: None,
                model: "listing-extract-v1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            selling: SellingConfig {
                min_photos: 3,
                max_auth_attempts: 3,
                attempt_window_cap: 10,
                attempt_window_secs: 3_600,
                confusion_threshold: 3,
                default_commission_pct: 20,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("rewear.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(gateway) = patch.gateway {
            if let Some(auth_token_value) = gateway.auth_token {
                self.gateway.auth_token = auth_token_value.into();
            }
            if let Some(webhook_secret_value) = gateway.webhook_secret {
                self.gateway.webhook_secret = Some(webhook_secret_value.into());
            }
        }

        if let Some(extractor) = patch.extractor {
            if let Some(base_url) = extractor.base_url {
                self.extractor.base_url = Some(base_url);
            }
            if let Some(api_key_value) = extractor.api_key {
                self.extractor.api_key = Some(api_key_value.into());
            }
            if let Some(model) = extractor.model {
                self.extractor.model = model;
            }
            if let Some(timeout_secs) = extractor.timeout_secs {
                self.extractor.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = extractor.max_retries {
                self.extractor.max_retries = max_retries;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(selling) = patch.selling {
            if let Some(min_photos) = selling.min_photos {
                self.selling.min_photos = min_photos;
            }
            if let Some(max_auth_attempts) = selling.max_auth_attempts {
                self.selling.max_auth_attempts = max_auth_attempts;
            }
            if let Some(attempt_window_cap) = selling.attempt_window_cap {
                self.selling.attempt_window_cap = attempt_window_cap;
            }
            if let Some(attempt_window_secs) = selling.attempt_window_secs {
                self.selling.attempt_window_secs = attempt_window_secs;
            }
            if let Some(confusion_threshold) = selling.confusion_threshold {
                self.selling.confusion_threshold = confusion_threshold;
            }
            if let Some(default_commission_pct) = selling.default_commission_pct {
                self.selling.default_commission_pct = default_commission_pct;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("REWEAR_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("REWEAR_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("REWEAR_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("REWEAR_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("REWEAR_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("REWEAR_GATEWAY_AUTH_TOKEN") {
            self.gateway.auth_token = value.into();
        }
        if let Some(value) = read_env("REWEAR_GATEWAY_WEBHOOK_SECRET") {
            self.gateway.webhook_secret = Some(value.into());
        }

        if let Some(value) = read_env("REWEAR_EXTRACTOR_BASE_URL") {
            self.extractor.base_url = Some(value);
        }
        if let Some(value) = read_env("REWEAR_EXTRACTOR_API_KEY") {
            self.extractor.api_key = Some(value.into());
        }
        if let Some(value) = read_env("REWEAR_EXTRACTOR_MODEL") {
            self.extractor.model = value;
        }
        if let Some(value) = read_env("REWEAR_EXTRACTOR_TIMEOUT_SECS") {
            self.extractor.timeout_secs = parse_u64("REWEAR_EXTRACTOR_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("REWEAR_EXTRACTOR_MAX_RETRIES") {
            self.extractor.max_retries = parse_u32("REWEAR_EXTRACTOR_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("REWEAR_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("REWEAR_SERVER_PORT") {
            self.server.port = parse_u16("REWEAR_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("REWEAR_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("REWEAR_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("REWEAR_SELLING_MIN_PHOTOS") {
            self.selling.min_photos = parse_u32("REWEAR_SELLING_MIN_PHOTOS", &value)?;
        }
        if let Some(value) = read_env("REWEAR_SELLING_MAX_AUTH_ATTEMPTS") {
            self.selling.max_auth_attempts =
                parse_u32("REWEAR_SELLING_MAX_AUTH_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("REWEAR_SELLING_ATTEMPT_WINDOW_CAP") {
            self.selling.attempt_window_cap =
                parse_u32("REWEAR_SELLING_ATTEMPT_WINDOW_CAP", &value)?;
        }
        if let Some(value) = read_env("REWEAR_SELLING_ATTEMPT_WINDOW_SECS") {
            self.selling.attempt_window_secs =
                parse_u64("REWEAR_SELLING_ATTEMPT_WINDOW_SECS", &value)?;
        }

        let log_level = read_env("REWEAR_LOGGING_LEVEL").or_else(|| read_env("REWEAR_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("REWEAR_LOGGING_FORMAT").or_else(|| read_env("REWEAR_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(auth_token) = overrides.gateway_auth_token {
            self.gateway.auth_token = auth_token.into();
        }
        if let Some(webhook_secret) = overrides.gateway_webhook_secret {
            self.gateway.webhook_secret = Some(webhook_secret.into());
        }
        if let Some(base_url) = overrides.extractor_base_url {
            self.extractor.base_url = Some(base_url);
        }
        if let Some(api_key) = overrides.extractor_api_key {
            self.extractor.api_key = Some(api_key.into());
        }
        if let Some(model) = overrides.extractor_model {
            self.extractor.model = model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_gateway(&self.gateway)?;
        validate_extractor(&self.extractor)?;
        validate_server(&self.server)?;
        validate_selling(&self.selling)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("rewear.toml"), PathBuf::from("config/rewear.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    if gateway.auth_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "gateway.auth_token is required. Copy it from your messaging provider's console"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_extractor(extractor: &ExtractorConfig) -> Result<(), ConfigError> {
    if extractor.timeout_secs == 0 || extractor.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "extractor.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if extractor.remote_enabled() {
        let missing = extractor
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "extractor.api_key is required when extractor.base_url is set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation(
            "server.port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_selling(selling: &SellingConfig) -> Result<(), ConfigError> {
    if selling.min_photos == 0 {
        return Err(ConfigError::Validation(
            "selling.min_photos must be greater than zero".to_string(),
        ));
    }
    if selling.max_auth_attempts == 0 {
        return Err(ConfigError::Validation(
            "selling.max_auth_attempts must be greater than zero".to_string(),
        ));
    }
    if selling.attempt_window_cap < selling.max_auth_attempts {
        return Err(ConfigError::Validation(
            "selling.attempt_window_cap must be at least selling.max_auth_attempts".to_string(),
        ));
    }
    if selling.attempt_window_secs == 0 {
        return Err(ConfigError::Validation(
            "selling.attempt_window_secs must be greater than zero".to_string(),
        ));
    }
    if selling.confusion_threshold == 0 {
        return Err(ConfigError::Validation(
            "selling.confusion_threshold must be greater than zero".to_string(),
        ));
    }
    if selling.default_commission_pct > 100 {
        return Err(ConfigError::Validation(
            "selling.default_commission_pct must be in range 0..=100".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    gateway: Option<GatewayPatch>,
    extractor: Option<ExtractorPatch>,
    server: Option<ServerPatch>,
    selling: Option<SellingPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    auth_token: Option<String>,
    webhook_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractorPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SellingPatch {
    min_photos: Option<u32>,
    max_auth_attempts: Option<u32>,
    attempt_window_cap: Option<u32>,
    attempt_window_secs: Option<u64>,
    confusion_threshold: Option<u8>,
    default_commission_pct: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_GATEWAY_AUTH_TOKEN", "gw-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("rewear.toml");
            fs::write(
                &path,
                r#"
[gateway]
auth_token = "${TEST_GATEWAY_AUTH_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.gateway.auth_token.expose_secret() == "gw-from-env",
                "gateway token should be loaded from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_GATEWAY_AUTH_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REWEAR_GATEWAY_AUTH_TOKEN", "gw-test");
        env::set_var("REWEAR_LOG_LEVEL", "warn");
        env::set_var("REWEAR_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["REWEAR_GATEWAY_AUTH_TOKEN", "REWEAR_LOG_LEVEL", "REWEAR_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REWEAR_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("REWEAR_GATEWAY_AUTH_TOKEN", "gw-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("rewear.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[gateway]
auth_token = "gw-from-file"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.gateway.auth_token.expose_secret() == "gw-from-env",
                "env gateway token should win over file and defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["REWEAR_DATABASE_URL", "REWEAR_GATEWAY_AUTH_TOKEN"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["REWEAR_GATEWAY_AUTH_TOKEN"]);

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => return Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("gateway.auth_token")
        );
        ensure(has_message, "validation failure should mention gateway.auth_token")
    }

    #[test]
    fn remote_extractor_requires_api_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REWEAR_GATEWAY_AUTH_TOKEN", "gw-test");
        env::set_var("REWEAR_EXTRACTOR_BASE_URL", "https://extract.example.com");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected extractor validation failure".to_string()),
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("extractor.api_key")
            );
            ensure(has_message, "validation failure should mention extractor.api_key")
        })();

        clear_vars(&["REWEAR_GATEWAY_AUTH_TOKEN", "REWEAR_EXTRACTOR_BASE_URL"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REWEAR_GATEWAY_AUTH_TOKEN", "gw-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("gw-secret-value"),
                "debug output should not contain the gateway token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["REWEAR_GATEWAY_AUTH_TOKEN"]);
        result
    }
}
