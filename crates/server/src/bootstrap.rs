use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;

use rewear_agent::extractor::{
    ExtractionSpec, FieldExtractor, KeywordFieldExtractor, LlmFieldExtractor,
};
use rewear_agent::llm::HttpLlmClient;
use rewear_agent::photos::{PassthroughPhotoStore, PhotoIntake};
use rewear_agent::runtime::{ConversationRuntime, RuntimeConfig};
use rewear_agent::session::{AuthPolicy, SessionManager};
use rewear_agent::submit::{NoopEmailNotifier, PreviewCatalogClient, SubmissionPipeline};
use rewear_agent::vision::{LenientPhotoClassifier, LlmPhotoClassifier, PhotoClassifier};
use rewear_core::config::{AppConfig, ConfigError, LoadOptions};
use rewear_core::retry::RetryPolicy;
use rewear_db::repositories::{SqlConversationRepository, SqlDraftRepository, SqlSellerRepository};
use rewear_db::{connect_with_settings, migrations, DbPool};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<ConversationRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("extraction client setup failed: {0}")]
    Extractor(#[source] anyhow::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let sellers = Arc::new(SqlSellerRepository::new(db_pool.clone()));
    let conversations = Arc::new(SqlConversationRepository::new(db_pool.clone()));
    let drafts = Arc::new(SqlDraftRepository::new(db_pool.clone()));

    let retry = RetryPolicy {
        max_attempts: config.extractor.max_retries.max(1),
        ..RetryPolicy::default()
    };

    // Without a hosted extraction backend the deterministic keyword
    // extractor and the lenient classifier keep the flow functional.
    let (extractor, classifier): (Arc<dyn FieldExtractor>, Arc<dyn PhotoClassifier>) =
        if config.extractor.remote_enabled() {
            let client =
                Arc::new(HttpLlmClient::from_config(&config.extractor).map_err(BootstrapError::Extractor)?);
            (
                Arc::new(LlmFieldExtractor::new(
                    client.clone(),
                    ExtractionSpec::default(),
                    retry.clone(),
                )),
                Arc::new(LlmPhotoClassifier::new(client)),
            )
        } else {
            (Arc::new(KeywordFieldExtractor::new()), Arc::new(LenientPhotoClassifier))
        };

    info!(
        event_name = "system.bootstrap.extractor_mode",
        correlation_id = "bootstrap",
        mode = if config.extractor.remote_enabled() { "remote" } else { "keyword" },
        "field extractor initialized"
    );

    let session = SessionManager::new(
        sellers,
        conversations.clone(),
        AuthPolicy::from(&config.selling),
        Decimal::from(config.selling.default_commission_pct),
    );
    let photos = PhotoIntake::new(
        classifier,
        Arc::new(PassthroughPhotoStore),
        drafts.clone(),
        retry,
    );
    let submission = SubmissionPipeline::new(
        Arc::new(PreviewCatalogClient),
        Arc::new(NoopEmailNotifier),
        drafts.clone(),
        config.selling.min_photos,
    );

    let runtime = Arc::new(ConversationRuntime::new(
        conversations,
        drafts,
        session,
        extractor,
        photos,
        submission,
        RuntimeConfig {
            min_photos: config.selling.min_photos,
            confusion_threshold: config.selling.confusion_threshold,
        },
    ));

    Ok(Application { config, db_pool, runtime })
}

#[cfg(test)]
mod tests {
    use rewear_core::config::{ConfigOverrides, LoadOptions};

    use super::bootstrap;

    fn valid_options(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                gateway_auth_token: Some("gw-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_a_gateway_token() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                gateway_auth_token: Some("   ".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("bootstrap must fail").to_string();
        assert!(message.contains("gateway.auth_token"), "actionable message: {message}");
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_wires_the_runtime() {
        let app = bootstrap(valid_options("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('seller', 'conversation', 'draft')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("foundation tables available after bootstrap");
        assert_eq!(table_count, 3, "bootstrap should expose the baseline tables");

        app.db_pool.close().await;
    }
}
