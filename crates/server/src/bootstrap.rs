use std::sync::Arc;

use balcao_agent::llm::{HttpLlmClient, LlmClient, LlmError};
use balcao_agent::runtime::{AgentRuntime, RuntimeError};
use balcao_core::config::{AppConfig, ConfigError, LoadOptions};
use balcao_db::{connect_with_config, migrations, DbPool};
use balcao_whatsapp::{CloudApiSender, NoopSender, SendError, WhatsAppSender};
use thiserror::Error;
use tracing::info;

use crate::pipeline::MessagePipeline;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub pipeline: Arc<MessagePipeline>,
    pub sender: Arc<dyn WhatsAppSender>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client setup failed: {0}")]
    Llm(#[source] LlmError),
    #[error("whatsapp sender setup failed: {0}")]
    WhatsApp(#[source] SendError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
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

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
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

    let llm: Arc<dyn LlmClient> =
        Arc::new(HttpLlmClient::from_config(&config.llm).map_err(BootstrapError::Llm)?);
    let runtime = AgentRuntime::from_config(&config, Some(llm))?;

    let sender: Arc<dyn WhatsAppSender> = if config.whatsapp.send_enabled {
        Arc::new(CloudApiSender::new(&config.whatsapp).map_err(BootstrapError::WhatsApp)?)
    } else {
        Arc::new(NoopSender)
    };
    info!(
        event_name = "system.bootstrap.whatsapp_ready",
        correlation_id = "bootstrap",
        send_enabled = config.whatsapp.send_enabled,
        llm_provider = config.llm.provider.as_str(),
        "outbound integrations ready"
    );

    let pipeline = Arc::new(MessagePipeline::new(db_pool.clone(), Arc::new(runtime), sender.clone()));
    Ok(Application { config, db_pool, pipeline, sender })
}
