mod admin;
mod analytics;
mod api;
mod bootstrap;
mod console_auth;
mod health;
mod inbox;
mod pipeline;
mod webhook;

use std::time::Duration;

use anyhow::Result;
use axum::Router;
use balcao_core::config::{AppConfig, LoadOptions};
use tracing_subscriber::EnvFilter;

use crate::api::ConsoleState;
use crate::bootstrap::Application;
use crate::console_auth::ConsoleAuth;
use crate::webhook::WebhookState;

fn init_logging(config: &AppConfig) {
    use balcao_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

fn app_router(app: &Application) -> Router {
    let console = ConsoleState { db_pool: app.db_pool.clone(), sender: app.sender.clone() };
    let webhook = WebhookState {
        pipeline: app.pipeline.clone(),
        verify_token: app.config.whatsapp.verify_token.clone(),
        app_secret: app.config.whatsapp.app_secret.clone(),
    };

    let router = Router::new()
        .merge(health::router(app.db_pool.clone(), app.config.whatsapp.send_enabled))
        .merge(webhook::router(webhook));

    let Some(token) = app.config.server.console_token.clone() else {
        tracing::warn!(
            event_name = "system.console.disabled",
            correlation_id = "bootstrap",
            "server.console_token is unset; console endpoints are not mounted"
        );
        return router;
    };
    let console_routes = Router::new()
        .merge(inbox::router(console.clone()))
        .merge(admin::router(console.clone()))
        .merge(analytics::router(console));
    router.merge(console_auth::protect(console_routes, ConsoleAuth::new(token)))
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        send_enabled = app.config.whatsapp.send_enabled,
        "balcao-server listening"
    );

    axum::serve(listener, app_router(&app)).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "balcao-server stopping"
    );
    let drain = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(drain, app.db_pool.close()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.drain_timeout",
            correlation_id = "shutdown",
            "database pool did not close in time"
        );
    }

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for shutdown signal"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header::AUTHORIZATION, Request, StatusCode},
        Router,
    };
    use balcao_core::config::AppConfig;
    use secrecy::SecretString;
    use tower::ServiceExt;

    use super::app_router;
    use crate::bootstrap::Application;
    use crate::pipeline::tests::{pipeline_with, setup_pool};

    async fn router_for(console_token: Option<&str>) -> (Router, balcao_db::DbPool) {
        let pool = setup_pool().await;
        let (pipeline, sender) = pipeline_with(pool.clone(), None);
        let mut config = AppConfig::default();
        config.server.console_token = console_token.map(SecretString::from);
        let app = Application { config, db_pool: pool.clone(), pipeline: Arc::new(pipeline), sender };
        (app_router(&app), pool)
    }

    async fn status_of(app: &Router, uri: &str, token: Option<&str>) -> StatusCode {
        let mut request = Request::get(uri);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        app.clone()
            .oneshot(request.body(Body::empty()).expect("request"))
            .await
            .expect("response")
            .status()
    }

    #[tokio::test]
    async fn console_endpoints_require_the_configured_token() {
        let (app, pool) = router_for(Some("painel-secreto")).await;

        for uri in ["/api/v1/conversations", "/api/v1/agents", "/api/v1/analytics/leads"] {
            assert_eq!(status_of(&app, uri, None).await, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(status_of(&app, uri, Some("chute")).await, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(status_of(&app, uri, Some("painel-secreto")).await, StatusCode::OK, "{uri}");
        }
        assert_eq!(status_of(&app, "/health", None).await, StatusCode::OK);

        pool.close().await;
    }

    #[tokio::test]
    async fn console_is_not_mounted_without_a_token() {
        let (app, pool) = router_for(None).await;

        assert_eq!(status_of(&app, "/api/v1/conversations", None).await, StatusCode::NOT_FOUND);
        assert_eq!(status_of(&app, "/health", None).await, StatusCode::OK);

        pool.close().await;
    }
}
