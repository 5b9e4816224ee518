//! Telegram LLM gate: trial and subscription checked chat bot with YooKassa payments
//!
//! (c) Softlandia 2025

use tokio_llm_telegram_gate::api;
use tokio_llm_telegram_gate::bot;
use tokio_llm_telegram_gate::core::entitlement::EntitlementEngine;
use tokio_llm_telegram_gate::core::locks::UserLocks;
use tokio_llm_telegram_gate::core::notices::Notices;
use tokio_llm_telegram_gate::core::payments::PaymentActivationHandler;
use tokio_llm_telegram_gate::core::services::ConversationOrchestrator;
use tokio_llm_telegram_gate::core::traits::ConversationService;
use tokio_llm_telegram_gate::infrastructure::completion::OpenAiCompletionClient;
use tokio_llm_telegram_gate::infrastructure::database::DatabaseConnection;
use tokio_llm_telegram_gate::infrastructure::repositories::DbRecordStore;
use tokio_llm_telegram_gate::infrastructure::settings::Settings;
use tokio_llm_telegram_gate::infrastructure::telegram::TelegramNotifier;
use tokio_llm_telegram_gate::infrastructure::yookassa::YooKassaGateway;

use anyhow::anyhow;
use axum::Router;
use di::{Injectable, ServiceCollection, ServiceProvider};
use di_axum::RouterServiceProviderExtensions;
use log::{info, warn};
use std::time::Duration;
use teloxide::Bot;
use tokio::runtime::{Builder, Runtime};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Upper bound for one HTTP request, webhook processing included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> anyhow::Result<()> {
    // initialize tracing
    tracing_subscriber::fmt::init();

    // fail fast on malformed configuration, the DI constructor would fall back to defaults
    let settings = Settings::from_env()?;

    let runtime: Runtime = Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run(settings))
}

fn services() -> anyhow::Result<ServiceProvider> {
    ServiceCollection::new()
        .add(Settings::singleton())
        .add(DatabaseConnection::singleton())
        .add(DbRecordStore::singleton())
        .add(Notices::singleton())
        .add(UserLocks::singleton())
        .add(TelegramNotifier::singleton())
        .add(OpenAiCompletionClient::singleton())
        .add(YooKassaGateway::singleton())
        .add(EntitlementEngine::singleton())
        .add(PaymentActivationHandler::singleton())
        .add(ConversationOrchestrator::singleton())
        .build_provider()
        .map_err(|e| anyhow!("invalid service registrations: {e:?}"))
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let provider = services()?;

    provider
        .get_required::<DatabaseConnection>()
        .migrate()
        .await?;

    let bot_task = match &settings.telegram_token {
        Some(token) => {
            let conversations = provider.get_required::<dyn ConversationService>();
            Some(tokio::spawn(bot::run(Bot::new(token), conversations)))
        }
        None => {
            warn!("TELEGRAM_TOKEN is not set, running the HTTP API only");
            None
        }
    };

    let app = Router::new()
        .merge(api::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_provider(provider);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c, serving until killed: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    info!("Shutting down...");

    if let Some(bot_task) = bot_task {
        bot_task.await?;
    }

    Ok(())
}
