//! FinBot Gateway - Conversational financial-literacy assistant.
//!
//! This crate provides the HTTP service behind the FinBot chat UI:
//! - Session-scoped conversation history held in memory
//! - Glossary ranking of each question by keyword overlap
//! - Prompt assembly and Gemini completions with retry
//! - Per-message feedback capture
//!
//! ## Architecture
//!
//! ```text
//! Client → /chat → session store (append) → ranker → prompt → provider
//!                        ↑                                       ↓
//!                        └──────────── attach reply ←────────────┘
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod chat;
pub mod glossary;
pub mod prompt;
pub mod provider;
pub mod ranking;
pub mod routes;
pub mod session;

pub use chat::{ChatError, ChatOutcome, ChatService, ChatSettings};
pub use glossary::{Glossary, GlossaryEntry};
pub use provider::{
    ChatRequest, ChatResponse, GeminiProvider, Provider, ProviderError, ResilienceConfig,
    ResilientProvider,
};
pub use routes::{build_router, AppState};
pub use session::{FeedbackKind, SessionStore};

use finbot_common::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;

/// Load the glossary named in the config, or the built-in one.
pub fn load_glossary(config: &Config) -> finbot_common::Result<Glossary> {
    match config.glossary.resolved_path() {
        Some(path) => Glossary::load_or_init(&path),
        None => Ok(Glossary::builtin()),
    }
}

/// Wire the store, glossary and provider into application state.
pub fn build_state(config: &Config, glossary: Glossary, provider: Arc<dyn Provider>) -> AppState {
    let service = ChatService::new(
        Arc::new(SessionStore::new()),
        Arc::new(glossary),
        provider,
        ChatSettings::from(config),
    );
    AppState::new(Arc::new(service))
}

/// Build application state against Gemini, as configured.
pub fn build_state_from_config(config: &Config) -> finbot_common::Result<AppState> {
    let glossary = load_glossary(config)?;

    let gemini = GeminiProvider::from_config(&config.llm);
    if !gemini.has_api_key() {
        tracing::warn!("No Gemini API key configured; chat requests will fail");
    }
    let provider: Arc<dyn Provider> = Arc::new(ResilientProvider::single(
        Arc::new(gemini),
        ResilienceConfig::from(&config.llm),
    ));

    Ok(build_state(config, glossary, provider))
}

/// Start the gateway server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.bind_address().parse::<std::net::IpAddr>()?,
        config.port(),
    ));

    let state = build_state_from_config(config)?;
    tracing::info!(
        glossary_entries = state.chat.glossary().len(),
        model = %config.llm.model,
        max_sessions = config.session.max_sessions,
        "Gateway state ready"
    );

    let router = build_router(state, config.server.body_limit_bytes);

    tracing::info!("Starting FinBot Gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("FinBot Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
