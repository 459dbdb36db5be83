mod handlers;
mod session;
mod types;

pub use handlers::AppState;
pub use session::{SESSION_COOKIE, SESSION_HEADER, Session};
pub use types::*;

use crate::{
    Result,
    config::Config,
    history::{ConversationAccumulator, ConversationStore},
    resolver::BackendResolver,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Every route answers a wrong method with a JSON 405.
pub fn router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route(
            "/describe",
            post(handlers::describe).fallback(handlers::method_not_allowed),
        )
        .route(
            "/generate",
            post(handlers::generate).fallback(handlers::method_not_allowed),
        )
        .route(
            "/chat",
            post(handlers::chat).fallback(handlers::method_not_allowed),
        )
        .route(
            "/new_chat",
            post(handlers::new_chat).fallback(handlers::method_not_allowed),
        )
        .route(
            "/ui",
            get(handlers::ui).fallback(handlers::method_not_allowed),
        )
        .route(
            "/health",
            get(handlers::health).fallback(handlers::method_not_allowed),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: Config) -> Result<()> {
    // Initialize conversation storage
    let store = ConversationStore::new(&config.history.database_path).await?;
    if !store.is_persistent() {
        warn!("Conversation history will not survive a restart");
    }
    let conversations = ConversationAccumulator::new(Arc::new(store), config.history.max_turns);

    // Backends are constructed eagerly; local models load on first use
    let resolver = BackendResolver::from_config(&config)?;
    info!(
        "Backends ready (vision: {}, judge enabled: {})",
        config.vision.model,
        resolver.judging_enabled()
    );

    let state = AppState {
        resolver: Arc::new(resolver),
        conversations: Arc::new(conversations),
        image: config.image.clone(),
    };
    let app = router(state, config.server.body_limit_bytes);

    // Start server
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
