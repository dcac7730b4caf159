//! Web server module
//!
//! The axum surface: the `/api/practice` WebSocket endpoint plus the thin
//! JSON API (scenarios, languages, translation) and optional static serving
//! of the client bundle. The session core reaches its external services
//! through the capability trait objects carried in [`ServerState`], so
//! tests can swap in deterministic backends.

pub mod api;
pub mod practice;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::cache::FileCache;
use crate::config::Config;
use crate::enrich::{Enricher, GeminiEnricher};
use crate::live::{GeminiLive, LiveConnector};

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub enricher: Arc<dyn Enricher>,
    pub live: Arc<dyn LiveConnector>,
}

impl ServerState {
    /// Build production state from configuration
    pub fn from_config(config: Config) -> Result<Self> {
        let api_key = config
            .gemini_api_key()
            .context("GEMINI_API_KEY is not configured")?
            .to_string();
        let tts_api_key = config
            .tts_api_key()
            .unwrap_or(api_key.as_str())
            .to_string();

        let cache = match &config.cache_dir {
            Some(dir) => Some(FileCache::new(dir)?),
            None => None,
        };

        let enricher = Arc::new(GeminiEnricher::new(
            api_key.clone(),
            tts_api_key,
            config.models.clone(),
            cache,
        ));
        let live = Arc::new(GeminiLive::new(api_key));

        Ok(Self {
            config: Arc::new(config),
            enricher,
            live,
        })
    }
}

/// Build the application router
pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/api/practice", get(practice::practice_handler))
        .route("/api/scenarios", get(api::scenarios_handler))
        .route("/api/languages", get(api::languages_handler))
        .route("/api/translate", post(api::translate_handler));

    if let Some(static_dir) = &state.config.server.static_dir {
        let index = static_dir.join("index.html");
        app = app.fallback_service(ServeDir::new(static_dir).fallback(ServeFile::new(index)));
    }

    app.layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server and serve until the process exits
pub async fn start(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("parsing listen address")?;
    let state = ServerState::from_config(config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("listening on http://{}", addr);
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
