use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plenum::{ai, engine::Engine, repo::MemoryMeetingRepo, store::MemorySessionStore, ws};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plenum=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting plenum...");

    // Initialize the AI collaborator
    let ai_config = ai::AiConfig::from_env();
    let summarizer = match ai_config.build() {
        Ok(summarizer) => {
            tracing::info!("AI collaborator initialized");
            Some(Arc::new(summarizer) as Arc<dyn ai::Summarizer>)
        }
        Err(e) => {
            tracing::warn!(
                "AI collaborator not available: {}. Summaries and AI groupings are disabled.",
                e
            );
            None
        }
    };

    // In-process session store and durable-store stand-in; production
    // deployments implement SessionStore / MeetingRepo against their
    // real backends
    let engine = Engine::new(
        Arc::new(MemorySessionStore::new()),
        Arc::new(MemoryMeetingRepo::new()),
        summarizer,
    );

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/healthz", get(|| async { "ok" }))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(engine);

    let port = std::env::var("PLENUM_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
