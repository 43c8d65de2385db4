use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::{
    Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use vidfeed_api::media::MuxClient;
use vidfeed_api::{AppState, AppStateInner};
use vidfeed_db::Database;

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

/// Read a secret that must be set to a real value, or exit.
fn required_secret(name: &str) -> String {
    let value = std::env::var(name).unwrap_or_default();
    if value.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&value.as_str()) {
        eprintln!("FATAL: {} is unset or still a placeholder.", name);
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }
    value
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vidfeed=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret = required_secret("VIDFEED_JWT_SECRET");
    let identity_webhook_secret = required_secret("VIDFEED_IDENTITY_WEBHOOK_SECRET");
    let media_webhook_secret = required_secret("VIDFEED_MEDIA_WEBHOOK_SECRET");
    let media_token_id = required_secret("VIDFEED_MEDIA_TOKEN_ID");
    let media_token_secret = required_secret("VIDFEED_MEDIA_TOKEN_SECRET");
    let media_api_url =
        std::env::var("VIDFEED_MEDIA_API_URL").unwrap_or_else(|_| "https://api.mux.com".into());
    let media_cors_origin = std::env::var("VIDFEED_MEDIA_CORS_ORIGIN").unwrap_or_else(|_| "*".into());
    let db_path: PathBuf = std::env::var("VIDFEED_DB_PATH")
        .unwrap_or_else(|_| "vidfeed.db".into())
        .into();
    let host = std::env::var("VIDFEED_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("VIDFEED_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    let db = Database::open(&db_path)?;
    let media = MuxClient::new(media_api_url, media_token_id, media_token_secret, media_cors_origin);

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret,
        identity_webhook_secret,
        media_webhook_secret,
        media: Arc::new(media),
    });

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(false);

    let app = vidfeed_api::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("vidfeed listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable ({}), waiting for Ctrl+C", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
