use std::sync::Arc;

use axum::{Router, Extension};
use tower_http::services::ServeDir;
use tracing::info;
use tracing_subscriber::EnvFilter;

use live_room_relay::{config::Config, error::AppResult, routes, state::RoomRegistry};

#[tokio::main]
async fn main() -> AppResult<()> {
    let cfg = Arc::new(Config::from_env()?);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "live_room_relay=info,tower_http=info".into()),
        )
        .init();

    let rooms = RoomRegistry::new(cfg.room_intake);

    // viewer pages are served from disk, everything else is the relay
    let app = Router::new()
        .merge(routes::router())
        .fallback_service(ServeDir::new(&cfg.static_dir))
        .layer(Extension(rooms))
        .layer(Extension(cfg.clone()));

    let listener = tokio::net::TcpListener::bind(cfg.addr).await?;
    info!(addr = %cfg.addr, pages = %cfg.static_dir.display(), "relay listening");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown())
        .await?;
    Ok(())
}

async fn shutdown() {
    tokio::signal::ctrl_c().await.ok();
    info!("shutting down");
}
