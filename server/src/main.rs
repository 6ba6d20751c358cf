use std::future::IntoFuture;

use celestial_server::config::ServerConfig;
use celestial_server::map::MapGeometry;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let map = match &config.map_path {
        Some(path) => MapGeometry::load(path),
        None => Ok(MapGeometry::default()),
    }
    .and_then(|map| map.validate(&config.sim).map(|_| map));
    let map = match map {
        Ok(map) => map,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(&config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", config.listen_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Celestial server on {} (capacity {}, tick {}s, {} obstacles)",
        config.listen_addr,
        config.sim.capacity,
        config.sim.tick_dt,
        map.obstacles.len()
    );

    let (router, game_loop) = celestial_server::build(config, map);
    let app = router.layer(CorsLayer::permissive());
    let game = tokio::spawn(game_loop);

    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        _ = game => tracing::info!("Game loop finished"),
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, shutting down"),
    }
}
