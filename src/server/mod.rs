pub mod api;
pub mod dtos;
pub mod error;
pub mod services;
pub mod utils;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{Extension, Router, ServiceExt, extract::Request, http::HeaderValue, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use tower::Layer;
use tower_http::{
    cors::{Any, CorsLayer},
    normalize_path::NormalizePathLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::AppConfig;
use api::{
    health_controller::health_endpoint, playlist_controller::PlaylistController,
    stream_controller::StreamController,
};
use services::AppServices;

static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_uptime_seconds() -> u64 {
    START_TIME.elapsed().as_secs()
}

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct RestreamServer;

impl RestreamServer {
    pub async fn serve(config: Arc<AppConfig>) -> anyhow::Result<()> {
        Lazy::force(&START_TIME);

        let services = AppServices::new(config.clone());

        // a second install in the same process fails, /metrics just goes away in that case
        let metrics = match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("prometheus recorder not installed: {}", e);
                None
            }
        };

        let app = Self::router(services, metrics);

        // trailing slashes have to be trimmed before routing, so this wraps the whole router
        let app = NormalizePathLayer::trim_trailing_slash().layer(app);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        info!("restream listening on http://{}", addr);

        axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
            .with_graceful_shutdown(Self::shutdown_signal())
            .await
            .context("error while serving")?;

        info!("restream shut down");
        Ok(())
    }

    pub fn router(services: AppServices, metrics: Option<PrometheusHandle>) -> Router {
        let cors = Self::cors_layer(&services.config.cors_origin);

        let mut router = Router::new()
            .route("/health", get(health_endpoint))
            .nest("/api/v1/playlists", PlaylistController::app())
            .nest("/api/v1/watch", PlaylistController::watch_app())
            .nest("/api/v1/stream", StreamController::app());

        if let Some(handle) = metrics {
            router = router.route("/metrics", get(move || std::future::ready(handle.render())));
        }

        router
            .layer(Extension(services))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    fn cors_layer(cors_origin: &str) -> CorsLayer {
        if cors_origin.trim() == "*" {
            return CorsLayer::new().allow_origin(Any).allow_methods(Any);
        }

        let origins: Vec<HeaderValue> = cors_origin
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("ignoring invalid cors origin: {}", o);
                    None
                }
            })
            .collect();

        CorsLayer::new().allow_origin(origins).allow_methods(Any)
    }

    async fn shutdown_signal() {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
        info!("ctrl-c received, shutting down");
    }
}
