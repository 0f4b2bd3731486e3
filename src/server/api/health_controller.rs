use axum::Extension;
use axum::Json;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::error;

use crate::server::dtos::health_dto::{
    HealthResponse, HealthStatus, ServiceHealthDetails, TranscoderHealth,
};
use crate::server::services::AppServices;
use crate::server::{get_app_version, get_uptime_seconds};

/// health endpoint, the only real dependency is the ffmpeg binary
///
/// playlists are listed but not fetched, a slow iptv-org shouldn't fail the health check
pub async fn health_endpoint(
    Extension(services): Extension<AppServices>,
) -> (StatusCode, Json<HealthResponse>) {
    let transcoder_health = check_transcoder_health(&services).await;

    // channel lists still work without ffmpeg, only /stream is down
    let overall_status = match transcoder_health.status {
        HealthStatus::Unhealthy => HealthStatus::Degraded,
        status => status,
    };

    let response = HealthResponse {
        status: overall_status,
        timestamp: Utc::now(),
        uptime_seconds: get_uptime_seconds(),
        version: get_app_version().to_string(),
        environment: format!("{:?}", services.config.cargo_env).to_lowercase(),
        services: ServiceHealthDetails {
            transcoder: transcoder_health,
            playlists: services.channels.playlist_names().len(),
        },
    };

    let http_status = match overall_status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(response))
}

async fn check_transcoder_health(services: &AppServices) -> TranscoderHealth {
    match services.transcoder.health_check().await {
        Ok(response_time) => TranscoderHealth {
            status: HealthStatus::Healthy,
            response_time_ms: response_time,
        },
        Err(e) => {
            error!("transcoder health check failed: {}", e);
            TranscoderHealth {
                status: HealthStatus::Unhealthy,
                response_time_ms: 0.0,
            }
        }
    }
}
