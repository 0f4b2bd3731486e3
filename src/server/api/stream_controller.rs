use axum::{
    Extension, Router,
    body::Body,
    extract::{Path, Query},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tracing::info;

use crate::server::{
    api::playlist_controller::PlaylistController,
    error::AppResult,
    services::AppServices,
    utils::ffmpeg_utils::{ProfileName, TranscodeProfile},
};

#[derive(Deserialize)]
struct StreamQuery {
    #[serde(default)]
    profile: ProfileName,
}

pub struct StreamController;

impl StreamController {
    pub fn app() -> Router {
        Router::new().route("/{name}/{idx}", get(Self::stream_channel))
    }

    /// re-encodes the channel through ffmpeg and streams it back
    ///
    /// if the source is dead the body is just empty, the player deals with it
    async fn stream_channel(
        Extension(services): Extension<AppServices>,
        Path((name, idx)): Path<(String, String)>,
        Query(query): Query<StreamQuery>,
    ) -> AppResult<Response> {
        let (idx, channel) = PlaylistController::find_channel(&services, &name, &idx).await?;
        let profile = TranscodeProfile::from(query.profile);

        info!(
            "[{}] streaming channel {} ({}) with {:?} profile",
            name, idx, channel.title, query.profile
        );

        let stream = services
            .transcoder
            .open_transcode(&channel.url, &profile)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static(profile.container.content_type()),
        );
        headers.insert(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static("no-cache"),
        );
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            header::HeaderValue::from_static("nosniff"),
        );

        Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response())
    }
}
