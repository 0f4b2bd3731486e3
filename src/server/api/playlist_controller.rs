use axum::{
    Extension, Json, Router,
    extract::Path,
    response::Redirect,
    routing::{get, post},
};
use tracing::info;

use crate::playlist::Channel;
use crate::server::{
    dtos::channel_dto::{ChannelDto, ChannelListResponse, PlaylistsResponse, RefreshResponse},
    error::{AppResult, Error},
    services::AppServices,
};

pub struct PlaylistController;

impl PlaylistController {
    pub fn app() -> Router {
        Router::new()
            .route("/", get(Self::list_playlists))
            .route("/{name}", get(Self::list_channels))
            .route("/{name}/refresh", post(Self::refresh_playlist))
            .route("/{name}/{idx}", get(Self::get_channel))
    }

    /// raw source redirect, mounted separately under /watch
    pub fn watch_app() -> Router {
        Router::new().route("/{name}/{idx}", get(Self::watch_channel))
    }

    async fn list_playlists(
        Extension(services): Extension<AppServices>,
    ) -> Json<PlaylistsResponse> {
        Json(PlaylistsResponse {
            playlists: services.channels.playlist_names(),
        })
    }

    async fn list_channels(
        Extension(services): Extension<AppServices>,
        Path(name): Path<String>,
    ) -> AppResult<Json<ChannelListResponse>> {
        Self::ensure_playlist(&services, &name)?;

        // a failed fetch is an empty list here, not an error
        let channels = services.channels.get_channels(&name).await;
        let fallback = &services.config.logo_fallback;

        Ok(Json(ChannelListResponse {
            playlist: name,
            count: channels.len(),
            channels: channels
                .iter()
                .enumerate()
                .map(|(i, c)| ChannelDto::from_channel(i, c, fallback))
                .collect(),
        }))
    }

    async fn get_channel(
        Extension(services): Extension<AppServices>,
        Path((name, idx)): Path<(String, String)>,
    ) -> AppResult<Json<ChannelDto>> {
        let (idx, channel) = Self::find_channel(&services, &name, &idx).await?;

        Ok(Json(ChannelDto::from_channel(
            idx,
            &channel,
            &services.config.logo_fallback,
        )))
    }

    async fn watch_channel(
        Extension(services): Extension<AppServices>,
        Path((name, idx)): Path<(String, String)>,
    ) -> AppResult<Redirect> {
        let (_, channel) = Self::find_channel(&services, &name, &idx).await?;
        Ok(Redirect::temporary(&channel.url))
    }

    async fn refresh_playlist(
        Extension(services): Extension<AppServices>,
        Path(name): Path<String>,
    ) -> AppResult<Json<RefreshResponse>> {
        Self::ensure_playlist(&services, &name)?;

        info!("[{}] manual refresh requested", name);
        services.channels.invalidate(&name).await;
        let channels = services.channels.get_channels(&name).await;

        Ok(Json(RefreshResponse {
            playlist: name,
            count: channels.len(),
        }))
    }

    fn ensure_playlist(services: &AppServices, name: &str) -> AppResult<()> {
        if services.channels.has_playlist(name) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("playlist '{}' not found", name)))
        }
    }

    /// shared with the stream controller, unknown playlist and bad index are both 404s
    ///
    /// the index comes in raw so `-1` or a number too big for usize is a 404 like any other
    /// index past the end, instead of the extractor's plain text 400
    pub async fn find_channel(
        services: &AppServices,
        name: &str,
        idx: &str,
    ) -> AppResult<(usize, Channel)> {
        Self::ensure_playlist(services, name)?;

        let not_found = || Error::NotFound(format!("channel {} not found in '{}'", idx, name));
        let index: usize = idx.parse().map_err(|_| not_found())?;

        let channel = services
            .channels
            .get_channel(name, index)
            .await
            .ok_or_else(not_found)?;

        Ok((index, channel))
    }
}
