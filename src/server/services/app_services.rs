use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::AppConfig;

use super::{
    playlist_services::{ChannelCache, DynChannelCache, HttpPlaylistFetcher},
    transcode_services::{DynTranscoder, Transcoder},
};

/// everything the controllers need, built once at startup and handed to the router
#[derive(Clone)]
pub struct AppServices {
    pub channels: DynChannelCache,
    pub transcoder: DynTranscoder,
    pub config: Arc<AppConfig>,
}

impl AppServices {
    pub fn new(config: Arc<AppConfig>) -> Self {
        info!("starting services...");

        let fetcher = Arc::new(HttpPlaylistFetcher::new(Duration::from_secs(
            config.fetch_timeout_seconds,
        )));

        let channels = Arc::new(
            ChannelCache::new(
                config.playlists.clone(),
                fetcher,
                Duration::from_secs(config.cache_ttl_seconds),
            )
            .with_stale_on_error(config.serve_stale_on_error),
        ) as DynChannelCache;

        info!(
            "channel cache ok ({} playlists, ttl {}s), starting transcoder...",
            config.playlists.len(),
            config.cache_ttl_seconds
        );

        let transcoder = Arc::new(Transcoder::new(
            config.ffmpeg_path.clone(),
            config.transcode_chunk_size,
        )) as DynTranscoder;

        Self::from_parts(channels, transcoder, config)
    }

    /// for wiring in other implementations, mostly tests
    pub fn from_parts(
        channels: DynChannelCache,
        transcoder: DynTranscoder,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            channels,
            transcoder,
            config,
        }
    }
}
