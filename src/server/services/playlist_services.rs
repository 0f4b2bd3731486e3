// playlist fetching and the per-playlist channel cache
use async_trait::async_trait;
use mockall::automock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    config::PlaylistSource,
    playlist::{CacheEntry, Channel},
    server::{
        error::{AppResult, Error},
        utils::m3u_utils::parse_m3u,
    },
};

pub type DynPlaylistFetcher = Arc<dyn PlaylistFetcherTrait + Send + Sync>;
pub type DynChannelCache = Arc<dyn ChannelCacheTrait + Send + Sync>;

#[automock]
#[async_trait]
pub trait PlaylistFetcherTrait {
    /// raw m3u text, any non 2xx or timeout is an error
    async fn fetch_playlist(&self, url: &str) -> AppResult<String>;
}

pub struct HttpPlaylistFetcher {
    http_client: reqwest::Client,
}

impl HttpPlaylistFetcher {
    pub fn new(timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("restream/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { http_client }
    }
}

#[async_trait]
impl PlaylistFetcherTrait for HttpPlaylistFetcher {
    async fn fetch_playlist(&self, url: &str) -> AppResult<String> {
        let response = self.http_client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus(status));
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
pub trait ChannelCacheTrait {
    /// channels for a playlist, empty when the name is unknown or the fetch failed
    async fn get_channels(&self, name: &str) -> Arc<Vec<Channel>>;

    /// None when the name is unknown or the index is past the end
    async fn get_channel(&self, name: &str, index: usize) -> Option<Channel>;

    /// forget the cached entry so the next lookup fetches again
    async fn invalidate(&self, name: &str);

    fn has_playlist(&self, name: &str) -> bool;

    /// configured playlist names, in config order
    fn playlist_names(&self) -> Vec<String>;
}

// one lock per playlist so a cold playlist is fetched once no matter how many requests pile up
type Slot = Arc<Mutex<Option<CacheEntry>>>;

pub struct ChannelCache {
    sources: Vec<PlaylistSource>,
    slots: HashMap<String, Slot>,
    fetcher: DynPlaylistFetcher,
    ttl: Duration,
    serve_stale_on_error: bool,
}

impl ChannelCache {
    pub fn new(sources: Vec<PlaylistSource>, fetcher: DynPlaylistFetcher, ttl: Duration) -> Self {
        // config validation rejects these at startup, first one wins if they get here anyway
        let mut slots: HashMap<String, Slot> = HashMap::new();
        let sources: Vec<PlaylistSource> = sources
            .into_iter()
            .filter(|s| {
                if slots.contains_key(&s.name) {
                    warn!("ignoring duplicate playlist '{}' ({})", s.name, s.url);
                    return false;
                }
                slots.insert(s.name.clone(), Arc::new(Mutex::new(None)));
                true
            })
            .collect();

        Self {
            sources,
            slots,
            fetcher,
            ttl,
            serve_stale_on_error: false,
        }
    }

    /// hand back the expired list instead of an empty one when a refresh fails
    pub fn with_stale_on_error(mut self, serve_stale_on_error: bool) -> Self {
        self.serve_stale_on_error = serve_stale_on_error;
        self
    }

    fn lookup(&self, name: &str) -> Option<(&PlaylistSource, &Slot)> {
        let source = self.sources.iter().find(|s| s.name == name)?;
        let slot = self.slots.get(name)?;
        Some((source, slot))
    }
}

#[async_trait]
impl ChannelCacheTrait for ChannelCache {
    async fn get_channels(&self, name: &str) -> Arc<Vec<Channel>> {
        let Some((source, slot)) = self.lookup(name) else {
            warn!("playlist not found: {}", name);
            return Arc::new(Vec::new());
        };

        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref().filter(|e| e.is_fresh(self.ttl)) {
            debug!(
                "[{}] cache hit ({} channels, age {}s)",
                name,
                cached.channels.len(),
                cached.age().as_secs()
            );
            metrics::counter!("restream_channel_cache_hit_total", "playlist" => name.to_string())
                .increment(1);
            return cached.channels.clone();
        }

        info!("[{}] fetching playlist: {}", name, source.url);

        match self.fetcher.fetch_playlist(&source.url).await {
            Ok(text) => {
                let fresh = CacheEntry::new(parse_m3u(&text));
                let channels = fresh.channels.clone();
                *entry = Some(fresh);

                info!("[{}] loaded {} channels", name, channels.len());
                metrics::counter!(
                    "restream_playlist_fetch_total",
                    "playlist" => name.to_string(),
                    "outcome" => "ok"
                )
                .increment(1);

                channels
            }
            Err(e) => {
                error!("[{}] load failed: {}", name, e);
                metrics::counter!(
                    "restream_playlist_fetch_total",
                    "playlist" => name.to_string(),
                    "outcome" => "error"
                )
                .increment(1);

                match entry.as_ref() {
                    Some(stale) if self.serve_stale_on_error => {
                        warn!(
                            "[{}] serving stale list ({} channels, age {}s)",
                            name,
                            stale.channels.len(),
                            stale.age().as_secs()
                        );
                        stale.channels.clone()
                    }
                    _ => Arc::new(Vec::new()),
                }
            }
        }
    }

    async fn get_channel(&self, name: &str, index: usize) -> Option<Channel> {
        self.get_channels(name).await.get(index).cloned()
    }

    async fn invalidate(&self, name: &str) {
        if let Some((_, slot)) = self.lookup(name) {
            slot.lock().await.take();
            debug!("[{}] cache invalidated", name);
        }
    }

    fn has_playlist(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    fn playlist_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name.clone()).collect()
    }
}
