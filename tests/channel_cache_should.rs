use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use restream::PlaylistSource;
use restream::server::error::{AppResult, Error};
use restream::server::services::playlist_services::{
    ChannelCache, ChannelCacheTrait, HttpPlaylistFetcher, MockPlaylistFetcherTrait,
    PlaylistFetcherTrait,
};

const TTL: Duration = Duration::from_secs(1800);

const NEWS: &str = "#EXTM3U\n#EXTINF:-1 group-title=\"News\",News One\nhttp://x/n1.m3u8\n#EXTINF:-1,News Two\nhttp://x/n2.m3u8\n";
const NEWS_UPDATED: &str = "#EXTM3U\n#EXTINF:-1,News Three\nhttp://x/n3.m3u8\n";

fn sources() -> Vec<PlaylistSource> {
    vec![
        PlaylistSource {
            name: "news".to_string(),
            url: "http://playlists.test/news.m3u".to_string(),
        },
        PlaylistSource {
            name: "movies".to_string(),
            url: "http://playlists.test/movies.m3u".to_string(),
        },
    ]
}

fn cache_with(fetcher: MockPlaylistFetcherTrait) -> ChannelCache {
    ChannelCache::new(sources(), Arc::new(fetcher), TTL)
}

#[tokio::test(start_paused = true)]
async fn test_fresh_entry_is_reused() {
    let mut fetcher = MockPlaylistFetcherTrait::new();
    fetcher
        .expect_fetch_playlist()
        .withf(|url| url == "http://playlists.test/news.m3u")
        .times(1)
        .returning(|_| Ok(NEWS.to_string()));
    let cache = cache_with(fetcher);

    let first = cache.get_channels("news").await;
    tokio::time::advance(Duration::from_secs(1799)).await;
    let second = cache.get_channels("news").await;

    assert_eq!(first.len(), 2);
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test(start_paused = true)]
async fn test_expired_entry_is_replaced() {
    let mut fetcher = MockPlaylistFetcherTrait::new();
    let mut seq = mockall::Sequence::new();
    fetcher
        .expect_fetch_playlist()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(NEWS.to_string()));
    fetcher
        .expect_fetch_playlist()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(NEWS_UPDATED.to_string()));
    let cache = cache_with(fetcher);

    assert_eq!(cache.get_channels("news").await.len(), 2);
    tokio::time::advance(TTL).await;

    let refreshed = cache.get_channels("news").await;

    // replaced, not merged with the old list
    assert_eq!(refreshed.len(), 1);
    assert_eq!(refreshed[0].title, "News Three");
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failure_gives_empty_list() {
    let mut fetcher = MockPlaylistFetcherTrait::new();
    fetcher
        .expect_fetch_playlist()
        .times(1)
        .returning(|_| Err(Error::UpstreamStatus(reqwest::StatusCode::NOT_FOUND)));
    let cache = cache_with(fetcher);

    assert!(cache.get_channels("news").await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_does_not_reuse_stale_list() {
    let mut fetcher = MockPlaylistFetcherTrait::new();
    let mut seq = mockall::Sequence::new();
    fetcher
        .expect_fetch_playlist()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(NEWS.to_string()));
    fetcher
        .expect_fetch_playlist()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(Error::InternalServerErrorWithContext("timed out".to_string())));
    let cache = cache_with(fetcher);

    assert_eq!(cache.get_channels("news").await.len(), 2);
    tokio::time::advance(TTL + Duration::from_secs(1)).await;

    assert!(cache.get_channels("news").await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_serves_stale_when_enabled() {
    let mut fetcher = MockPlaylistFetcherTrait::new();
    let mut seq = mockall::Sequence::new();
    fetcher
        .expect_fetch_playlist()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(NEWS.to_string()));
    fetcher
        .expect_fetch_playlist()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(Error::InternalServerErrorWithContext("timed out".to_string())));
    let cache = cache_with(fetcher).with_stale_on_error(true);

    let first = cache.get_channels("news").await;
    tokio::time::advance(TTL + Duration::from_secs(1)).await;
    let stale = cache.get_channels("news").await;

    assert!(Arc::ptr_eq(&first, &stale));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_playlist_is_empty_without_fetching() {
    let mut fetcher = MockPlaylistFetcherTrait::new();
    fetcher.expect_fetch_playlist().never();
    let cache = cache_with(fetcher);

    assert!(cache.get_channels("sports").await.is_empty());
    assert!(cache.get_channel("sports", 0).await.is_none());
    assert!(!cache.has_playlist("sports"));
}

#[tokio::test(start_paused = true)]
async fn test_channel_index_out_of_range() {
    let mut fetcher = MockPlaylistFetcherTrait::new();
    fetcher
        .expect_fetch_playlist()
        .times(1)
        .returning(|_| Ok(NEWS.to_string()));
    let cache = cache_with(fetcher);

    assert_eq!(
        cache.get_channel("news", 1).await.map(|c| c.title),
        Some("News Two".to_string())
    );
    assert!(cache.get_channel("news", 2).await.is_none());
    assert!(cache.get_channel("news", usize::MAX).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_forces_refetch() {
    let mut fetcher = MockPlaylistFetcherTrait::new();
    fetcher
        .expect_fetch_playlist()
        .times(2)
        .returning(|_| Ok(NEWS.to_string()));
    let cache = cache_with(fetcher);

    cache.get_channels("news").await;
    cache.invalidate("news").await;
    cache.get_channels("news").await;
}

#[tokio::test(start_paused = true)]
async fn test_playlists_are_cached_separately() {
    let mut fetcher = MockPlaylistFetcherTrait::new();
    fetcher
        .expect_fetch_playlist()
        .withf(|url| url.ends_with("news.m3u"))
        .times(1)
        .returning(|_| Ok(NEWS.to_string()));
    fetcher
        .expect_fetch_playlist()
        .withf(|url| url.ends_with("movies.m3u"))
        .times(1)
        .returning(|_| Ok(NEWS_UPDATED.to_string()));
    let cache = cache_with(fetcher);

    assert_eq!(cache.get_channels("news").await.len(), 2);
    assert_eq!(cache.get_channels("movies").await.len(), 1);
    assert_eq!(cache.get_channels("news").await.len(), 2);
    assert_eq!(cache.playlist_names(), vec!["news", "movies"]);
}

struct SlowFetcher {
    calls: AtomicUsize,
}

#[async_trait]
impl PlaylistFetcherTrait for SlowFetcher {
    async fn fetch_playlist(&self, _url: &str) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(2)).await;
        Ok(NEWS.to_string())
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_cold_lookups_fetch_once() {
    let fetcher = Arc::new(SlowFetcher {
        calls: AtomicUsize::new(0),
    });
    let cache = Arc::new(ChannelCache::new(sources(), fetcher.clone(), TTL));

    let lookups: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_channels("news").await.len() })
        })
        .collect();

    for lookup in lookups {
        assert_eq!(lookup.await.unwrap(), 2);
    }
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_http_fetch_failure_is_an_error() {
    // nothing listens on port 9 locally, the connection is refused straight away
    let fetcher = HttpPlaylistFetcher::new(Duration::from_secs(2));

    assert!(fetcher.fetch_playlist("http://127.0.0.1:9/news.m3u").await.is_err());
}

#[tokio::test]
async fn test_duplicate_names_keep_the_first_source() {
    let mut fetcher = MockPlaylistFetcherTrait::new();
    fetcher
        .expect_fetch_playlist()
        .withf(|url| url == "http://playlists.test/news.m3u")
        .times(1)
        .returning(|_| Ok(NEWS.to_string()));

    let mut duplicated = sources();
    duplicated.push(PlaylistSource {
        name: "news".to_string(),
        url: "http://playlists.test/other-news.m3u".to_string(),
    });
    let cache = ChannelCache::new(duplicated, Arc::new(fetcher), TTL);

    assert_eq!(cache.playlist_names(), vec!["news", "movies"]);
    assert_eq!(cache.get_channels("news").await.len(), 2);
}
