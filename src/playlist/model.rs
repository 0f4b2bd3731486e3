use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// one playable entry from a playlist
///
/// channels have no id, the position in the parent list is what the ui and the stream routes
/// address them by so the order coming out of the parser has to be kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub title: String,
    pub url: String,
    pub logo: String,
    pub group: String,
}

/// what the channel cache keeps per playlist name
///
/// entries are never edited, a refresh builds a new one and swaps the Arc
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fetched_at: Instant,
    pub channels: Arc<Vec<Channel>>,
}

impl CacheEntry {
    pub fn new(channels: Vec<Channel>) -> Self {
        Self {
            fetched_at: Instant::now(),
            channels: Arc::new(channels),
        }
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}
