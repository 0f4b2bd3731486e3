pub mod app_services;
pub mod playlist_services;
pub mod transcode_services;

pub use app_services::AppServices;
pub use playlist_services::{DynChannelCache, DynPlaylistFetcher};
pub use transcode_services::DynTranscoder;
