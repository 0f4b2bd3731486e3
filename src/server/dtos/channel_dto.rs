use serde::Serialize;

use crate::playlist::Channel;

#[derive(Debug, Serialize)]
pub struct PlaylistsResponse {
    pub playlists: Vec<String>,
}

/// a channel as the frontend sees it, the index is what /watch and /stream take
#[derive(Debug, Serialize)]
pub struct ChannelDto {
    pub index: usize,
    pub title: String,
    pub url: String,
    pub logo: String,
    pub group: String,
}

impl ChannelDto {
    pub fn from_channel(index: usize, channel: &Channel, logo_fallback: &str) -> Self {
        let logo = if channel.logo.is_empty() {
            logo_fallback.to_string()
        } else {
            channel.logo.clone()
        };

        Self {
            index,
            title: channel.title.clone(),
            url: channel.url.clone(),
            logo,
            group: channel.group.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChannelListResponse {
    pub playlist: String,
    pub count: usize,
    pub channels: Vec<ChannelDto>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub playlist: String,
    pub count: usize,
}
