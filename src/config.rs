use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;

// the five iptv-org lists the gateway ships with, override with PLAYLISTS=name=url,name=url
pub const DEFAULT_PLAYLISTS: &str = "all=https://iptv-org.github.io/iptv/index.m3u,\
india=https://iptv-org.github.io/iptv/countries/in.m3u,\
news=https://iptv-org.github.io/iptv/categories/news.m3u,\
movies=https://iptv-org.github.io/iptv/categories/movies.m3u,\
malayalam=https://iptv-org.github.io/iptv/languages/mal.m3u";

#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

/// one named playlist, parsed from `name=url`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaylistSource {
    pub name: String,
    pub url: String,
}

impl FromStr for PlaylistSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, url) = s
            .split_once('=')
            .ok_or_else(|| format!("expected name=url, got '{}'", s))?;

        let name = name.trim();
        let url = url.trim();

        if name.is_empty() {
            return Err(format!("playlist name is empty in '{}'", s));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(format!("playlist '{}' needs an http(s) url, got '{}'", name, url));
        }

        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
        })
    }
}

#[derive(clap::Parser)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum)]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "8000")]
    pub port: u16,

    // this should be either * for allowing everything, or a comma seperated list of domains like
    // example.com,something.com
    #[clap(long, env, default_value = "*")]
    pub cors_origin: String,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,

    // comma separated name=url pairs, the order here is the order the ui lists them in
    #[clap(long, env, value_delimiter = ',', default_value = DEFAULT_PLAYLISTS)]
    pub playlists: Vec<PlaylistSource>,

    // how long a parsed playlist is reused before it gets fetched again
    #[clap(long, env, default_value = "1800")]
    pub cache_ttl_seconds: u64,

    // iptv-org is slow sometimes, 25s has been enough so far
    #[clap(long, env, default_value = "25")]
    pub fetch_timeout_seconds: u64,

    // off by default: a failed refresh gives an empty list even if an expired one is around
    #[clap(long, env)]
    pub serve_stale_on_error: bool,

    #[clap(long, env, default_value = "ffmpeg")]
    pub ffmpeg_path: PathBuf,

    // bytes per read off the transcoder's stdout
    #[clap(long, env, default_value = "8192")]
    pub transcode_chunk_size: usize,

    // shown by the frontend when a channel has no logo
    #[clap(long, env, default_value = "https://iptv-org.github.io/assets/logo.png")]
    pub logo_fallback: String,
}

impl AppConfig {
    /// checks that span more than one field or value, clap can't express these
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for source in &self.playlists {
            if !seen.insert(source.name.as_str()) {
                anyhow::bail!("playlist '{}' is configured more than once", source.name);
            }
        }

        if self.playlists.is_empty() {
            anyhow::bail!("no playlists configured");
        }

        Ok(())
    }
}

impl Default for AppConfig {
    // defaults aren't really needed here but it's here as a bad fallback
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 8000,
            cors_origin: "*".to_string(),
            sentry_dsn: None,
            playlists: DEFAULT_PLAYLISTS
                .split(',')
                .filter_map(|pair| pair.parse().ok())
                .collect(),
            cache_ttl_seconds: 1800,
            fetch_timeout_seconds: 25,
            serve_stale_on_error: false,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            transcode_chunk_size: 8192,
            logo_fallback: "https://iptv-org.github.io/assets/logo.png".to_string(),
        }
    }
}
