pub mod ffmpeg_utils;
pub mod m3u_utils;
