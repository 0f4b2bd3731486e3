pub mod health_controller;
pub mod playlist_controller;
pub mod stream_controller;
