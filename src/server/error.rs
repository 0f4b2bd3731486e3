use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type AppResult<T> = Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    // playlist fetches, these never reach a client because the cache swallows them
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    UpstreamStatus(reqwest::StatusCode),

    #[error("failed to start transcoder: {0}")]
    TranscoderSpawn(#[source] std::io::Error),

    #[error("internal server error")]
    InternalServerError,

    #[error("{0}")]
    InternalServerErrorWithContext(String),

    #[error(transparent)]
    AnyhowError(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) | Self::UpstreamStatus(_) => StatusCode::BAD_GATEWAY,
            Self::TranscoderSpawn(_)
            | Self::InternalServerError
            | Self::InternalServerErrorWithContext(_)
            | Self::AnyhowError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // don't hand internal details to the browser, they're in the logs
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("{}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
