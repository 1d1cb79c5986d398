use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum AppError {
    /// The remote service refused the request or answered with a
    /// non-success return code. Carries the server's message verbatim.
    #[error("{0}")]
    Request(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] SerdeJsonError),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Tokio join error: {0}")]
    Join(#[from] JoinError),

    #[error("Channel send error")]
    SendError,

    #[error("Generic error: {0}")]
    Generic(String),
}

impl AppError {
    pub fn is_request_error(&self) -> bool {
        matches!(self, AppError::Request(_) | AppError::Http(_))
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for AppError {
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        AppError::SendError
    }
}
