use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};

use crate::api::response;

pub const MISSING_FIELDS_MESSAGE: &str = "Missing required fields.";
pub const MALFORMED_BODY_MESSAGE: &str = "Malformed JSON body.";
pub const SCRAPE_FAILED_MESSAGE: &str = "Scraping failed.";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Missing required fields")]
    ValidationError,

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Failed to launch browser: {0}")]
    LaunchError(String),

    #[error("Navigation failed: {0}")]
    NavigationError(String),

    #[error("Navigation timed out after {0:?}")]
    NavigationTimeout(std::time::Duration),

    #[error("Failed to extract listings: {0}")]
    ExtractionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError => (StatusCode::BAD_REQUEST, MISSING_FIELDS_MESSAGE),
            AppError::MalformedBody(_) => (StatusCode::BAD_REQUEST, MALFORMED_BODY_MESSAGE),
            AppError::LaunchError(_)
            | AppError::NavigationError(_)
            | AppError::NavigationTimeout(_)
            | AppError::ExtractionError(_)
            | AppError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, SCRAPE_FAILED_MESSAGE),
        };

        response::error(status, error_message).into_response()
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::ExtractionError(format!("scrape worker stopped: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
