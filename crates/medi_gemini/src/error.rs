//! Error types for the Gemini adapter.

use medi_core::CoreError;
use thiserror::Error;

/// Result type alias for Gemini operations.
pub type GeminiResult<T> = Result<T, GeminiError>;

/// Errors that can occur while talking to the Gemini API.
#[derive(Error, Debug)]
pub enum GeminiError {
    #[error("Gemini not configured. Set GEMINI_API_KEY or API_KEY")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gemini API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Unknown chat session: {0}")]
    UnknownSession(String),

    #[error("Max retries exceeded: {0}")]
    RetriesExhausted(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<GeminiError> for CoreError {
    fn from(err: GeminiError) -> Self {
        CoreError::Backend(err.to_string())
    }
}
