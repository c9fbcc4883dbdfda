//! Error types for the live session engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DebateError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Debate service returned {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("Debate not found: {0}")]
    NotFound(String),

    #[error("Failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("TTS error: {0}")]
    TtsError(String),
}
