//! Error types for handler setup, recognition, sending, and turn processing.

use thiserror::Error;

/// Fatal errors raised while constructing a [`crate::handler::TurnHandler`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SetupError {
    #[error("No bot services were provided")]
    MissingServices,

    #[error("Invalid configuration. Please check your config for a LUIS service named '{key}'.")]
    MissingRecognizer { key: String },
}

#[derive(Debug, Error)]
pub enum RecognizerError {
    #[error("LUIS request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LUIS HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Failed to decode LUIS response: {0}")]
    Decode(String),
}

/// Failure reported by a [`crate::channel::MessageSink`] implementation.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Send failed: {0}")]
    Transport(String),
}

/// Per-turn failures. Surfaced to the host; never retried.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error("Turn cancelled")]
    Cancelled,
}
