//! Error taxonomy shared by every request handler.
//!
//! Four categories flow through request handlers as [`AdapterError`]:
//! a [`AdapterError::Silent`] error is swallowed by the IDE as a bare request
//! failure, a [`AdapterError::User`] error is shown to the user, a
//! [`AdapterError::SourceMap`] error is logged once per map and degrades that
//! map's operations to safe defaults, and [`AdapterError::Transport`] means
//! the runtime connection is gone and the session is over.

use std::fmt;

/// The error type threaded through every request handler.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Not shown to the user; the IDE just reports the request failed.
    /// Used when a race (disconnect, context cleared) is the likely cause.
    #[error("{0}")]
    Silent(String),

    /// Surfaced in the IDE UI.
    #[error("{0}")]
    User(String),

    /// A source map failed to parse. Logged once per map; the map then
    /// behaves as if absent (identity position mapping, no children).
    #[error("source map parse error ({url}): {message}")]
    SourceMap { url: String, message: String },

    /// The runtime protocol connection closed. Not recoverable within the
    /// session.
    #[error("runtime connection closed: {0}")]
    Transport(String),
}

impl AdapterError {
    pub fn silent(msg: impl Into<String>) -> Self {
        Self::Silent(msg.into())
    }

    pub fn user(msg: impl Into<String>) -> Self {
        Self::User(msg.into())
    }

    pub fn source_map(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceMap {
            url: url.into(),
            message: message.into(),
        }
    }

    /// `true` for errors that should never propagate to the IDE as a visible
    /// failure message, only as a bare unsuccessful response.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Silent(_))
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Raised once per source map the first time it fails to parse; callers
/// should log it and continue treating the map as absent.
#[derive(Debug, thiserror::Error)]
#[error("failed to parse source map at {url}: {cause}")]
pub struct SourceMapParseError {
    pub url: String,
    pub cause: String,
}

impl SourceMapParseError {
    pub fn new(url: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self {
            url: url.into(),
            cause: cause.to_string(),
        }
    }
}

impl From<SourceMapParseError> for AdapterError {
    fn from(e: SourceMapParseError) -> Self {
        AdapterError::SourceMap {
            url: e.url,
            message: e.cause,
        }
    }
}
