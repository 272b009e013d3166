use std::error::Error as StdError;

use ferry_common::FromMessage;

/// Crate-wide result type for source operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed source errors shared across source implementations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Credentials were rejected or are missing.
    #[error("source authentication failed: {message}")]
    Unauthorized { message: String },

    /// The requested channel does not exist or is not visible.
    #[error("unknown source channel: {channel_id}")]
    UnknownChannel { channel_id: String },

    /// The source answered with a non-success status.
    #[error("source returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Wrapped source error from an external dependency.
    #[error("source operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    /// Integer parsing failed.
    #[error(transparent)]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn unauthorized(message: impl std::fmt::Display) -> Self {
        Self::Unauthorized {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unknown_channel(channel_id: impl std::fmt::Display) -> Self {
        Self::UnknownChannel {
            channel_id: channel_id.to_string(),
        }
    }

    #[must_use]
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

ferry_common::impl_context!();
