use ferry_common::FromMessage;

/// Relay errors. None of these stop the poll loop on their own; the
/// scheduler logs them with channel/target context and moves on.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Source(#[from] ferry_channels::Error),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A sink answered with a non-success status. The body is kept for logs.
    #[error("sink returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid relay configuration: {message}")]
    Config { message: String },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

ferry_common::impl_context!();
