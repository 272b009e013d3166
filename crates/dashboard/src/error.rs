use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    ferry_common::FromMessage,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The ingest body was not a JSON object.
    #[error("invalid event: {message}")]
    InvalidEvent { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn invalid_event(message: impl Into<String>) -> Self {
        Self::InvalidEvent {
            message: message.into(),
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

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Self::InvalidEvent { .. } => StatusCode::BAD_REQUEST,
            Self::Io(_) | Self::Message { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

ferry_common::impl_context!();
