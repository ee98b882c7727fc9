//! Error types for the talk server
//!
//! Defines the application-level error enum and its HTTP status mapping.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both client errors (reported as 4xx, state untouched) and
/// internal errors (reported as 500, the listener keeps serving).
#[derive(Debug, Error)]
pub enum AppError {
    /// Request body is not valid JSON
    #[error("Invalid JSON")]
    InvalidJson(#[source] serde_json::Error),

    /// Talk body is JSON but lacks a usable presenter or summary
    #[error("Bad talk data")]
    BadTalkData,

    /// Comment body is JSON but lacks a usable author or message
    #[error("Bad comment data")]
    BadCommentData,

    /// Talk title is empty
    #[error("Talk title must not be empty")]
    EmptyTitle,

    /// No talk with the given title
    #[error("No talk '{0}' found")]
    TalkNotFound(String),

    /// JSON serialization error (internal)
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (internal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (internal - server actor is gone)
    #[error("Channel send error")]
    ChannelSend,

    /// The server actor dropped a reply channel without answering
    #[error("Channel closed")]
    ChannelClosed,
}

impl AppError {
    /// HTTP status code reported for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::InvalidJson(_)
            | AppError::BadTalkData
            | AppError::BadCommentData
            | AppError::EmptyTitle => 400,
            AppError::TalkNotFound(_) => 404,
            AppError::Json(_) | AppError::Io(_) | AppError::ChannelSend | AppError::ChannelClosed => {
                500
            }
        }
    }

    /// True for errors caused by the request rather than the server
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::BadTalkData.status_code(), 400);
        assert_eq!(AppError::BadCommentData.status_code(), 400);
        assert_eq!(AppError::TalkNotFound("x".into()).status_code(), 404);
        assert_eq!(AppError::ChannelSend.status_code(), 500);

        let invalid = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(AppError::InvalidJson(invalid).status_code(), 400);
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            AppError::TalkNotFound("Unituning".into()).to_string(),
            "No talk 'Unituning' found"
        );
        assert!(AppError::BadTalkData.is_client_error());
        assert!(!AppError::ChannelClosed.is_client_error());
    }
}
