//! HTTP message definitions
//!
//! JSON request bodies for talk and comment creation, and the mapping
//! from `AppError` to an HTTP response.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::error;

use crate::error::AppError;

/// Body of `PUT /talks/{title}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TalkInput {
    pub presenter: String,
    pub summary: String,
}

impl TalkInput {
    /// Parse a request body
    ///
    /// Malformed JSON is `InvalidJson`; well-formed JSON without two
    /// non-empty string fields is `BadTalkData`. Unknown fields are ignored.
    pub fn parse(body: &[u8]) -> Result<Self, AppError> {
        let input: Self =
            serde_json::from_value(parse_json(body)?).map_err(|_| AppError::BadTalkData)?;
        if input.presenter.is_empty() || input.summary.is_empty() {
            return Err(AppError::BadTalkData);
        }
        Ok(input)
    }
}

/// Body of `POST /talks/{title}/comments`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommentInput {
    pub author: String,
    pub message: String,
}

impl CommentInput {
    /// Parse a request body, same rules as `TalkInput::parse`
    pub fn parse(body: &[u8]) -> Result<Self, AppError> {
        let input: Self =
            serde_json::from_value(parse_json(body)?).map_err(|_| AppError::BadCommentData)?;
        if input.author.is_empty() || input.message.is_empty() {
            return Err(AppError::BadCommentData);
        }
        Ok(input)
    }
}

fn parse_json(body: &[u8]) -> Result<Value, AppError> {
    serde_json::from_slice(body).map_err(AppError::InvalidJson)
}

/// Render an AppError as a plain-text response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if !self.is_client_error() {
            error!("Request failed: {}", self);
        }
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
