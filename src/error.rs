//! Error types for the Toastate client.
//!
//! [`ToastateError`] is what every public operation returns. Remote failures
//! keep their structured form in [`ApiError`]; failures on the producing side
//! of a streaming upload are reported through [`UploadError`].

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

use crate::contract::TransportError;
use crate::upload::PipeClosed;

/// A non-200 answer from the remote API.
///
/// `code` and `message` come from the JSON error body. When the body is empty
/// or not JSON, `code` is [`ApiError::UNHANDLED`] and `message` explains what
/// was received.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: u16,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl ApiError {
    pub const UNHANDLED: &'static str = "unhandled";

    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Decode the error body of a non-200 response.
    pub fn from_body(status: u16, body: &[u8]) -> Self {
        if body.is_empty() {
            return Self::new(
                status,
                Self::UNHANDLED,
                "The remote API did not provide any error message",
            );
        }

        match serde_json::from_slice::<ApiError>(body) {
            Ok(mut err) => {
                err.status = status;
                err
            }
            Err(_) => Self::new(
                status,
                Self::UNHANDLED,
                format!(
                    "The remote API provided the following invalid JSON error: {}",
                    String::from_utf8_lossy(body)
                ),
            ),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "remote API error (status {}, code {}): {}",
            self.status, self.code, self.message
        )
    }
}

impl std::error::Error for ApiError {}

/// Failures of the background task that produces a multipart upload body.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to walk the upload folder: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to read upload source {name}: {source}")]
    Source {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The transport stopped consuming the request body.
    #[error("the request body was closed before the upload finished")]
    ReaderClosed,

    #[error("the upload queue was dropped before its end marker was sent")]
    QueueClosed,
}

impl From<PipeClosed> for UploadError {
    fn from(_: PipeClosed) -> Self {
        UploadError::ReaderClosed
    }
}

impl UploadError {
    /// `false` only for [`UploadError::ReaderClosed`], which is a consequence
    /// of the transport giving up rather than a cause.
    pub fn is_local(&self) -> bool {
        !matches!(self, UploadError::ReaderClosed)
    }
}

/// Errors returned by every [`crate::Session`] and [`crate::ApiClient`] call.
#[derive(Debug, Error)]
pub enum ToastateError {
    #[error("transport failure: {0}")]
    Transport(#[source] TransportError),

    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Api(#[from] ApiError),

    /// Status 200 with `"success": false` (or no `success` field at all).
    #[error("the remote API reported a failure with a 200 status code")]
    UnexpectedFailure,

    /// Status 200 but a field the operation needs was absent.
    #[error("the request succeeded but the remote API returned no {0}")]
    EmptyResponse(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no session token set, call Session::set_auth first")]
    NotAuthenticated,

    #[error("invalid authentication token: only session tokens (sess_...) are supported")]
    InvalidAuth,

    #[error("failed to encode request body: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to read response body: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_unhandled() {
        let err = ApiError::from_body(500, b"");
        assert_eq!(err.status, 500);
        assert_eq!(err.code, "unhandled");
        assert!(err.message.contains("did not provide any error message"));
    }

    #[test]
    fn json_body_is_decoded() {
        let err = ApiError::from_body(
            429,
            br#"{"code":"quota_exceeded","message":"too many toasters"}"#,
        );
        assert_eq!(err, ApiError::new(429, "quota_exceeded", "too many toasters"));
    }

    #[test]
    fn invalid_json_body_is_echoed() {
        let err = ApiError::from_body(502, b"<html>bad gateway</html>");
        assert_eq!(err.code, "unhandled");
        assert!(err.message.ends_with("<html>bad gateway</html>"));
    }

    #[test]
    fn only_reader_closed_is_not_local() {
        assert!(!UploadError::ReaderClosed.is_local());
        assert!(UploadError::QueueClosed.is_local());
        let source = UploadError::Source {
            name: "a.txt".into(),
            source: std::io::Error::other("boom"),
        };
        assert!(source.is_local());
    }
}
