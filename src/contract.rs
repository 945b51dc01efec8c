//! # contract: the HTTP transport seam
//!
//! Everything the client needs from an HTTP stack is expressed by the single
//! [`Transport`] trait: send one request, hand back status, headers and a body
//! stream. The production implementation lives in [`crate::transport`]; tests
//! substitute [`MockTransport`] (generated by `mockall`) or their own types.
//!
//! Requests and responses are plain data. The request body can be a byte
//! stream fed by a [`PipeReader`], which is how multipart uploads reach the
//! wire without being buffered.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
#[allow(unused_imports)]
use mockall::{automock, predicate::*};

use crate::upload::PipeReader;

/// Failure to obtain any response at all (connection, TLS, timeout, aborted body).
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Body of a [`TransportResponse`], read incrementally.
pub type ResponseBody = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub enum RequestBody {
    Empty,
    Json(Vec<u8>),
    /// Streamed until the writer side of the pipe is closed.
    Stream(PipeReader),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Json(bytes) => write!(f, "Json({} bytes)", bytes.len()),
            RequestBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

#[derive(Debug)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    /// Upper bound for the whole exchange, including reading the response.
    pub timeout: Option<Duration>,
}

impl TransportRequest {
    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl TransportResponse {
    /// A response whose body is already in memory.
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            headers: Vec::new(),
            body: Box::pin(futures::stream::once(async move { Ok(body) })),
        }
    }

    /// Drain the body into memory.
    pub async fn into_bytes(self) -> io::Result<Vec<u8>> {
        self.body
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Sends one HTTP request.
///
/// Implementations must consume a [`RequestBody::Stream`] incrementally and
/// must not assume its length in advance. Dropping the body before it is
/// exhausted is allowed and is how the producing side learns that the
/// request was abandoned.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: TransportRequest)
        -> Result<TransportResponse, TransportError>;
}
