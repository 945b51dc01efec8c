//! # transport: reqwest-backed [`Transport`]
//!
//! Maps a [`TransportRequest`] onto a `reqwest` request. Streamed bodies are
//! wrapped with `Body::wrap_stream`, so reqwest pulls chunks from the upload
//! pipe as the connection accepts them. Responses are handed back unread.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Body, Client, Method};
use std::io;

use crate::contract::{
    HttpMethod, RequestBody, Transport, TransportError, TransportRequest, TransportResponse,
};

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Client without a global timeout; every request carries its own.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("toastate-sdk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            body = ?request.body,
            "Sending request"
        );

        let mut builder = self.client.request(method(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(bytes) => builder.body(bytes),
            RequestBody::Stream(reader) => builder.body(Body::wrap_stream(reader)),
        };

        let response = builder.send().await.map_err(|e| {
            tracing::error!(error = ?e, url = %request.url, "Request failed before a response arrived");
            Box::new(e) as TransportError
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        tracing::debug!(status, url = %request.url, "Response received");

        Ok(TransportResponse {
            status,
            headers,
            body: response.bytes_stream().map_err(io::Error::other).boxed(),
        })
    }
}
