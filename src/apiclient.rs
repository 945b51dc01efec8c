//! # apiclient: requests against the Toastate API
//!
//! [`ApiClient`] owns the base URL, API version, session token and a
//! [`Transport`]. It offers plain JSON calls, a streamed GET for file
//! downloads, and the two streaming multipart uploads.
//!
//! ## Response handling
//!
//! - A status other than 200 becomes an [`ApiError`] decoded from the body.
//! - A 200 body must carry `"success": true`; anything else is
//!   [`ToastateError::UnexpectedFailure`].
//! - For uploads, a local failure of the producing task (unreadable file,
//!   abandoned queue) is reported first, because it is also what makes the
//!   transport fail. Then transport failures, then the status checks above.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::contract::{
    HttpMethod, RequestBody, ResponseBody, Transport, TransportRequest, TransportResponse,
};
use crate::error::{ApiError, ToastateError, UploadError};
use crate::transport::ReqwestTransport;
use crate::upload::{start_upload, UploadQueue, UploadSource};

pub const HEADER_API_VERSION: &str = "X-TOASTATE-APIVERSION";
pub const HEADER_AUTH: &str = "X-TOASTATE-AUTH";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";

/// Whether a call sends the session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
}

/// Methods accepted by the upload endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMethod {
    Post,
    Put,
}

impl From<UploadMethod> for HttpMethod {
    fn from(method: UploadMethod) -> Self {
        match method {
            UploadMethod::Post => HttpMethod::Post,
            UploadMethod::Put => HttpMethod::Put,
        }
    }
}

#[derive(Deserialize)]
struct SuccessFlag {
    #[serde(default)]
    success: bool,
}

/// Turn a fully read response into `T`, or into the error it describes.
pub fn decode_response<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<T, ToastateError> {
    if status != 200 {
        let err = ApiError::from_body(status, body);
        warn!(status, code = %err.code, message = %err.message, "Remote API returned an error");
        return Err(err.into());
    }

    let flag: SuccessFlag = serde_json::from_slice(body).map_err(ToastateError::Decode)?;
    if !flag.success {
        error!(status, "Remote API reported a failure with status 200");
        return Err(ToastateError::UnexpectedFailure);
    }
    serde_json::from_slice(body).map_err(ToastateError::Decode)
}

#[derive(Clone)]
pub struct ApiClient {
    config: ClientConfig,
    auth_token: Option<String>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("authenticated", &self.auth_token.is_some())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Client talking HTTP through reqwest.
    pub fn new(config: ClientConfig) -> Result<Self, ToastateError> {
        let transport = ReqwestTransport::new().map_err(|e| {
            error!(error = ?e, "Failed to build HTTP client");
            ToastateError::Transport(Box::new(e))
        })?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let auth_token = config.auth_token.clone();
        Self {
            config,
            auth_token,
            transport,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn set_auth_token(&mut self, token: impl Into<String>) {
        self.auth_token = Some(token.into());
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    /// Absolute URL for an API path. A missing leading `/` is added.
    pub fn prepare_url(&self, path: &str) -> Result<String, ToastateError> {
        if path.is_empty() {
            return Err(ToastateError::InvalidInput("empty request path".into()));
        }
        let base = self.config.api_url.trim_end_matches('/');
        if path.starts_with('/') {
            Ok(format!("{base}{path}"))
        } else {
            Ok(format!("{base}/{path}"))
        }
    }

    fn headers(&self, access: Access) -> Result<Vec<(String, String)>, ToastateError> {
        let mut headers = vec![
            (HEADER_API_VERSION.to_string(), self.config.api_version.clone()),
            (HEADER_CONTENT_TYPE.to_string(), "application/json".to_string()),
        ];
        if access == Access::Authenticated {
            let token = self.auth_token.as_ref().ok_or_else(|| {
                error!("Authenticated call attempted without a session token");
                ToastateError::NotAuthenticated
            })?;
            headers.push((HEADER_AUTH.to_string(), token.clone()));
        }
        Ok(headers)
    }

    fn request(
        &self,
        method: HttpMethod,
        access: Access,
        path: &str,
        body: RequestBody,
        timeout: Duration,
    ) -> Result<TransportRequest, ToastateError> {
        Ok(TransportRequest {
            method,
            url: self.prepare_url(path)?,
            headers: self.headers(access)?,
            body,
            timeout: Some(timeout),
        })
    }

    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, ToastateError> {
        let method = request.method;
        let url = request.url.clone();
        self.transport.execute(request).await.map_err(|e| {
            error!(error = %e, %method, %url, "Transport failed");
            ToastateError::Transport(e)
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        access: Access,
        path: &str,
        body: RequestBody,
    ) -> Result<T, ToastateError> {
        let request = self.request(method, access, path, body, self.config.request_timeout())?;
        debug!(%method, url = %request.url, "Sending JSON request");
        let response = self.execute(request).await?;
        let status = response.status;
        let body = response.into_bytes().await?;
        decode_response(status, &body)
    }

    fn marshal<B: Serialize + ?Sized>(body: &B) -> Result<RequestBody, ToastateError> {
        serde_json::to_vec(body)
            .map(RequestBody::Json)
            .map_err(ToastateError::Serialization)
    }

    pub async fn get<T: DeserializeOwned>(&self, access: Access, path: &str) -> Result<T, ToastateError> {
        self.send_json(HttpMethod::Get, access, path, RequestBody::Empty)
            .await
    }

    pub async fn post<B, T>(&self, access: Access, path: &str, body: &B) -> Result<T, ToastateError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(HttpMethod::Post, access, path, Self::marshal(body)?)
            .await
    }

    /// POST without a body.
    pub async fn post_empty<T: DeserializeOwned>(
        &self,
        access: Access,
        path: &str,
    ) -> Result<T, ToastateError> {
        self.send_json(HttpMethod::Post, access, path, RequestBody::Empty)
            .await
    }

    pub async fn put<B, T>(&self, access: Access, path: &str, body: &B) -> Result<T, ToastateError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(HttpMethod::Put, access, path, Self::marshal(body)?)
            .await
    }

    pub async fn delete<B, T>(&self, access: Access, path: &str, body: &B) -> Result<T, ToastateError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(HttpMethod::Delete, access, path, Self::marshal(body)?)
            .await
    }

    pub async fn delete_empty<T: DeserializeOwned>(
        &self,
        access: Access,
        path: &str,
    ) -> Result<T, ToastateError> {
        self.send_json(HttpMethod::Delete, access, path, RequestBody::Empty)
            .await
    }

    /// GET whose 200 body is handed back unread, for downloads of any size.
    pub async fn get_stream(&self, access: Access, path: &str) -> Result<ResponseBody, ToastateError> {
        let request = self.request(
            HttpMethod::Get,
            access,
            path,
            RequestBody::Empty,
            self.config.streaming_timeout(),
        )?;
        info!(url = %request.url, "Starting streamed download");
        let response = self.execute(request).await?;
        if response.status == 200 {
            return Ok(response.body);
        }
        let status = response.status;
        let body = response.into_bytes().await?;
        Err(ApiError::from_body(status, &body).into())
    }

    /// Upload every file below `folder` as one multipart request. `request`
    /// becomes the trailing `request` field.
    pub async fn upload_folder<T, B>(
        &self,
        access: Access,
        method: UploadMethod,
        path: &str,
        folder: impl AsRef<Path>,
        request: Option<&B>,
    ) -> Result<T, ToastateError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let folder = folder.as_ref();
        if !folder.is_dir() {
            return Err(ToastateError::InvalidInput(format!(
                "upload folder {} is not a directory",
                folder.display()
            )));
        }
        let source = UploadSource::Folder(folder.to_path_buf());
        self.upload(access, method, path, source, Self::request_json(request)?)
            .await
    }

    /// Upload the items of `queue` as one multipart request. The upload ends
    /// when the sender side calls `finish`.
    pub async fn upload_from_queue<T, B>(
        &self,
        access: Access,
        method: UploadMethod,
        path: &str,
        queue: UploadQueue,
        request: Option<&B>,
    ) -> Result<T, ToastateError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.upload(access, method, path, UploadSource::Queue(queue), Self::request_json(request)?)
            .await
    }

    fn request_json<B: Serialize + ?Sized>(request: Option<&B>) -> Result<Option<Vec<u8>>, ToastateError> {
        request
            .map(serde_json::to_vec)
            .transpose()
            .map_err(ToastateError::Serialization)
    }

    async fn upload<T: DeserializeOwned>(
        &self,
        access: Access,
        method: UploadMethod,
        path: &str,
        source: UploadSource,
        request_json: Option<Vec<u8>>,
    ) -> Result<T, ToastateError> {
        let url = self.prepare_url(path)?;
        let mut headers = self.headers(access)?;

        let upload = start_upload(source, request_json, self.config.upload_options());
        for (name, value) in headers.iter_mut() {
            if name.eq_ignore_ascii_case(HEADER_CONTENT_TYPE) {
                *value = upload.content_type.clone();
            }
        }

        let request = TransportRequest {
            method: method.into(),
            url,
            headers,
            body: RequestBody::Stream(upload.body),
            timeout: Some(self.config.streaming_timeout()),
        };
        info!(method = %request.method, url = %request.url, "Starting multipart upload");

        let outcome = self.execute(request).await;

        // Whatever the producer has not finished by now is no longer wanted.
        upload.task.abort();
        if let Some(err) = upload.latch.take().filter(UploadError::is_local) {
            error!(error = %err, "Upload aborted by a local failure");
            return Err(err.into());
        }

        let response = outcome?;
        let status = response.status;
        let body = response.into_bytes().await?;
        let decoded = decode_response(status, &body);
        if decoded.is_ok() {
            info!(status, "Multipart upload accepted");
        }
        decoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MockTransport, TransportError};
    use crate::upload::test_support::parse_form;
    use crate::upload::{upload_queue, UploadItem};
    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Echo {
        value: i64,
    }

    fn config() -> ClientConfig {
        ClientConfig {
            api_url: "https://api.example.test/".into(),
            auth_token: Some("sess_abc".into()),
            upload_chunk_size: 3,
            ..ClientConfig::default()
        }
    }

    fn client(transport: impl Transport + 'static) -> ApiClient {
        ApiClient::with_transport(config(), Arc::new(transport))
    }

    fn respond(status: u16, body: &'static str) -> MockTransport {
        let mut mock = MockTransport::new();
        mock.expect_execute()
            .times(1)
            .returning(move |_| Ok(TransportResponse::from_bytes(status, body)));
        mock
    }

    #[test]
    fn prepare_url_normalises_slashes() {
        let client = client(MockTransport::new());
        assert_eq!(
            client.prepare_url("/toaster/list").unwrap(),
            "https://api.example.test/toaster/list"
        );
        assert_eq!(
            client.prepare_url("signin").unwrap(),
            "https://api.example.test/signin"
        );
        assert!(matches!(
            client.prepare_url(""),
            Err(ToastateError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn authenticated_get_sends_expected_headers() {
        let mut mock = MockTransport::new();
        mock.expect_execute()
            .withf(|req: &TransportRequest| {
                req.method == HttpMethod::Get
                    && req.url == "https://api.example.test/toaster/count/t1"
                    && req.header("x-toastate-apiversion") == Some("v1")
                    && req.header(HEADER_AUTH) == Some("sess_abc")
                    && req.header(HEADER_CONTENT_TYPE) == Some("application/json")
                    && req.timeout == Some(Duration::from_secs(30))
                    && matches!(req.body, RequestBody::Empty)
            })
            .times(1)
            .returning(|_| {
                Ok(TransportResponse::from_bytes(
                    200,
                    r#"{"success":true,"value":3}"#,
                ))
            });

        let echo: Echo = client(mock)
            .get(Access::Authenticated, "/toaster/count/t1")
            .await
            .unwrap();
        assert_eq!(echo, Echo { value: 3 });
    }

    #[tokio::test]
    async fn public_post_omits_token_and_marshals_body() {
        let mut mock = MockTransport::new();
        mock.expect_execute()
            .withf(|req: &TransportRequest| {
                let body_ok = match &req.body {
                    RequestBody::Json(bytes) => {
                        serde_json::from_slice::<Value>(bytes).unwrap() == json!({"email": "a@b.c"})
                    }
                    _ => false,
                };
                req.method == HttpMethod::Post && req.header(HEADER_AUTH).is_none() && body_ok
            })
            .times(1)
            .returning(|_| Ok(TransportResponse::from_bytes(200, r#"{"success":true,"value":1}"#)));

        let echo: Echo = client(mock)
            .post(Access::Public, "/signup", &json!({"email": "a@b.c"}))
            .await
            .unwrap();
        assert_eq!(echo.value, 1);
    }

    #[tokio::test]
    async fn missing_token_fails_before_sending() {
        let mut mock = MockTransport::new();
        mock.expect_execute().never();
        let client = ApiClient::with_transport(ClientConfig::default(), Arc::new(mock));

        let err = client
            .get::<Value>(Access::Authenticated, "/toaster/list")
            .await
            .unwrap_err();
        assert!(matches!(err, ToastateError::NotAuthenticated));
    }

    #[tokio::test]
    async fn error_bodies_are_decoded() {
        let err = client(respond(500, ""))
            .get::<Value>(Access::Public, "/x")
            .await
            .unwrap_err();
        match err {
            ToastateError::Api(api) => {
                assert_eq!(api.status, 500);
                assert_eq!(api.code, ApiError::UNHANDLED);
                assert_eq!(api.message, "The remote API did not provide any error message");
            }
            other => panic!("unexpected error {other:?}"),
        }

        let err = client(respond(
            429,
            r#"{"code":"quota_exceeded","message":"too many toasters"}"#,
        ))
        .get::<Value>(Access::Public, "/x")
        .await
        .unwrap_err();
        match err {
            ToastateError::Api(api) => {
                assert_eq!(api, ApiError::new(429, "quota_exceeded", "too many toasters"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn success_false_is_a_contract_violation() {
        let err = client(respond(200, r#"{"success":false}"#))
            .get::<Value>(Access::Public, "/x")
            .await
            .unwrap_err();
        assert!(matches!(err, ToastateError::UnexpectedFailure));

        let err = client(respond(200, r#"{"value":1}"#))
            .get::<Echo>(Access::Public, "/x")
            .await
            .unwrap_err();
        assert!(matches!(err, ToastateError::UnexpectedFailure));
    }

    #[tokio::test]
    async fn get_stream_returns_body_on_200() {
        let client = client(respond(200, "raw file contents"));
        let mut body = client.get_stream(Access::Authenticated, "/toaster/file/t1/a.txt").await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = body.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"raw file contents");

        match client_with_404().get_stream(Access::Authenticated, "/x").await {
            Err(ToastateError::Api(api)) => assert_eq!(api.code, "not_found"),
            Err(other) => panic!("unexpected error {other:?}"),
            Ok(_) => panic!("a 404 must not yield a body"),
        }
    }

    fn client_with_404() -> ApiClient {
        client(respond(404, r#"{"code":"not_found","message":"no such file"}"#))
    }

    /// Reads the whole multipart body like a server would, then answers.
    #[derive(Default)]
    struct CollectingTransport {
        seen: Mutex<Option<(TransportRequest, Vec<u8>)>>,
    }

    #[async_trait]
    impl Transport for CollectingTransport {
        async fn execute(
            &self,
            mut request: TransportRequest,
        ) -> Result<TransportResponse, TransportError> {
            let body = std::mem::replace(&mut request.body, RequestBody::Empty);
            let RequestBody::Stream(mut reader) = body else {
                return Err("expected a streamed body".into());
            };
            let mut bytes = Vec::new();
            while let Some(chunk) = reader.next().await {
                bytes.extend_from_slice(&chunk?);
            }
            *self.seen.lock().unwrap() = Some((request, bytes));
            Ok(TransportResponse::from_bytes(
                200,
                r#"{"success":true,"value":42}"#,
            ))
        }
    }

    /// Answers before reading anything, like a server rejecting the upload.
    struct RejectingTransport {
        status: u16,
    }

    #[async_trait]
    impl Transport for RejectingTransport {
        async fn execute(
            &self,
            request: TransportRequest,
        ) -> Result<TransportResponse, TransportError> {
            drop(request);
            Ok(TransportResponse::from_bytes(
                self.status,
                r#"{"code":"too_large","message":"payload too large"}"#,
            ))
        }
    }

    struct BrokenTransport;

    #[async_trait]
    impl Transport for BrokenTransport {
        async fn execute(&self, _: TransportRequest) -> Result<TransportResponse, TransportError> {
            Err("connection reset by peer".into())
        }
    }

    #[tokio::test]
    async fn folder_upload_streams_every_file_and_request_field() {
        let tmp = tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("lib")).unwrap();
        std::fs::write(tmp.path().join("main.go"), "package main").unwrap();
        std::fs::write(tmp.path().join("lib/util.go"), "package lib").unwrap();

        let transport = Arc::new(CollectingTransport::default());
        let client = ApiClient::with_transport(config(), transport.clone());
        let echo: Echo = client
            .upload_folder(
                Access::Authenticated,
                UploadMethod::Put,
                "/toaster/t1",
                tmp.path(),
                Some(&json!({"name": "demo"})),
            )
            .await
            .unwrap();
        assert_eq!(echo.value, 42);

        let (request, body) = transport.seen.lock().unwrap().take().unwrap();
        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(request.header(HEADER_AUTH), Some("sess_abc"));
        assert_eq!(request.timeout, Some(config().streaming_timeout()));
        let content_type = request.header(HEADER_CONTENT_TYPE).unwrap();
        let boundary = content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap();

        let parts = parse_form(&body, boundary);
        let names: Vec<_> = parts.iter().map(|p| p.decoded_filename()).collect();
        assert_eq!(
            names,
            vec![Some("lib/util.go".to_string()), Some("main.go".to_string()), None]
        );
        assert_eq!(parts[2].name, "request");
        assert_eq!(
            serde_json::from_slice::<Value>(&parts[2].data).unwrap(),
            json!({"name": "demo"})
        );
    }

    #[tokio::test]
    async fn local_failure_wins_over_transport_failure() {
        let (tx, queue) = upload_queue(4);
        tx.send(UploadItem::from_bytes("ok.txt", b"fine".to_vec()))
            .await
            .unwrap();
        drop(tx);

        let err = client(CollectingTransport::default())
            .upload_from_queue::<Echo, Value>(
                Access::Authenticated,
                UploadMethod::Post,
                "/toaster",
                queue,
                None,
            )
            .await
            .unwrap_err();
        assert!(
            matches!(err, ToastateError::Upload(UploadError::QueueClosed)),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn early_rejection_surfaces_the_remote_error() {
        let (tx, queue) = upload_queue(1);
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            client(RejectingTransport { status: 413 }).upload_from_queue::<Echo, Value>(
                Access::Authenticated,
                UploadMethod::Post,
                "/toaster",
                queue,
                None,
            ),
        )
        .await
        .expect("upload must not wait for a sentinel after the server answered");

        match result {
            Err(ToastateError::Api(api)) => {
                assert_eq!(api.status, 413);
                assert_eq!(api.code, "too_large");
            }
            other => panic!("unexpected result {other:?}"),
        }
        drop(tx);
    }

    #[tokio::test]
    async fn transport_failure_is_reported_when_source_is_fine() {
        let tmp = tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "a").unwrap();

        let err = client(BrokenTransport)
            .upload_folder::<Echo, Value>(
                Access::Authenticated,
                UploadMethod::Post,
                "/toaster",
                tmp.path(),
                None,
            )
            .await
            .unwrap_err();
        match err {
            ToastateError::Transport(e) => assert!(e.to_string().contains("connection reset")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn upload_root_must_be_a_directory() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        let mut mock = MockTransport::new();
        mock.expect_execute().never();

        let err = client(mock)
            .upload_folder::<Echo, Value>(Access::Authenticated, UploadMethod::Post, "/toaster", &file, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToastateError::InvalidInput(_)));
    }
}
