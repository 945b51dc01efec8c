//! In-process mock of the Toastate API for integration tests.
//!
//! Starts on a random port in its own thread and runtime, decodes multipart
//! uploads the way the real API does (base32 filenames, trailing `request`
//! field) and records what it received.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use data_encoding::{BASE32, BASE64};
use serde_json::{json, Value};

pub const TOKEN: &str = "sess_integration";
pub const PASSWORD: &str = "correct horse";

#[derive(Debug, Clone, Default)]
pub struct ReceivedUpload {
    pub method: String,
    pub toaster_id: Option<String>,
    pub files: Vec<(String, Vec<u8>)>,
    pub request: Option<Value>,
}

#[derive(Default)]
pub struct Recorded {
    pub uploads: Vec<ReceivedUpload>,
}

pub type Shared = Arc<Mutex<Recorded>>;

pub struct MockServer {
    pub url: String,
    pub state: Shared,
}

impl MockServer {
    pub fn uploads(&self) -> Vec<ReceivedUpload> {
        self.state.lock().unwrap().uploads.clone()
    }
}

fn api_error(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({"code": code, "message": message}))).into_response()
}

fn authorized(headers: &HeaderMap) -> Result<(), Response> {
    if headers.get("x-toastate-apiversion").and_then(|v| v.to_str().ok()) != Some("v1") {
        return Err(api_error(StatusCode::BAD_REQUEST, "bad_version", "missing API version"));
    }
    match headers.get("x-toastate-auth").and_then(|v| v.to_str().ok()) {
        Some(TOKEN) => Ok(()),
        _ => Err(api_error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid session")),
    }
}

async fn signin(Json(body): Json<Value>) -> Response {
    if body["password"] != PASSWORD || body["set_token"] != true {
        return api_error(StatusCode::UNAUTHORIZED, "invalid_credentials", "wrong email or password");
    }
    Json(json!({"success": true, "token": TOKEN})).into_response()
}

async fn list_toasters(headers: HeaderMap) -> Response {
    if let Err(rejection) = authorized(&headers) {
        return rejection;
    }
    Json(json!({
        "success": true,
        "toasters": [
            {"id": "t1", "name": "first", "execution_command": ["python", "main.py"]},
            {"id": "t2", "name": "second"}
        ]
    }))
    .into_response()
}

async fn read_upload(
    method: &str,
    toaster_id: Option<String>,
    mut multipart: Multipart,
) -> Result<ReceivedUpload, Response> {
    let mut upload = ReceivedUpload {
        method: method.to_string(),
        toaster_id,
        ..ReceivedUpload::default()
    };
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err(api_error(StatusCode::BAD_REQUEST, "bad_multipart", &e.to_string()))
            }
        };
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, "bad_multipart", &e.to_string()))?;
        match (name.as_str(), filename) {
            ("file", Some(encoded)) => {
                let decoded = BASE32
                    .decode(encoded.as_bytes())
                    .map_err(|_| api_error(StatusCode::BAD_REQUEST, "bad_filename", &encoded))?;
                let path = String::from_utf8(decoded)
                    .map_err(|_| api_error(StatusCode::BAD_REQUEST, "bad_filename", &encoded))?;
                upload.files.push((path, data.to_vec()));
            }
            ("request", None) => {
                upload.request = Some(serde_json::from_slice(&data).map_err(|e| {
                    api_error(StatusCode::BAD_REQUEST, "bad_request_field", &e.to_string())
                })?);
            }
            _ => {}
        }
    }
    Ok(upload)
}

fn deployed(state: &Shared, upload: ReceivedUpload) -> Response {
    let id = upload.toaster_id.clone().unwrap_or_else(|| "t-new".to_string());
    let name = upload
        .request
        .as_ref()
        .and_then(|r| r["name"].as_str())
        .unwrap_or_default()
        .to_string();
    let logs = format!("built {} files", upload.files.len());
    state.lock().unwrap().uploads.push(upload);
    Json(json!({
        "success": true,
        "toaster": {"id": id, "name": name},
        "domain": format!("{id}.toaster.test"),
        "build_logs": BASE64.encode(logs.as_bytes()),
    }))
    .into_response()
}

async fn create_toaster(State(state): State<Shared>, headers: HeaderMap, multipart: Multipart) -> Response {
    // Drain the body first; answering mid-stream may reset the connection.
    let upload = match read_upload("POST", None, multipart).await {
        Ok(upload) => upload,
        Err(rejection) => return rejection,
    };
    match authorized(&headers) {
        Ok(()) => deployed(&state, upload),
        Err(rejection) => rejection,
    }
}

async fn update_toaster(
    State(state): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let upload = match read_upload("PUT", Some(id), multipart).await {
        Ok(upload) => upload,
        Err(rejection) => return rejection,
    };
    match authorized(&headers) {
        Ok(()) => deployed(&state, upload),
        Err(rejection) => rejection,
    }
}

async fn get_toaster(Path(id): Path<String>, headers: HeaderMap) -> Response {
    if let Err(rejection) = authorized(&headers) {
        return rejection;
    }
    if id == "missing" {
        return api_error(StatusCode::NOT_FOUND, "not_found", "no such toaster");
    }
    Json(json!({"success": true, "toaster": {"id": id}})).into_response()
}

/// Serves files from the most recent upload of the toaster.
async fn get_toaster_file(
    State(state): State<Shared>,
    Path((id, path)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Err(rejection) = authorized(&headers) {
        return rejection;
    }
    let recorded = state.lock().unwrap();
    let found = recorded
        .uploads
        .iter()
        .rev()
        .filter(|u| u.toaster_id.as_deref().unwrap_or("t-new") == id)
        .find_map(|u| u.files.iter().find(|(name, _)| *name == path))
        .map(|(_, data)| data.clone());
    match found {
        Some(data) => (StatusCode::OK, data).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "not_found", "no such file"),
    }
}

async fn delete_custom_domain(Path(_id): Path<String>, headers: HeaderMap) -> Response {
    if let Err(rejection) = authorized(&headers) {
        return rejection;
    }
    Json(json!({"success": true})).into_response()
}

/// Reads the whole body, then refuses it.
async fn reject_upload(_body: axum::body::Bytes) -> Response {
    api_error(StatusCode::PAYLOAD_TOO_LARGE, "too_large", "payload too large")
}

async fn silent_failure() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn lying_success() -> Response {
    Json(json!({"success": false})).into_response()
}

pub fn app(state: Shared) -> Router {
    Router::new()
        .route("/signin", post(signin))
        .route("/toaster", post(create_toaster))
        .route("/toaster/list", get(list_toasters))
        .route("/toaster/{id}", get(get_toaster).put(update_toaster))
        .route("/toaster/file/{id}/{*path}", get(get_toaster_file))
        .route("/customdomain/{id}", delete(delete_custom_domain))
        .route("/reject", post(reject_upload))
        .route("/silent", get(silent_failure))
        .route("/lying", get(lying_success))
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

/// Start the mock server on a random port in a background thread.
pub fn start() -> MockServer {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    let state: Shared = Arc::default();
    let app = app(Arc::clone(&state));
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            axum::serve(listener, app).await
        })
        .unwrap();
    });

    MockServer {
        url: format!("http://{addr}"),
        state,
    }
}
