//! # upload: streaming multipart bodies
//!
//! An upload runs as two concurrent parts. A background task walks the
//! source (a folder or a queue of [`UploadItem`]s), encodes every file as a
//! multipart part and writes the encoded bytes into a [`pipe`]. The caller
//! hands the reader side of that pipe to the transport as the request body.
//! Nothing is buffered beyond the pipe's capacity, so a slow connection
//! throttles file reading.
//!
//! The first failure of the background task is kept in an [`ErrorLatch`].
//! When that failure is local (filesystem, queue), the pipe is closed with
//! an error so the transport aborts the request instead of sending a
//! truncated form.

pub mod latch;
pub mod multipart;
pub mod pipe;
pub mod queue;

mod folder;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use latch::ErrorLatch;
pub use multipart::{decode_filename, encode_filename, MultipartWriter, FILE_FIELD, REQUEST_FIELD};
pub use pipe::{pipe, PipeClosed, PipeReader, PipeWriter};
pub use queue::{upload_queue, QueueMessage, QueueStopped, UploadItem, UploadQueue, UploadSender};

use crate::error::UploadError;

/// Where the files of an upload come from.
#[derive(Debug)]
pub enum UploadSource {
    /// Every regular file below this directory.
    Folder(PathBuf),
    /// Items pushed by the caller until [`UploadSender::finish`].
    Queue(UploadQueue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    /// Largest single read from a source, in bytes.
    pub chunk_size: usize,
    /// Chunks allowed in flight between the encoder and the transport.
    pub pipe_capacity: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: 5 * 1024 * 1024,
            pipe_capacity: 1,
        }
    }
}

/// A running upload: the body to send and where its producer reports failures.
#[derive(Debug)]
pub struct StartedUpload {
    pub content_type: String,
    pub body: PipeReader,
    pub latch: Arc<ErrorLatch<UploadError>>,
    pub task: JoinHandle<()>,
}

/// Spawn the producer for `source`. `request_json`, when present and not
/// empty, becomes the last part of the form.
pub fn start_upload(
    source: UploadSource,
    request_json: Option<Vec<u8>>,
    options: UploadOptions,
) -> StartedUpload {
    let (writer, body) = pipe(options.pipe_capacity);
    let form = MultipartWriter::new(writer);
    let content_type = form.content_type();
    let latch = Arc::new(ErrorLatch::new());

    let task = tokio::spawn(produce(
        form,
        source,
        request_json,
        options.chunk_size,
        Arc::clone(&latch),
    ));

    StartedUpload {
        content_type,
        body,
        latch,
        task,
    }
}

async fn produce(
    mut form: MultipartWriter,
    source: UploadSource,
    request_json: Option<Vec<u8>>,
    chunk_size: usize,
    latch: Arc<ErrorLatch<UploadError>>,
) {
    let result = match source {
        UploadSource::Folder(root) => folder::write_folder(&mut form, &root, chunk_size).await,
        UploadSource::Queue(mut queue) => {
            queue::drain_queue(&mut form, &mut queue, chunk_size).await
        }
    };

    match result {
        Ok(parts) => debug!(parts, "[UPLOAD] Source exhausted"),
        Err(err) => {
            warn!(error = %err, local = err.is_local(), "[UPLOAD] Source aborted");
            latch.set_once(err);
        }
    }

    if !latch.is_set() {
        if let Some(json) = request_json.filter(|json| !json.is_empty()) {
            let written = form.write_field(REQUEST_FIELD, json).await;
            latch.capture(written.map_err(UploadError::from));
        }
    }

    let closed = form.close().await;
    latch.capture(closed.map_err(UploadError::from));

    let writer = form.into_inner();
    match latch.peek(|err| err.is_local().then(|| err.to_string())).flatten() {
        Some(message) => {
            writer.close_with_error(io::Error::other(message)).await;
        }
        None => {
            info!("[UPLOAD] Body complete");
            writer.close();
        }
    }
}
