//! Queue source: callers push [`UploadItem`]s while the upload is running and
//! finish with an explicit end marker.

use std::fmt;
use std::io;
use std::path::Path;

use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::multipart::MultipartWriter;
use crate::error::UploadError;

/// One file to upload. The reader is owned by the upload once the item has
/// been sent and is dropped exactly once, after its bytes are copied or when
/// the copy fails.
pub struct UploadItem {
    filename: String,
    reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl UploadItem {
    pub fn new(filename: impl Into<String>, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            filename: filename.into(),
            reader: Box::new(reader),
        }
    }

    pub fn from_bytes(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(filename, io::Cursor::new(bytes.into()))
    }

    /// Open a file on disk, uploaded under `filename`.
    pub async fn open(filename: impl Into<String>, path: impl AsRef<Path>) -> io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(filename, tokio::io::BufReader::new(file)))
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    fn into_parts(self) -> (String, Box<dyn AsyncRead + Send + Unpin>) {
        (self.filename, self.reader)
    }
}

impl fmt::Debug for UploadItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadItem")
            .field("filename", &self.filename)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum QueueMessage {
    Item(UploadItem),
    /// No more items follow.
    End,
}

/// The upload stopped consuming the queue. Carries the rejected item back, if any.
#[derive(Debug, Error)]
#[error("the upload is no longer consuming queued items")]
pub struct QueueStopped {
    pub item: Option<UploadItem>,
}

/// Create a queue holding at most `capacity` pending messages.
pub fn upload_queue(capacity: usize) -> (UploadSender, UploadQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (UploadSender { tx }, UploadQueue { rx })
}

/// Producer handle. Clones share the same queue; the first
/// [`UploadSender::finish`] ends the upload.
#[derive(Debug, Clone)]
pub struct UploadSender {
    tx: mpsc::Sender<QueueMessage>,
}

impl UploadSender {
    pub async fn send(&self, item: UploadItem) -> Result<(), QueueStopped> {
        self.tx
            .send(QueueMessage::Item(item))
            .await
            .map_err(|err| match err.0 {
                QueueMessage::Item(item) => QueueStopped { item: Some(item) },
                QueueMessage::End => QueueStopped { item: None },
            })
    }

    /// Send the end marker.
    pub async fn finish(self) -> Result<(), QueueStopped> {
        self.tx
            .send(QueueMessage::End)
            .await
            .map_err(|_| QueueStopped { item: None })
    }
}

/// Consumer side, handed to the upload.
#[derive(Debug)]
pub struct UploadQueue {
    rx: mpsc::Receiver<QueueMessage>,
}

impl UploadQueue {
    pub(crate) async fn recv(&mut self) -> Option<QueueMessage> {
        self.rx.recv().await
    }
}

/// Copy queued items into `form` until the end marker. Stops at the first
/// failure, and also when the pipe reader goes away while waiting for the
/// next item.
pub(crate) async fn drain_queue(
    form: &mut MultipartWriter,
    queue: &mut UploadQueue,
    chunk_size: usize,
) -> Result<usize, UploadError> {
    let mut parts = 0;
    loop {
        let message = tokio::select! {
            message = queue.recv() => message,
            _ = form.reader_closed() => return Err(UploadError::ReaderClosed),
        };

        match message {
            Some(QueueMessage::Item(item)) => {
                let (filename, reader) = item.into_parts();
                debug!(filename = %filename, "[UPLOAD] Dequeued item");
                form.write_file(&filename, reader, chunk_size).await?;
                parts += 1;
            }
            Some(QueueMessage::End) => {
                info!(parts, "[UPLOAD] Queue finished");
                return Ok(parts);
            }
            None => return Err(UploadError::QueueClosed),
        }
    }
}
