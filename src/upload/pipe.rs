//! In-process byte pipe between the multipart producer and the HTTP body.
//!
//! The pipe is a bounded channel of chunks. A write waits until the reader
//! has room, so a slow connection throttles the producer. Dropping the
//! [`PipeReader`] fails every pending and future write with [`PipeClosed`].

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use thiserror::Error;
use tokio::sync::mpsc;

/// The reader side of the pipe went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("pipe reader closed")]
pub struct PipeClosed;

/// Create a connected writer/reader pair holding at most `capacity` chunks
/// in flight (minimum one).
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (PipeWriter { tx }, PipeReader { rx })
}

#[derive(Debug)]
pub struct PipeWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl PipeWriter {
    /// Hand one chunk to the reader, waiting while the pipe is full.
    pub async fn write(&self, chunk: Bytes) -> Result<(), PipeClosed> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.tx.send(Ok(chunk)).await.map_err(|_| PipeClosed)
    }

    /// Resolves once the reader side has been dropped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// The reader sees end-of-stream after draining what was written.
    pub fn close(self) {}

    /// The reader sees `err` after draining what was written.
    pub async fn close_with_error(self, err: io::Error) {
        // Nothing to report if the reader is already gone.
        let _ = self.tx.send(Err(err)).await;
    }
}

#[derive(Debug)]
pub struct PipeReader {
    rx: mpsc::Receiver<io::Result<Bytes>>,
}

impl PipeReader {
    /// Stop consuming. Blocked writers are released with [`PipeClosed`].
    pub fn close(mut self) {
        self.rx.close();
    }
}

impl Stream for PipeReader {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
