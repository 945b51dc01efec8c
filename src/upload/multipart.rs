//! Incremental `multipart/form-data` encoder writing into a [`PipeWriter`].
//!
//! Parts are written strictly one after another: a part's header, then its
//! data chunks, then the next part's header. Filenames travel base32-encoded
//! so arbitrary paths never collide with the header syntax.

use std::fmt::Write as _;

use bytes::Bytes;
use data_encoding::BASE32;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;
use uuid::Uuid;

use super::pipe::{PipeClosed, PipeWriter};
use crate::error::UploadError;

/// Form field carrying each uploaded file.
pub const FILE_FIELD: &str = "file";
/// Form field carrying the auxiliary JSON request.
pub const REQUEST_FIELD: &str = "request";

/// Encode a logical path the way the remote API expects it in `filename`.
/// The bytes are taken as they are, so names that are not UTF-8 survive.
pub fn encode_filename(name: impl AsRef<[u8]>) -> String {
    BASE32.encode(name.as_ref())
}

/// Inverse of [`encode_filename`], as the server performs it.
pub fn decode_filename(encoded: &str) -> Result<Vec<u8>, data_encoding::DecodeError> {
    BASE32.decode(encoded.as_bytes())
}

fn escape_quotes(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[derive(Debug)]
pub struct MultipartWriter {
    writer: PipeWriter,
    boundary: String,
    has_parts: bool,
    closed: bool,
}

impl MultipartWriter {
    pub fn new(writer: PipeWriter) -> Self {
        Self {
            writer,
            boundary: Uuid::new_v4().simple().to_string(),
            has_parts: false,
            closed: false,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the request's `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    async fn create_part(
        &mut self,
        disposition: String,
        content_type: Option<&str>,
    ) -> Result<(), PipeClosed> {
        let mut header = String::new();
        if self.has_parts {
            header.push_str("\r\n");
        }
        let _ = write!(header, "--{}\r\n", self.boundary);
        let _ = write!(header, "Content-Disposition: {disposition}\r\n");
        if let Some(content_type) = content_type {
            let _ = write!(header, "Content-Type: {content_type}\r\n");
        }
        header.push_str("\r\n");

        self.has_parts = true;
        self.writer.write(Bytes::from(header)).await
    }

    /// Start a file part. Its data follows through [`MultipartWriter::write`].
    pub async fn create_form_file(&mut self, field: &str, filename: &str) -> Result<(), PipeClosed> {
        let disposition = format!(
            "form-data; name=\"{}\"; filename=\"{}\"",
            escape_quotes(field),
            escape_quotes(filename)
        );
        self.create_part(disposition, Some("application/octet-stream"))
            .await
    }

    /// Append data to the part created last.
    pub async fn write(&mut self, chunk: Bytes) -> Result<(), PipeClosed> {
        self.writer.write(chunk).await
    }

    /// Write a complete plain field.
    pub async fn write_field(&mut self, field: &str, value: impl Into<Bytes>) -> Result<(), PipeClosed> {
        let disposition = format!("form-data; name=\"{}\"", escape_quotes(field));
        self.create_part(disposition, None).await?;
        self.write(value.into()).await
    }

    /// Copy `reader` into a new `file` part named after `name`, at most
    /// `chunk_size` bytes per write. The reader is dropped on return, whatever
    /// the outcome.
    pub async fn write_file<N, R>(
        &mut self,
        name: N,
        mut reader: R,
        chunk_size: usize,
    ) -> Result<u64, UploadError>
    where
        N: AsRef<[u8]>,
        R: AsyncRead + Unpin,
    {
        let chunk_size = chunk_size.max(1);
        let raw_name = name.as_ref();
        let name = String::from_utf8_lossy(raw_name);
        self.create_form_file(FILE_FIELD, &encode_filename(raw_name))
            .await?;

        let mut total = 0u64;
        loop {
            let mut chunk = Vec::new();
            let n = (&mut reader)
                .take(chunk_size as u64)
                .read_to_end(&mut chunk)
                .await
                .map_err(|source| UploadError::Source {
                    name: name.to_string(),
                    source,
                })?;
            if n == 0 {
                break;
            }
            total += n as u64;
            self.write(Bytes::from(chunk)).await?;
            if n < chunk_size {
                break;
            }
        }

        debug!(filename = %name, bytes = total, "[UPLOAD] File part written");
        Ok(total)
    }

    /// Write the closing boundary. Later calls do nothing.
    pub async fn close(&mut self) -> Result<(), PipeClosed> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let trailer = if self.has_parts {
            format!("\r\n--{}--\r\n", self.boundary)
        } else {
            format!("--{}--\r\n", self.boundary)
        };
        self.writer.write(Bytes::from(trailer)).await
    }

    /// Resolves once the consumer of the pipe has gone away.
    pub async fn reader_closed(&self) {
        self.writer.closed().await
    }

    pub fn into_inner(self) -> PipeWriter {
        self.writer
    }
}
