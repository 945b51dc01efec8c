//! Folder source: every regular file under a root, sorted by file name
//! within each directory.
//!
//! Directory traversal is blocking, so `walkdir` runs on a blocking thread and
//! hands entries over a small channel. The async side opens and streams each
//! file. Dropping the receiver stops the walk.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::multipart::MultipartWriter;
use crate::error::UploadError;

const WALK_BUFFER: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FolderEntry {
    /// Path relative to the root, `/`-separated, in the bytes the
    /// filesystem gave.
    pub name: Vec<u8>,
    pub path: PathBuf,
}

pub(crate) fn relative_name(root: &Path, path: &Path) -> Vec<u8> {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let mut name = Vec::new();
    for component in rel.components() {
        if !name.is_empty() {
            name.push(b'/');
        }
        name.extend_from_slice(component.as_os_str().as_encoded_bytes());
    }
    name
}

fn walk_into(root: &Path, tx: &mpsc::Sender<Result<FolderEntry, UploadError>>) {
    let walker = WalkDir::new(root).follow_links(true).sort_by_file_name();
    for entry in walker {
        let item = match entry {
            Ok(entry) if !entry.file_type().is_file() => continue,
            Ok(entry) => Ok(FolderEntry {
                name: relative_name(root, entry.path()),
                path: entry.into_path(),
            }),
            Err(err) => Err(UploadError::Walk(err)),
        };
        let failed = item.is_err();
        if tx.blocking_send(item).is_err() || failed {
            return;
        }
    }
}

/// Start walking `root` on a blocking thread.
pub(crate) fn spawn_walk(root: PathBuf) -> mpsc::Receiver<Result<FolderEntry, UploadError>> {
    let (tx, rx) = mpsc::channel(WALK_BUFFER);
    tokio::task::spawn_blocking(move || walk_into(&root, &tx));
    rx
}

/// Stream every file under `root` into `form`, one part per file. The first
/// filesystem error stops the walk.
pub(crate) async fn write_folder(
    form: &mut MultipartWriter,
    root: &Path,
    chunk_size: usize,
) -> Result<usize, UploadError> {
    info!(root = %root.display(), "[UPLOAD] Walking folder");
    let mut entries = spawn_walk(root.to_path_buf());
    let mut parts = 0;

    while let Some(entry) = entries.recv().await {
        let entry = entry?;
        debug!(path = %entry.path.display(), "[UPLOAD] Opening file");
        let file = File::open(&entry.path)
            .await
            .map_err(|source| UploadError::Source {
                name: String::from_utf8_lossy(&entry.name).into_owned(),
                source,
            })?;
        form.write_file(&entry.name, BufReader::new(file), chunk_size)
            .await?;
        parts += 1;
    }

    Ok(parts)
}
