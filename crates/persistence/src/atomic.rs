//! Crash-safe JSON file writes: serialize, write to a sibling temp file,
//! fsync, then rename into place. A reader never observes a half-written
//! file because the rename is the only operation that makes the new
//! content visible under the real path.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::errors::PersistenceError;

pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let content = serde_json::to_vec_pretty(value)?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp_path = sibling_tmp_path(path);

    let mut tmp = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&tmp_path)
        .await?;
    tmp.write_all(&content).await?;
    tmp.flush().await?;
    tmp.sync_all().await?;
    drop(tmp);

    match tokio::fs::rename(&tmp_path, path).await {
        Ok(()) => Ok(()),
        Err(_) => {
            let _ = tokio::fs::remove_file(path).await;
            tokio::fs::rename(&tmp_path, path).await?;
            Ok(())
        }
    }
}

fn sibling_tmp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("entry.json");
    path.with_file_name(format!("{file_name}.tmp.{}", uuid::Uuid::new_v4()))
}
