//! On-disk storage for `Session` records: one JSON file per session, named
//! by session id, under a configured directory.

use std::path::{Path, PathBuf};

use domain::{Session, CURRENT_SCHEMA_VERSION};

use crate::atomic::write_json_atomic;
use crate::errors::PersistenceError;

pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    pub async fn save(&self, session: &Session) -> Result<(), PersistenceError> {
        write_json_atomic(&self.path_for(&session.session_id), session).await
    }

    pub async fn delete(&self, session_id: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(session_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn load(&self, session_id: &str) -> Result<Session, PersistenceError> {
        let path = self.path_for(session_id);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    PersistenceError::NotFound(session_id.to_string())
                }
                _ => PersistenceError::Io(e),
            })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Loads every session file in the directory. Files that fail to parse,
    /// or whose `schema_version` is newer than what this binary understands,
    /// are skipped with a warning rather than aborting startup.
    pub async fn load_all(&self) -> Result<Vec<Session>, PersistenceError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        load_all_json(&self.dir, |raw, path| match serde_json::from_str::<Session>(raw) {
            Ok(session) if session.schema_version > CURRENT_SCHEMA_VERSION => {
                tracing::warn!(
                    path = %path.display(),
                    found_version = session.schema_version,
                    supported_version = CURRENT_SCHEMA_VERSION,
                    "skipping session file with unsupported schema version"
                );
                None
            }
            Ok(session) => Some(session),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping corrupt session file");
                None
            }
        })
        .await
    }
}

pub(crate) async fn load_all_json<T>(
    dir: &Path,
    mut parse: impl FnMut(&str, &Path) -> Option<T>,
) -> Result<Vec<T>, PersistenceError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut out = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read file during startup scan");
                continue;
            }
        };
        if let Some(value) = parse(&raw, &path) {
            out.push(value);
        }
    }

    Ok(out)
}
