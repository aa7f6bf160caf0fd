//! On-disk storage for `AdminIdentity` records, one JSON file per admin id.

use std::path::PathBuf;

use domain::{AdminIdentity, CURRENT_SCHEMA_VERSION};
use uuid::Uuid;

use crate::atomic::write_json_atomic;
use crate::errors::PersistenceError;
use crate::session_store::load_all_json;

pub struct AdminStore {
    dir: PathBuf,
}

impl AdminStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, admin_id: Uuid) -> PathBuf {
        self.dir.join(format!("{admin_id}.json"))
    }

    pub async fn save(&self, identity: &AdminIdentity) -> Result<(), PersistenceError> {
        write_json_atomic(&self.path_for(identity.admin_id), identity).await
    }

    pub async fn load(&self, admin_id: Uuid) -> Result<AdminIdentity, PersistenceError> {
        let path = self.path_for(admin_id);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => PersistenceError::NotFound(admin_id.to_string()),
                _ => PersistenceError::Io(e),
            })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub async fn delete(&self, admin_id: Uuid) -> Result<(), PersistenceError> {
        let path = self.path_for(admin_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn load_all(&self) -> Result<Vec<AdminIdentity>, PersistenceError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        load_all_json(&self.dir, |raw, path| {
            match serde_json::from_str::<AdminIdentity>(raw) {
                Ok(identity) if identity.schema_version > CURRENT_SCHEMA_VERSION => {
                    tracing::warn!(
                        path = %path.display(),
                        found_version = identity.schema_version,
                        supported_version = CURRENT_SCHEMA_VERSION,
                        "skipping admin identity file with unsupported schema version"
                    );
                    None
                }
                Ok(identity) => Some(identity),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping corrupt admin identity file");
                    None
                }
            }
        })
        .await
    }
}
