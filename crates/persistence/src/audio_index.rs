//! Persistent index of cached audio artifacts, keyed by fingerprint. The
//! audio bytes themselves live as plain files under the audio directory;
//! this index tracks metadata (size, last access) so the cache can enforce
//! its LRU eviction policy across process restarts.

use std::collections::HashMap;
use std::path::PathBuf;

use domain::AudioArtifact;
use serde::{Deserialize, Serialize};

use crate::atomic::write_json_atomic;
use crate::errors::PersistenceError;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AudioIndex {
    pub artifacts: HashMap<String, AudioArtifact>,
}

pub struct AudioIndexStore {
    index_path: PathBuf,
}

impl AudioIndexStore {
    pub fn new(audio_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_path: audio_dir.into().join("index.json"),
        }
    }

    pub async fn load(&self) -> Result<AudioIndex, PersistenceError> {
        match tokio::fs::read_to_string(&self.index_path).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(index) => Ok(index),
                Err(err) => {
                    tracing::warn!(path = %self.index_path.display(), error = %err, "audio index is corrupt, starting empty");
                    Ok(AudioIndex::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AudioIndex::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, index: &AudioIndex) -> Result<(), PersistenceError> {
        write_json_atomic(&self.index_path, index).await
    }
}
