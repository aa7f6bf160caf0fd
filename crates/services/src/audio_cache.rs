//! Disk-backed, content-addressed cache of synthesized audio. Identical
//! `(text, language, voiceType)` tuples hash to the same fingerprint, so two
//! clients requesting the same phrase at once share one TTS call instead of
//! paying for it twice (single-flight coalescing), and repeat phrases within
//! a session never hit the TTS provider again. `voiceType` is part of the
//! key, not `format`: a `neural` and `standard` rendering of identical text
//! are different artifacts even if both come back as mp3.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use domain::{AudioArtifact, ErrorCode, VoiceType};
use indexmap::IndexMap;
use persistence::{AudioIndex, AudioIndexStore};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, Notify, RwLock};

use crate::errors::ServiceError;
use crate::tts::{SpeechRequest, TtsService};

pub fn fingerprint(text: &str, language: &str, voice_type: VoiceType) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(b"\0");
    hasher.update(language.as_bytes());
    hasher.update(b"\0");
    hasher.update(voice_type.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

pub struct AudioCache {
    audio_dir: PathBuf,
    index_store: AudioIndexStore,
    /// Access-ordered map: front is least-recently-used, back is most recent.
    order: RwLock<IndexMap<String, ()>>,
    entries: RwLock<HashMap<String, AudioArtifact>>,
    in_flight: Mutex<HashMap<String, Arc<Notify>>>,
    max_size_bytes: u64,
    max_age: chrono::Duration,
    tts: Arc<dyn TtsService>,
}

impl AudioCache {
    pub async fn load(
        audio_dir: PathBuf,
        max_size_bytes: u64,
        max_age: chrono::Duration,
        tts: Arc<dyn TtsService>,
    ) -> Result<Self, ServiceError> {
        tokio::fs::create_dir_all(&audio_dir).await.map_err(|e| {
            ServiceError::new(ErrorCode::SystemInternalError, e.to_string())
        })?;
        let index_store = AudioIndexStore::new(&audio_dir);
        let AudioIndex { artifacts } = index_store.load().await?;

        let mut order = IndexMap::new();
        let mut by_last_accessed: Vec<_> = artifacts.iter().collect();
        by_last_accessed.sort_by_key(|(_, a)| a.last_accessed);
        for (fp, _) in by_last_accessed {
            order.insert(fp.clone(), ());
        }

        Ok(Self {
            audio_dir,
            index_store,
            order: RwLock::new(order),
            entries: RwLock::new(artifacts),
            in_flight: Mutex::new(HashMap::new()),
            max_size_bytes,
            max_age,
            tts,
        })
    }

    fn path_for(&self, fp: &str, format: &str) -> PathBuf {
        self.audio_dir.join(format!("{fp}.{format}"))
    }

    /// Returns cached audio bytes for `(text, language, voiceType)`,
    /// synthesizing and caching them on a miss. Concurrent misses for the
    /// same fingerprint coalesce into a single TTS call. `format` only
    /// selects the on-disk file extension and content type; it plays no
    /// part in the fingerprint.
    pub async fn get_or_synthesize(
        &self,
        text: &str,
        language: &str,
        voice_type: VoiceType,
        format: &str,
    ) -> Result<(String, Vec<u8>), ServiceError> {
        let fp = fingerprint(text, language, voice_type);

        if let Some(bytes) = self.try_read_cached(&fp, format).await? {
            return Ok((fp, bytes));
        }

        let notify = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(existing) = in_flight.get(&fp) {
                Some(existing.clone())
            } else {
                in_flight.insert(fp.clone(), Arc::new(Notify::new()));
                None
            }
        };

        if let Some(notify) = notify {
            notify.notified().await;
            let bytes = self
                .try_read_cached(&fp, format)
                .await?
                .ok_or_else(|| ServiceError::new(ErrorCode::SystemInternalError, "synthesis by peer did not populate cache"))?;
            return Ok((fp, bytes));
        }

        let result = self
            .tts
            .synthesize(SpeechRequest {
                text: text.to_string(),
                language: language.to_string(),
                voice_type,
                format: format.to_string(),
            })
            .await;

        let outcome = match &result {
            Ok(response) => self.store(&fp, format, &response.audio_data).await,
            Err(_) => Ok(()),
        };

        let notify = self.in_flight.lock().await.remove(&fp);
        if let Some(notify) = notify {
            notify.notify_waiters();
        }
        outcome?;

        let response = result?;
        Ok((fp, response.audio_data))
    }

    async fn try_read_cached(&self, fp: &str, format: &str) -> Result<Option<Vec<u8>>, ServiceError> {
        let has_entry = self.entries.read().await.contains_key(fp);
        if !has_entry {
            return Ok(None);
        }

        let path = self.path_for(fp, format);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                self.touch(fp).await?;
                Ok(Some(bytes))
            }
            Err(_) => {
                self.entries.write().await.remove(fp);
                self.order.write().await.shift_remove(fp);
                Ok(None)
            }
        }
    }

    async fn touch(&self, fp: &str) -> Result<(), ServiceError> {
        let mut entries = self.entries.write().await;
        if let Some(artifact) = entries.get_mut(fp) {
            artifact.last_accessed = Utc::now();
        }
        drop(entries);

        let mut order = self.order.write().await;
        order.shift_remove(fp);
        order.insert(fp.to_string(), ());
        drop(order);

        self.persist_index().await
    }

    async fn store(&self, fp: &str, format: &str, bytes: &[u8]) -> Result<(), ServiceError> {
        let path = self.path_for(fp, format);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ServiceError::new(ErrorCode::SystemInternalError, e.to_string()))?;

        let now = Utc::now();
        let artifact = AudioArtifact {
            artifact_id: fp.to_string(),
            format: format.to_string(),
            size: bytes.len() as u64,
            duration_hint: None,
            file_path: path.display().to_string(),
            created_at: now,
            last_accessed: now,
        };

        self.entries.write().await.insert(fp.to_string(), artifact);
        self.order.write().await.insert(fp.to_string(), ());

        self.evict_if_needed().await?;
        self.persist_index().await
    }

    /// Background-sweep entry point: removes artifacts past `max_age` and,
    /// if the cache is still over `max_size_bytes`, evicts least-recently-used
    /// entries until it isn't. Also run inline after every `store`, so this
    /// only matters for artifacts that age out without further writes.
    pub async fn sweep(&self) -> Result<(), ServiceError> {
        self.evict_if_needed().await
    }

    async fn evict_if_needed(&self) -> Result<(), ServiceError> {
        let cutoff = Utc::now() - self.max_age;
        let expired: Vec<String> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, a)| a.last_accessed < cutoff)
            .map(|(fp, _)| fp.clone())
            .collect();
        for fp in expired {
            self.remove_entry(&fp).await?;
        }

        loop {
            let total: u64 = self.entries.read().await.values().map(|a| a.size).sum();
            if total <= self.max_size_bytes {
                break;
            }
            let oldest = self.order.read().await.keys().next().cloned();
            match oldest {
                Some(fp) => self.remove_entry(&fp).await?,
                None => break,
            }
        }
        Ok(())
    }

    async fn remove_entry(&self, fp: &str) -> Result<(), ServiceError> {
        let artifact = self.entries.write().await.remove(fp);
        self.order.write().await.shift_remove(fp);
        if let Some(artifact) = artifact {
            let _ = tokio::fs::remove_file(&artifact.file_path).await;
        }
        Ok(())
    }

    async fn persist_index(&self) -> Result<(), ServiceError> {
        let artifacts = self.entries.read().await.clone();
        self.index_store.save(&AudioIndex { artifacts }).await?;
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
