//! Core entities: `Session`, `AdminIdentity`, `ClientMembership`, `AudioArtifact`.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// Current on-disk schema version for `Session` and `AdminIdentity` records.
/// Bump when a breaking field change is made; the persistence layer skips
/// (rather than crashes on) files carrying a newer version than this.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Started,
    Active,
    Paused,
    Ending,
    Ended,
    Error,
}

impl SessionStatus {
    /// Terminal states accept no further mutating operations.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Ended | SessionStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsMode {
    Neural,
    Standard,
    Local,
    Disabled,
}

impl TtsMode {
    /// Whether this mode calls out to the cloud TTS Service at all.
    pub fn uses_cloud_synthesis(self) -> bool {
        matches!(self, TtsMode::Neural | TtsMode::Standard)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    Pcm,
    Opus,
    Flac,
}

/// Which TTS synthesis tier a `broadcast-translation` requests. Part of the
/// audio cache's fingerprint: the same text/language synthesized `neural`
/// vs `standard` are different artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceType {
    Neural,
    Standard,
}

impl VoiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            VoiceType::Neural => "neural",
            VoiceType::Standard => "standard",
        }
    }
}

const VALID_SAMPLE_RATES: [u32; 5] = [8000, 16000, 22050, 44100, 48000];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub encoding: AudioEncoding,
    pub channels: u8,
}

impl AudioConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !VALID_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(DomainError::UnsupportedSampleRate(self.sample_rate));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub source_language: String,
    pub target_languages: BTreeSet<String>,
    pub enabled_languages: BTreeSet<String>,
    pub tts_mode: TtsMode,
    pub audio_quality: AudioQuality,
    pub audio_config: AudioConfig,
}

impl SessionConfig {
    /// Validates the cross-field invariants on `SessionConfig`: target languages
    /// must be non-empty, and enabled languages must be a subset of them.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.target_languages.is_empty() {
            return Err(DomainError::EmptyTargetLanguages);
        }
        if !self.enabled_languages.is_subset(&self.target_languages) {
            return Err(DomainError::EnabledLanguagesNotSubset);
        }
        self.audio_config.validate()
    }

    /// `ttsMode = local` means the hub never calls the TTS Service.
    pub fn emits_local_tts(&self) -> bool {
        matches!(self.tts_mode, TtsMode::Local)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioCapabilities {
    pub supports_cloud_audio: bool,
    pub local_tts_languages: BTreeSet<String>,
    pub audio_formats: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMembership {
    pub socket_id: String,
    pub preferred_language: String,
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub audio_capabilities: AudioCapabilities,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub session_id: String,
    pub admin_id: Uuid,
    pub current_admin_socket_id: Option<String>,
    pub created_by: String,
    pub config: SessionConfig,
    pub clients: HashMap<String, ClientMembership>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub status: SessionStatus,
}

fn default_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}

impl Session {
    pub fn new(
        session_id: String,
        admin_id: Uuid,
        admin_socket_id: String,
        created_by: String,
        config: SessionConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            session_id,
            admin_id,
            current_admin_socket_id: Some(admin_socket_id),
            created_by,
            config,
            clients: HashMap::new(),
            created_at: now,
            last_activity: now,
            status: SessionStatus::Started,
        }
    }

    /// Only the admin whose id matches may mutate this session.
    pub fn is_owned_by(&self, admin_id: Uuid) -> bool {
        self.admin_id == admin_id
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// A `listSessions` row: everything an admin needs to triage a session
    /// without the full client roster, annotated with whether `requester`
    /// owns it.
    pub fn summarize(&self, requester: Uuid) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            status: self.status,
            created_by: self.created_by.clone(),
            client_count: self.clients.len(),
            created_at: self.created_at,
            is_owner: self.is_owned_by(requester),
        }
    }
}

/// `list-sessions`'s optional `filter`: `owned` restricts the result to
/// sessions the requester owns, `all` returns every session with `isOwner`
/// marking which ones are theirs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionListFilter {
    #[default]
    Owned,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub status: SessionStatus,
    pub created_by: String,
    pub client_count: usize,
    pub created_at: DateTime<Utc>,
    pub is_owner: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminIdentity {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub admin_id: Uuid,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub owned_session_ids: BTreeSet<String>,
}

impl AdminIdentity {
    pub fn new(admin_id: Uuid, display_name: String) -> Self {
        let now = Utc::now();
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            admin_id,
            display_name,
            created_at: now,
            last_seen: now,
            owned_session_ids: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub artifact_id: String,
    pub format: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_hint: Option<f64>,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}
