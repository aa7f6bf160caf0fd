//! Wire DTOs for the WebSocket protocol. Every inbound frame is one of
//! `ClientMessage`'s variants; every outbound frame is one of `ServerMessage`'s.
//! `#[serde(tag = "type")]` gives each variant an explicit discriminant in
//! the JSON. Message names (`type` values) are kebab-case contract strings;
//! fields within a message are camelCase. The two conventions differ, so
//! each variant carries its own `rename`/`rename_all` rather than one
//! blanket attribute on the enum.

use std::collections::HashMap;

use domain::{ErrorEnvelope, Session, SessionConfig, SessionListFilter, SessionSummary, VoiceType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Credentials,
    Token,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// First message on an admin socket. `method: "credentials"` exchanges
    /// a username/password for an authenticated session; `method: "token"`
    /// reattaches using a still-valid access token instead.
    #[serde(rename = "admin-auth", rename_all = "camelCase")]
    Authenticate {
        method: AuthMethod,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        access_token: Option<String>,
    },
    #[serde(rename = "token-refresh", rename_all = "camelCase")]
    TokenRefresh { refresh_token: String },
    #[serde(rename = "start-session", rename_all = "camelCase")]
    CreateSession {
        session_id: String,
        display_name: String,
        config: SessionConfig,
    },
    #[serde(rename = "update-session-config", rename_all = "camelCase")]
    UpdateConfig {
        session_id: String,
        config: SessionConfig,
    },
    #[serde(rename = "pause-session", rename_all = "camelCase")]
    PauseSession {
        session_id: String,
    },
    #[serde(rename = "resume-session", rename_all = "camelCase")]
    ResumeSession {
        session_id: String,
    },
    #[serde(rename = "end-session", rename_all = "camelCase")]
    EndSession {
        session_id: String,
    },
    #[serde(rename = "list-sessions", rename_all = "camelCase")]
    ListSessions {
        #[serde(default)]
        filter: SessionListFilter,
    },
    /// Admin pushes one translated utterance out to every enabled language
    /// in `session_id` at once: `translations` maps language -> text, and
    /// the Broadcaster fans each entry out to that language's subscribers.
    #[serde(rename = "broadcast-translation", rename_all = "camelCase")]
    BroadcastTranslation {
        session_id: String,
        original: String,
        translations: HashMap<String, String>,
        #[serde(default, rename = "generateTTS")]
        generate_tts: bool,
        #[serde(default = "default_voice_type")]
        voice_type: VoiceType,
    },
    #[serde(rename = "join-session", rename_all = "camelCase")]
    JoinSession {
        session_id: String,
        preferred_language: String,
    },
    #[serde(rename = "change-language", rename_all = "camelCase")]
    SetLanguage {
        session_id: String,
        new_language: String,
    },
    #[serde(rename = "leave-session", rename_all = "camelCase")]
    LeaveSession {
        session_id: String,
    },
    #[serde(rename = "heartbeat-pong")]
    HeartbeatPong,
}

fn default_voice_type() -> VoiceType {
    VoiceType::Standard
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "admin-auth-response", rename_all = "camelCase")]
    Authenticated {
        admin_id: uuid::Uuid,
        display_name: String,
        access_token: String,
        id_token: String,
        refresh_token: String,
        expires_in: i64,
    },
    #[serde(rename = "token-refresh-response", rename_all = "camelCase")]
    TokenRefreshResponse {
        access_token: String,
        id_token: String,
        refresh_token: String,
        expires_in: i64,
    },
    #[serde(rename = "start-session-response", rename_all = "camelCase")]
    SessionCreated {
        session: Session,
    },
    #[serde(rename = "update-session-config-response", rename_all = "camelCase")]
    SessionUpdated {
        session: Session,
    },
    #[serde(rename = "list-sessions-response", rename_all = "camelCase")]
    SessionsListed {
        sessions: Vec<SessionSummary>,
    },
    #[serde(rename = "session-status-update", rename_all = "camelCase")]
    SessionStatus {
        session_id: String,
        status: domain::SessionStatus,
    },
    #[serde(rename = "end-session-response", rename_all = "camelCase")]
    SessionEnded {
        session_id: String,
        status: domain::SessionStatus,
    },
    #[serde(rename = "session-joined", rename_all = "camelCase")]
    JoinedSession {
        session_id: String,
        preferred_language: String,
    },
    #[serde(rename = "translation", rename_all = "camelCase")]
    Translation {
        session_id: String,
        language: String,
        text: String,
        timestamp: chrono::DateTime<chrono::Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        audio_url: Option<String>,
        /// Set when the session's `ttsMode` is `local`: the hub never calls
        /// the TTS Service and the client is expected to synthesize speech
        /// itself.
        #[serde(rename = "useLocalTTS", skip_serializing_if = "std::ops::Not::not")]
        use_local_tts: bool,
    },
    /// Sent to an admin socket that reattaches (via `admin-auth`) while it
    /// still owns sessions and had no other socket attached in the meantime.
    #[serde(rename = "admin-reconnection", rename_all = "camelCase")]
    AdminReconnection {
        owned_sessions: Vec<Session>,
    },
    /// The admin's access token could not be refreshed; the socket must
    /// `admin-auth` again before it can issue further admin messages.
    #[serde(rename = "session-expired")]
    SessionExpired,
    #[serde(rename = "heartbeat-ping")]
    HeartbeatPing,
    #[serde(rename = "error")]
    Error(ErrorEnvelope),
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","errorCode":"SYSTEM_INTERNAL_ERROR","message":"failed to encode outbound message"}"#
                .to_string()
        })
    }
}
